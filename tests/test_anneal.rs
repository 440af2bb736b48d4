// tests/test_anneal.rs -- End-to-end behavior of the annealing driver on a
// small synthetic training set.

use faster_learn::anneal::{AnnealParams, Annealer};
use faster_learn::image::Image;
use faster_learn::offsets::OffsetTable;
use faster_learn::warp::{WarpPolicy, WarpSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A textured frame: bright rectangles on a dark background.
fn make_frame(w: usize, h: usize) -> Image<u8> {
    let mut img = Image::from_vec(w, h, vec![35u8; w * h]);
    let rects: [(usize, usize, usize, usize, u8); 4] = [
        (5, 5, 6, 6, 210),
        (18, 6, 7, 5, 190),
        (7, 18, 5, 7, 230),
        (19, 19, 6, 6, 170),
    ];
    for &(rx, ry, rw, rh, val) in &rects {
        for y in ry..(ry + rh).min(h) {
            for x in rx..(rx + rw).min(w) {
                img.set(x, y, val);
            }
        }
    }
    img
}

fn small_params(iterations: usize, seed: u64) -> AnnealParams {
    AnnealParams {
        iterations,
        threshold: 20,
        match_radius: 3,
        repeatability_scale: 0.5,
        num_cost: 30.0,
        max_nodes: 40,
        initial_depth: 2,
        seed,
        temp_scale: 10.0,
        temp_alpha: 3.0,
    }
}

fn training_set(n: usize, w: usize, h: usize) -> (Vec<Image<u8>>, WarpSet) {
    let frame = make_frame(w, h);
    let frames = vec![frame; n];
    let warps = WarpSet::identity(n, w, h, WarpPolicy::Pruned);
    (frames, warps)
}

#[test]
fn run_is_bit_for_bit_reproducible() {
    let table = OffsetTable::generate(2);
    let (frames, warps) = training_set(2, 32, 32);

    let run = || {
        let mut annealer = Annealer::new(small_params(40, 77), &table).unwrap();
        annealer.run(&frames, &warps)
    };
    let a = run();
    let b = run();
    assert_eq!(a.tree, b.tree, "same seed must give the same tree");
    assert_eq!(a.accepted, b.accepted);
    assert_eq!(a.rejected, b.rejected);
    assert_eq!(a.cost.to_bits(), b.cost.to_bits());
}

#[test]
fn run_produces_valid_tree_and_bookkeeping() {
    let table = OffsetTable::generate(2);
    let (frames, warps) = training_set(2, 32, 32);

    let mut annealer = Annealer::new(small_params(60, 3), &table).unwrap();
    let result = annealer.run(&frames, &warps);

    assert!(result.tree.eq_invariant_holds());
    assert_eq!(result.accepted + result.rejected, 60);
    // The initial tree is always scored; identical frames under an identity
    // warp give the detector a finite cost sooner or later, and anything
    // finite beats the infinite starting baseline.
    if result.cost.is_finite() {
        assert!(result.accepted >= 1);
        let costs = result.breakdown.expect("accepted runs carry a breakdown");
        assert!((0.0..=1.0).contains(&costs.repeatability));
        assert!(costs.cost >= 1.0, "cost is a product of terms >= 1");
    }
}

#[test]
fn improving_candidates_always_pass_the_acceptance_test() {
    // The Boltzmann rule accepts when u < exp((old - new) / T) with
    // u ~ U[0, 1). For any strict improvement the exponent is positive, the
    // likelihood exceeds 1, and no draw can reject it.
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..10_000 {
        let old_cost: f64 = rng.gen_range(1.0..1e6);
        let improvement = rng.gen_range(1e-9..old_cost);
        let temperature = rng.gen_range(1e-6..1e3);
        let likelihood: f64 = ((old_cost - (old_cost - improvement)) / temperature).exp();
        assert!(likelihood > 1.0);
        let draw: f64 = rng.gen();
        assert!(draw < likelihood, "uniform draw rejected an improvement");
    }
    // And an improvement over an infinite baseline is accepted too.
    let likelihood = ((f64::INFINITY - 42.0) / 1e-9).exp();
    assert!(0.5f64 < likelihood);
}

#[test]
fn temperature_decreases_toward_zero_share_of_scale() {
    let table = OffsetTable::generate(1);
    let params = small_params(100, 1);
    let scale = params.temp_scale;
    let alpha = params.temp_alpha;
    let annealer = Annealer::new(params, &table).unwrap();

    let imax = 1000;
    let mut prev = f64::INFINITY;
    for i in 0..=imax {
        let t = annealer.compute_temperature(i, imax);
        assert!(t < prev);
        assert!(t > 0.0);
        prev = t;
    }
    // Endpoint values of the schedule.
    assert!((annealer.compute_temperature(0, imax) - scale).abs() < 1e-12);
    let end = annealer.compute_temperature(imax, imax);
    assert!((end - scale * (-alpha).exp()).abs() < 1e-12);
}

#[test]
fn rejects_invalid_parameters_before_running() {
    let table = OffsetTable::generate(1);
    for params in [
        AnnealParams {
            iterations: 0,
            ..AnnealParams::default()
        },
        AnnealParams {
            initial_depth: 0,
            ..AnnealParams::default()
        },
        AnnealParams {
            match_radius: 0,
            ..AnnealParams::default()
        },
        AnnealParams {
            threshold: 256,
            ..AnnealParams::default()
        },
        AnnealParams {
            num_cost: 0.0,
            ..AnnealParams::default()
        },
    ] {
        assert!(Annealer::new(params, &table).is_err());
    }
}

#[test]
#[should_panic(expected = "same size")]
fn mismatched_frame_sizes_are_a_caller_bug() {
    let table = OffsetTable::generate(1);
    let frames = vec![Image::<u8>::new(16, 16), Image::<u8>::new(16, 8)];
    let warps = WarpSet::identity(2, 16, 16, WarpPolicy::Pruned);
    let mut annealer = Annealer::new(small_params(5, 1), &table).unwrap();
    annealer.run(&frames, &warps);
}
