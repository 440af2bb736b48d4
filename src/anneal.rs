// anneal.rs -- The simulated-annealing search over detector trees.
//
// One iteration: deep-copy the accepted tree, mutate the copy at one random
// node (skipped on iteration 0 so the initial random tree gets scored as
// the baseline), detect corners on every training frame, score
// repeatability, fold repeatability / detection-count / tree-size into one
// cost, then apply the Boltzmann criterion
//
//     accept  iff  u < exp((old_cost - cost) / temperature),  u ~ U[0, 1)
//
// A cost improvement makes the exponent positive and the likelihood > 1, so
// improvements always win; regressions win with a probability that decays
// with the exponential temperature schedule. Rejection is the only error
// handling the loop needs -- a bad proposal simply doesn't survive.
//
// The loop is inherently sequential (each acceptance depends on the
// previous state). The per-frame detection inside one iteration is not, and
// fans out across threads with a per-thread scratch map.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::image::{Image, Point};
use crate::offsets::OffsetTable;
use crate::repeatability::compute_repeatability;
use crate::tree::Node;
use crate::warp::WarpSet;

/// Search parameters. The defaults follow the original configuration file;
/// `num_cost` is the detection count per frame that doubles the count
/// regularizer, `max_nodes` the tree size that doubles the size regularizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealParams {
    /// Number of annealing iterations.
    pub iterations: usize,
    /// Detection threshold for the pixel-pair tests.
    pub threshold: i32,
    /// Matching radius: a corner must re-appear within this many pixels of
    /// its warped position to count as repeated.
    pub match_radius: i32,
    /// Scale of the repeatability term: cost doubles when repeatability
    /// falls to this value.
    pub repeatability_scale: f64,
    /// Per-frame detection count regularization constant.
    pub num_cost: f64,
    /// Tree size regularization constant.
    pub max_nodes: usize,
    /// Depth of the initial random tree.
    pub initial_depth: usize,
    /// RNG seed. Runs are bit-for-bit reproducible given the same seed,
    /// parameters, offset table and data.
    pub seed: u64,
    /// Temperature schedule: temperature(i) = scale · exp(−alpha · i / imax).
    pub temp_scale: f64,
    /// Temperature decay constant.
    pub temp_alpha: f64,
}

impl Default for AnnealParams {
    fn default() -> Self {
        AnnealParams {
            iterations: 100_000,
            threshold: 30,
            match_radius: 5,
            repeatability_scale: 0.5,
            num_cost: 1000.0,
            max_nodes: 100,
            initial_depth: 3,
            seed: 1,
            temp_scale: 30.0,
            temp_alpha: 4.0,
        }
    }
}

/// Parameter validation failure, reported before the loop ever starts.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("iterations must be > 0")]
    NoIterations,
    #[error("initial tree depth must be >= 1 (got {0})")]
    BadDepth(usize),
    #[error("matching radius must be >= 1 (got {0})")]
    BadRadius(i32),
    #[error("threshold must be in 0..=255 (got {0})")]
    BadThreshold(i32),
    #[error("{0} must be positive")]
    NonPositive(&'static str),
}

impl AnnealParams {
    pub fn validate(&self) -> Result<(), ParamError> {
        if self.iterations == 0 {
            return Err(ParamError::NoIterations);
        }
        if self.initial_depth == 0 {
            return Err(ParamError::BadDepth(self.initial_depth));
        }
        if self.match_radius < 1 {
            return Err(ParamError::BadRadius(self.match_radius));
        }
        if !(0..=255).contains(&self.threshold) {
            return Err(ParamError::BadThreshold(self.threshold));
        }
        for (name, value) in [
            ("repeatability_scale", self.repeatability_scale),
            ("num_cost", self.num_cost),
            ("max_nodes", self.max_nodes as f64),
            ("temp_scale", self.temp_scale),
            ("temp_alpha", self.temp_alpha),
        ] {
            if !(value > 0.0) {
                return Err(ParamError::NonPositive(name));
            }
        }
        Ok(())
    }
}

/// Cost breakdown for one candidate. `cost` is the product of the three
/// regularization terms.
#[derive(Debug, Clone, Copy)]
pub struct CostBreakdown {
    pub repeatability: f64,
    pub repeatability_cost: f64,
    pub number_cost: f64,
    pub size_cost: f64,
    pub cost: f64,
}

/// Outcome of a full run.
pub struct RunResult {
    /// The final accepted tree.
    pub tree: Node,
    /// Baseline cost of the final accepted tree. Infinite only if no
    /// candidate was ever accepted (every proposal had zero repeatability).
    pub cost: f64,
    /// Cost breakdown of the last accepted candidate, if any.
    pub breakdown: Option<CostBreakdown>,
    pub accepted: usize,
    pub rejected: usize,
}

fn sq(d: f64) -> f64 {
    d * d
}

/// The annealing driver. Owns the RNG (seeded once from the parameters) and
/// borrows the offset table; training data is passed to `run`.
pub struct Annealer<'a> {
    params: AnnealParams,
    offsets: &'a OffsetTable,
    rng: StdRng,
}

impl<'a> Annealer<'a> {
    pub fn new(params: AnnealParams, offsets: &'a OffsetTable) -> Result<Self, ParamError> {
        params.validate()?;
        let rng = StdRng::seed_from_u64(params.seed);
        Ok(Annealer {
            params,
            offsets,
            rng,
        })
    }

    /// Temperature at iteration `i` of `imax`: strictly decreasing from
    /// `temp_scale` toward `temp_scale · exp(−alpha)`.
    pub fn compute_temperature(&self, i: usize, imax: usize) -> f64 {
        self.params.temp_scale * (-self.params.temp_alpha * i as f64 / imax as f64).exp()
    }

    /// Detect corners with the candidate tree on every frame, in parallel,
    /// one scratch score map per worker thread.
    fn evaluate(&self, tree: &Node, images: &[Image<u8>]) -> Vec<Vec<Point>> {
        let w = images[0].width();
        let h = images[0].height();
        images
            .par_iter()
            .map_init(
                || Image::new(w, h),
                |scratch, img| crate::detect::detect(img, tree, self.offsets, self.params.threshold, scratch),
            )
            .collect()
    }

    fn cost(&self, repeatability: f64, corners: &[Vec<Point>], node_count: usize) -> CostBreakdown {
        let repeatability_cost = 1.0 + sq(self.params.repeatability_scale / repeatability);

        let mean_sq: f64 = corners
            .iter()
            .map(|c| sq(c.len() as f64 / self.params.num_cost))
            .sum::<f64>()
            / corners.len() as f64;
        let number_cost = 1.0 + mean_sq;

        let size_cost = 1.0 + sq(node_count as f64 / self.params.max_nodes as f64);

        CostBreakdown {
            repeatability,
            repeatability_cost,
            number_cost,
            size_cost,
            cost: size_cost * repeatability_cost * number_cost,
        }
    }

    /// Run the full search and return the final accepted tree.
    ///
    /// # Panics
    /// Panics if `images` is empty, frames differ in size, or the warp set
    /// does not match the frame count -- loaders validate all of this before
    /// the loop starts, so hitting one of these is a caller bug.
    pub fn run(&mut self, images: &[Image<u8>], warps: &WarpSet) -> RunResult {
        assert!(!images.is_empty(), "need at least one training image");
        let w = images[0].width();
        let h = images[0].height();
        assert!(
            images.iter().all(|i| i.width() == w && i.height() == h),
            "all frames must be the same size",
        );
        assert_eq!(warps.num_frames(), images.len(), "one warp map per frame pair");
        assert!(warps.is_complete(), "warp set is missing frame pairs");

        let iterations = self.params.iterations;
        let mut tree = Node::random(self.params.initial_depth, true, self.offsets.len(), &mut self.rng);
        let mut old_cost = f64::INFINITY;
        let mut last_accepted: Option<CostBreakdown> = None;
        let mut accepted = 0usize;
        let mut rejected = 0usize;

        info!(
            iterations,
            frames = images.len(),
            offsets = self.offsets.len(),
            initial_nodes = tree.num_nodes(),
            "starting annealing run",
        );

        for itnum in 0..iterations {
            let mut candidate = tree.clone();
            // Iteration 0 scores the unmutated initial tree as the baseline.
            if itnum > 0 {
                candidate.mutate(self.offsets.len(), &mut self.rng);
            }

            let corners = self.evaluate(&candidate, images);
            let repeatability =
                compute_repeatability(warps, &corners, self.params.match_radius, w, h);
            let costs = self.cost(repeatability, &corners, candidate.num_nodes());

            let temperature = self.compute_temperature(itnum, iterations);
            let likelihood = ((old_cost - costs.cost) / temperature).exp();

            debug!(
                itnum,
                repeatability = costs.repeatability,
                repeatability_cost = costs.repeatability_cost,
                number_cost = costs.number_cost,
                size_cost = costs.size_cost,
                cost = costs.cost,
                old_cost,
                temperature,
                likelihood,
                nodes = candidate.num_nodes(),
                "scored candidate",
            );

            if self.rng.gen::<f64>() < likelihood {
                debug!(itnum, cost = costs.cost, "accepted");
                old_cost = costs.cost;
                tree = candidate;
                last_accepted = Some(costs);
                accepted += 1;
            } else {
                rejected += 1;
            }
        }

        info!(
            accepted,
            rejected,
            final_cost = old_cost,
            nodes = tree.num_nodes(),
            "annealing run finished",
        );

        RunResult {
            tree,
            cost: old_cost,
            breakdown: last_accepted,
            accepted,
            rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(iterations: usize) -> AnnealParams {
        AnnealParams {
            iterations,
            threshold: 20,
            match_radius: 3,
            initial_depth: 2,
            max_nodes: 30,
            num_cost: 20.0,
            seed: 42,
            ..AnnealParams::default()
        }
    }

    #[test]
    fn test_validate_rejects_zero_depth() {
        let p = AnnealParams {
            initial_depth: 0,
            ..AnnealParams::default()
        };
        assert!(matches!(p.validate(), Err(ParamError::BadDepth(0))));
    }

    #[test]
    fn test_validate_rejects_zero_iterations() {
        let p = AnnealParams {
            iterations: 0,
            ..AnnealParams::default()
        };
        assert!(matches!(p.validate(), Err(ParamError::NoIterations)));
    }

    #[test]
    fn test_validate_rejects_nonpositive_scale() {
        let p = AnnealParams {
            temp_scale: 0.0,
            ..AnnealParams::default()
        };
        assert!(matches!(p.validate(), Err(ParamError::NonPositive(_))));
    }

    #[test]
    fn test_temperature_schedule() {
        let offsets = OffsetTable::generate(1);
        let annealer = Annealer::new(params(100), &offsets).unwrap();

        // Starts at the scale parameter, strictly decreases.
        let t0 = annealer.compute_temperature(0, 100);
        assert!((t0 - annealer.params.temp_scale).abs() < 1e-12);
        let mut prev = t0;
        for i in 1..=100 {
            let t = annealer.compute_temperature(i, 100);
            assert!(t < prev, "temperature not decreasing at i={i}");
            assert!(t > 0.0);
            prev = t;
        }
    }

    #[test]
    fn test_cost_terms() {
        let offsets = OffsetTable::generate(1);
        let p = params(10);
        let annealer = Annealer::new(p.clone(), &offsets).unwrap();

        // repeatability == scale doubles the repeatability term; a detection
        // count of num_cost doubles the count term; max_nodes nodes double
        // the size term.
        let corners = vec![vec![Point::new(0, 0); p.num_cost as usize]];
        let c = annealer.cost(p.repeatability_scale, &corners, p.max_nodes);
        assert!((c.repeatability_cost - 2.0).abs() < 1e-12);
        assert!((c.number_cost - 2.0).abs() < 1e-12);
        assert!((c.size_cost - 2.0).abs() < 1e-12);
        assert!((c.cost - 8.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_repeatability_gives_infinite_cost() {
        let offsets = OffsetTable::generate(1);
        let annealer = Annealer::new(params(10), &offsets).unwrap();
        let c = annealer.cost(0.0, &[Vec::new()], 4);
        assert!(c.cost.is_infinite());
    }
}
