// repeatability.rs -- How often corners found in one frame are found again
// in another, given the known warp between them.
//
// The cached scorer trades memory for O(1) proximity queries: for every
// frame it rasterizes a boolean image with a disc of radius r painted
// around each detected corner, then for every ordered frame pair checks
// whether each corner's (rounded) warp destination lands on a painted
// pixel. The rounding makes it a close approximation, not exact; the exact
// scorer below measures true distances and exists to validate against
// published results. The two use different warp pruning policies and must
// never be mixed within one computation -- each asserts its policy.
//
// Per-frame rasterization and the per-pair counting are independent
// read-only passes, so both fan out across threads; the integer sums make
// the parallel result identical to the sequential one.

use rayon::prelude::*;

use crate::image::{Image, Point};
use crate::warp::{WarpPolicy, WarpSet};

/// All integer offsets with squared distance ≤ radius² from the origin.
pub fn generate_disc(radius: i32) -> Vec<Point> {
    let r_sq = radius as i64 * radius as i64;
    let mut disc = Vec::new();
    for y in -radius..=radius {
        for x in -radius..=radius {
            let p = Point::new(x, y);
            if p.mag_sq() <= r_sq {
                disc.push(p);
            }
        }
    }
    disc
}

/// Rasterize corners into a boolean occupancy image: every pixel within the
/// disc of every corner is marked, out-of-bounds offsets silently dropped.
pub fn paint_discs(corners: &[Point], disc: &[Point], width: usize, height: usize) -> Image<bool> {
    let mut im = Image::new(width, height);
    for &corner in corners {
        for &offset in disc {
            let p = corner + offset;
            if im.contains(p) {
                im.set(p.x as usize, p.y as usize, true);
            }
        }
    }
    im
}

/// Cached repeatability over all ordered frame pairs.
///
/// A corner in frame i whose warp destination in frame j is unmapped is
/// skipped entirely; otherwise it counts as tested, and as good if its
/// rounded destination lands within radius of some corner detected in j.
/// Returns good / (tested + ε), in [0, 1] and finite even when nothing is
/// ever mappable.
///
/// # Panics
/// Panics if the warp set was not loaded with the `Pruned` policy, or if
/// `corners.len()` differs from the warp set's frame count.
pub fn compute_repeatability(
    warps: &WarpSet,
    corners: &[Vec<Point>],
    radius: i32,
    width: usize,
    height: usize,
) -> f64 {
    assert_eq!(
        warps.policy(),
        WarpPolicy::Pruned,
        "cached repeatability requires pruned warps",
    );
    assert_eq!(corners.len(), warps.num_frames(), "one corner set per frame");

    let n = corners.len();
    let disc = generate_disc(radius);

    let occupied: Vec<Image<bool>> = corners
        .par_iter()
        .map(|c| paint_discs(c, &disc, width, height))
        .collect();

    let (good, tested) = (0..n * n)
        .into_par_iter()
        .filter(|k| k / n != k % n)
        .map(|k| {
            let (i, j) = (k / n, k % n);
            let warp = warps.get(i, j);
            let mut good = 0u64;
            let mut tested = 0u64;
            for &corner in &corners[i] {
                if let Some(dest) = warp.dest_rounded(corner) {
                    tested += 1;
                    if occupied[j].contains(dest) && occupied[j].at(dest) {
                        good += 1;
                    }
                }
            }
            (good, tested)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    good as f64 / (tested as f64 + f64::EPSILON)
}

/// Exact repeatability: true Euclidean distance from the un-rounded warp
/// destination to the nearest corner in the destination frame, no caching.
/// O(corners × corners) per pair; used to cross-check the cached scorer
/// against external reference results.
///
/// # Panics
/// Panics if the warp set was not loaded with the `Exact` policy, or if
/// `corners.len()` differs from the warp set's frame count.
pub fn compute_repeatability_exact(warps: &WarpSet, corners: &[Vec<Point>], radius: f64) -> f64 {
    assert_eq!(
        warps.policy(),
        WarpPolicy::Exact,
        "exact repeatability requires unpruned warps",
    );
    assert_eq!(corners.len(), warps.num_frames(), "one corner set per frame");

    let n = corners.len();
    let r_sq = radius * radius;

    let (good, tested) = (0..n * n)
        .into_par_iter()
        .filter(|k| k / n != k % n)
        .map(|k| {
            let (i, j) = (k / n, k % n);
            let warp = warps.get(i, j);
            let mut good = 0u64;
            let mut tested = 0u64;
            for &corner in &corners[i] {
                if let Some((dx, dy)) = warp.dest(corner) {
                    tested += 1;
                    let near = corners[j].iter().any(|q| {
                        let ex = q.x as f64 - dx as f64;
                        let ey = q.y as f64 - dy as f64;
                        ex * ex + ey * ey <= r_sq
                    });
                    if near {
                        good += 1;
                    }
                }
            }
            (good, tested)
        })
        .reduce(|| (0, 0), |a, b| (a.0 + b.0, a.1 + b.1));

    good as f64 / (tested as f64 + f64::EPSILON)
}
