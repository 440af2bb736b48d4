// detect.rs -- Apply a decision tree to an image and extract corners.
//
// For each pixel far enough from the border for every table offset to stay
// in bounds, walk the tree: an internal node compares the two sampled
// intensities against the threshold and picks the lt / eq / gt child; the
// leaf's classification decides. Classified corners get a strength score
// (the largest threshold at which they still classify as corners, found by
// binary search -- the same "how far above threshold" notion FAST uses),
// then a 3×3 non-maximum suppression over the score map keeps one corner
// per local maximum.
//
// Deterministic given tree and threshold, with cost linear in image size.
// This runs once per frame per annealing iteration, so it dominates the
// wall clock of the whole search; the score map is a caller-owned scratch
// buffer to avoid reallocating it millions of times.

use crate::image::{Image, Point};
use crate::offsets::OffsetTable;
use crate::tree::Node;

/// Classify one pixel by walking the tree.
#[inline]
fn classify(tree: &Node, img: &Image<u8>, p: Point, offsets: &OffsetTable, threshold: i32) -> bool {
    let mut node = tree;
    while let Some(ch) = node.children.as_deref() {
        let pair = offsets.pair(node.offset_index);
        // SAFETY: the caller iterates only over pixels at least
        // `offsets.reach()` away from every border, and both sample points
        // lie within that reach.
        let (a, b) = unsafe {
            (
                img.get_unchecked((p.x + pair.a.x) as usize, (p.y + pair.a.y) as usize) as i32,
                img.get_unchecked((p.x + pair.b.x) as usize, (p.y + pair.b.y) as usize) as i32,
            )
        };
        node = if a > b + threshold {
            &ch.gt
        } else if a < b - threshold {
            &ch.lt
        } else {
            &ch.eq
        };
    }
    node.is_corner
}

/// Corner strength: the largest threshold at which the pixel still
/// classifies as a corner. The pixel is known to be a corner at `threshold`,
/// and raising the threshold only widens the eq band, so the predicate is
/// monotone and a binary search applies.
fn strength(
    tree: &Node,
    img: &Image<u8>,
    p: Point,
    offsets: &OffsetTable,
    threshold: i32,
) -> i32 {
    let mut lo = threshold;
    let mut hi = 255;
    while lo < hi {
        let mid = (lo + hi + 1) / 2;
        if classify(tree, img, p, offsets, mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }
    lo
}

/// Detect corners in one frame.
///
/// `scratch` is the response map (same size as the image) reused across
/// calls; it is overwritten wholesale. Returns surviving corner positions
/// in raster order.
///
/// # Panics
/// Panics if `scratch` does not match the image dimensions.
pub fn detect(
    img: &Image<u8>,
    tree: &Node,
    offsets: &OffsetTable,
    threshold: i32,
    scratch: &mut Image<i32>,
) -> Vec<Point> {
    assert!(
        scratch.width() == img.width() && scratch.height() == img.height(),
        "scratch size {}×{} does not match image {}×{}",
        scratch.width(),
        scratch.height(),
        img.width(),
        img.height(),
    );

    let w = img.width();
    let h = img.height();
    let border = offsets.reach() as usize;
    scratch.fill(-1);

    if w <= 2 * border || h <= 2 * border {
        return Vec::new();
    }

    // Pass 1: response map. -1 = not a corner.
    for y in border..h - border {
        for x in border..w - border {
            let p = Point::new(x as i32, y as i32);
            if classify(tree, img, p, offsets, threshold) {
                let s = strength(tree, img, p, offsets, threshold);
                // SAFETY: x < w and y < h by loop bounds.
                unsafe { scratch.set_unchecked(x, y, s) };
            }
        }
    }

    // Pass 2: 3×3 non-maximum suppression. Strictly greater than the four
    // neighbors that precede a pixel in raster order, at least equal to the
    // four that follow, so exactly one corner survives on a score plateau.
    let mut corners = Vec::new();
    for y in border..h - border {
        for x in border..w - border {
            let s = scratch.get(x, y);
            if s < 0 {
                continue;
            }
            let keep = s > scratch.get(x - 1, y - 1)
                && s > scratch.get(x, y - 1)
                && s > scratch.get(x + 1, y - 1)
                && s > scratch.get(x - 1, y)
                && s >= scratch.get(x + 1, y)
                && s >= scratch.get(x - 1, y + 1)
                && s >= scratch.get(x, y + 1)
                && s >= scratch.get(x + 1, y + 1);
            if keep {
                corners.push(Point::new(x as i32, y as i32));
            }
        }
    }
    corners
}
