// warp.rs -- Dense per-pixel correspondences between registered frames.
//
// For an ordered frame pair (i, j) the warp map gives, for every pixel of
// frame i, where that pixel lands in frame j -- or nothing, if it leaves the
// view. Maps are directional and not necessarily invertible; i→j and j→i
// are stored independently.
//
// Two policies exist because the published repeatability numbers depend on
// them. The cached scorer rounds destinations to integer pixels, so points
// that round to just outside the frame must be pruned at load time
// (`Pruned`). The exact scorer measures true floating-point distance and
// must see those same points un-pruned (`Exact`). A warp set is built under
// exactly one policy and scorers assert they are given the right one --
// mixing the two silently skews the metric.

use crate::image::{Image, Point};

/// Rounding/pruning policy a warp set was built under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarpPolicy {
    /// Destinations that round outside the frame are treated as unmapped.
    /// Required by the cached (rounding) repeatability scorer.
    Pruned,
    /// Destinations kept as stored. Required by the exact scorer.
    Exact,
}

/// Warp field for one ordered frame pair, same size as the source frame.
#[derive(Debug)]
pub struct WarpMap {
    map: Image<Option<(f32, f32)>>,
}

/// Round to the nearest integer pixel, half away from zero.
#[inline]
pub fn round_point(x: f32, y: f32) -> Point {
    Point::new(x.round() as i32, y.round() as i32)
}

impl WarpMap {
    /// Build a map from raw per-pixel destinations in raster order.
    /// `(-1, -1)` is the unmapped sentinel; under `Pruned`, destinations
    /// rounding outside a `width`×`height` frame also become unmapped.
    ///
    /// # Panics
    /// Panics if `raw.len() != width * height`.
    pub fn from_raw(width: usize, height: usize, raw: &[(f32, f32)], policy: WarpPolicy) -> Self {
        assert_eq!(
            raw.len(),
            width * height,
            "warp entry count ({}) must equal width * height ({})",
            raw.len(),
            width * height,
        );
        let probe: Image<bool> = Image::new(width, height);
        let data = raw
            .iter()
            .map(|&(x, y)| {
                if x == -1.0 && y == -1.0 {
                    None
                } else if policy == WarpPolicy::Pruned && !probe.contains(round_point(x, y)) {
                    None
                } else {
                    Some((x, y))
                }
            })
            .collect();
        WarpMap {
            map: Image::from_vec(width, height, data),
        }
    }

    /// Identity warp: every pixel maps to itself. Test helper, but also the
    /// correct map for a static pair of frames.
    pub fn identity(width: usize, height: usize) -> Self {
        let mut map = Image::new(width, height);
        for y in 0..height {
            for x in 0..width {
                map.set(x, y, Some((x as f32, y as f32)));
            }
        }
        WarpMap { map }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.map.width()
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.map.height()
    }

    /// Destination of a source pixel, or `None` if unmapped.
    ///
    /// # Panics
    /// Panics if `p` is outside the source frame.
    #[inline]
    pub fn dest(&self, p: Point) -> Option<(f32, f32)> {
        self.map.at(p)
    }

    /// Destination rounded to the nearest integer pixel.
    #[inline]
    pub fn dest_rounded(&self, p: Point) -> Option<Point> {
        self.dest(p).map(|(x, y)| round_point(x, y))
    }
}

/// All pairwise warp maps for a frame set, indexed by ordered pair.
#[derive(Debug)]
pub struct WarpSet {
    maps: Vec<Option<WarpMap>>,
    num_frames: usize,
    policy: WarpPolicy,
}

impl WarpSet {
    /// Create an empty set for `num_frames` frames; fill with `insert`.
    pub fn new(num_frames: usize, policy: WarpPolicy) -> Self {
        WarpSet {
            maps: (0..num_frames * num_frames).map(|_| None).collect(),
            num_frames,
            policy,
        }
    }

    #[inline]
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    #[inline]
    pub fn policy(&self) -> WarpPolicy {
        self.policy
    }

    /// Store the map for the ordered pair (from, to).
    ///
    /// # Panics
    /// Panics if `from == to` or either index is out of range.
    pub fn insert(&mut self, from: usize, to: usize, map: WarpMap) {
        assert!(from != to, "no warp from a frame to itself");
        assert!(from < self.num_frames && to < self.num_frames);
        self.maps[from * self.num_frames + to] = Some(map);
    }

    /// The map for the ordered pair (from, to).
    ///
    /// # Panics
    /// Panics if the pair was never inserted, or `from == to`.
    #[inline]
    pub fn get(&self, from: usize, to: usize) -> &WarpMap {
        self.maps[from * self.num_frames + to]
            .as_ref()
            .expect("warp map missing for frame pair")
    }

    /// Whether every off-diagonal pair has a map. Loaders check this before
    /// handing the set to the scorer.
    pub fn is_complete(&self) -> bool {
        (0..self.num_frames).all(|i| {
            (0..self.num_frames).all(|j| i == j || self.maps[i * self.num_frames + j].is_some())
        })
    }

    /// Identity warps for every pair. Test helper.
    pub fn identity(num_frames: usize, width: usize, height: usize, policy: WarpPolicy) -> Self {
        let mut set = WarpSet::new(num_frames, policy);
        for i in 0..num_frames {
            for j in 0..num_frames {
                if i != j {
                    set.insert(i, j, WarpMap::identity(width, height));
                }
            }
        }
        set
    }
}
