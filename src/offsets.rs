// offsets.rs -- The candidate offset-pair table the tree tests index.
//
// Every internal tree node carries an index into this table. The entry is a
// pair of sample points (a, b) relative to the pixel under test; the node
// compares I(p + a) against I(p + b) ± threshold and branches three ways.
// The table is generated once per run and never mutated -- trees only ever
// index into it, so a learned tree is meaningful only together with the
// table it was trained against (the binary dumps the table for downstream
// tooling for exactly that reason).

use std::fmt;

use crate::image::Point;

/// One candidate test: the two sample points a tree node compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetPair {
    pub a: Point,
    pub b: Point,
}

/// The fixed table of candidate offset pairs.
pub struct OffsetTable {
    pairs: Vec<OffsetPair>,
    reach: i32,
}

impl OffsetTable {
    /// Generate all unordered pairs of distinct points within a disc of the
    /// given radius (squared distance ≤ radius²), in raster order.
    ///
    /// For radius 2 that is 13 points / 78 pairs, for radius 3 it is
    /// 29 points / 406 pairs.
    ///
    /// # Panics
    /// Panics if `radius < 1`.
    pub fn generate(radius: i32) -> Self {
        assert!(radius >= 1, "offset radius must be >= 1 (got {radius})");

        let mut points = Vec::new();
        for y in -radius..=radius {
            for x in -radius..=radius {
                let p = Point::new(x, y);
                if p.mag_sq() <= (radius as i64) * (radius as i64) {
                    points.push(p);
                }
            }
        }

        let mut pairs = Vec::new();
        for i in 0..points.len() {
            for j in (i + 1)..points.len() {
                pairs.push(OffsetPair {
                    a: points[i],
                    b: points[j],
                });
            }
        }

        OffsetTable {
            pairs,
            reach: radius,
        }
    }

    /// Number of candidate pairs (the range of valid `offset_index` values).
    #[inline]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Look up a pair by index.
    ///
    /// # Panics
    /// Panics if `index` is out of range.
    #[inline]
    pub fn pair(&self, index: usize) -> OffsetPair {
        self.pairs[index]
    }

    /// Largest coordinate magnitude any sample point can reach. Detection
    /// must skip a border this wide so every tree test stays in bounds.
    #[inline]
    pub fn reach(&self) -> i32 {
        self.reach
    }
}

// The original trainer logs the offset list so the extraction tool can be
// kept in sync; keep that dump available.
impl fmt::Display for OffsetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} offset pairs, reach {}", self.pairs.len(), self.reach)?;
        for (i, pair) in self.pairs.iter().enumerate() {
            writeln!(f, "{i}: {} {}", pair.a, pair.b)?;
        }
        Ok(())
    }
}
