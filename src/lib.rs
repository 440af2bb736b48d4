// faster-learn: learns a corner detector by simulated annealing.
//
// The detector is a small ternary decision tree over pixel-pair intensity
// comparisons. The annealer mutates the tree one node at a time and keeps
// mutations that improve the repeatability of the detected corners across a
// registered image sequence, per the Boltzmann acceptance criterion.
//
// Reference: Rosten, Porter, Drummond -- "Faster and better: a machine
// learning approach to corner detection" (PAMI 2010).

pub mod anneal;
pub mod config;
pub mod dataset;
pub mod detect;
pub mod image;
pub mod offsets;
pub mod repeatability;
pub mod tree;
pub mod warp;
