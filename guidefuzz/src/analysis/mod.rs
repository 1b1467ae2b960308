//! Static analyses that turn a decompiled contract into a search landscape:
//! distances from every block to the critical instructions, and coverage of
//! a set of executed instructions.

pub mod coverage;
pub mod distance;

pub use coverage::compute_coverage;
pub use distance::{
    BlockDistances, DistanceMap, compute_distance_map, compute_min_distance, distance_delta,
    max_distance_sum,
};
