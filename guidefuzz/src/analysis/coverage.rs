//! Coverage of a contract's instructions by a set of executed PCs.

use std::collections::BTreeSet;

use crate::cfg::{ControlFlowGraph, Pc};

/// Fraction of the contract's known instructions touched by `executed`.
///
/// PCs the graph does not know are ignored, and a graph without instructions
/// has a coverage of zero.
pub fn compute_coverage(cfg: &ControlFlowGraph, executed: &BTreeSet<Pc>) -> f64 {
    let known = cfg.instructions();
    if known.is_empty() {
        return 0.0;
    }
    let hit = executed.iter().filter(|pc| known.contains_key(pc)).count();
    hit as f64 / known.len() as f64
}
