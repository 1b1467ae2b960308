//! Shortest hop distance from every basic block to each critical instruction.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use crate::cfg::{ControlFlowGraph, Pc};
use crate::constants::UNREACHABLE_DISTANCE;

/// Distances to one target: block PC -> hops to the block holding the target.
pub type BlockDistances = BTreeMap<Pc, u32>;

/// One entry per occurrence of a critical opcode, keyed by the PC of that
/// instruction.
pub type DistanceMap = BTreeMap<Pc, BlockDistances>;

/// Computes the distance map of `cfg` for the given critical opcodes.
///
/// Each occurrence of a critical opcode makes its containing block a target.
/// A breadth-first search over the reverse successor graph then assigns every
/// block the minimum number of edges it needs to reach that target, or
/// [`UNREACHABLE_DISTANCE`] when there is no path. Predecessors are visited in
/// ascending PC order so identical graphs always produce identical maps.
pub fn compute_distance_map<S: AsRef<str>>(
    cfg: &ControlFlowGraph,
    critical_instructions: &[S],
) -> DistanceMap {
    let critical: HashSet<String> = critical_instructions
        .iter()
        .map(|op| op.as_ref().to_ascii_uppercase())
        .collect();

    let predecessors = cfg.predecessors();
    let mut by_target_block: BTreeMap<Pc, BlockDistances> = BTreeMap::new();
    let mut distance_map = DistanceMap::new();

    for (&pc, op) in cfg.instructions() {
        if !critical.contains(&op.to_ascii_uppercase()) {
            continue;
        }
        let Some(target_block) = cfg.containing_block(pc) else {
            continue;
        };
        // Several occurrences in one block share the same search.
        let distances = by_target_block
            .entry(target_block)
            .or_insert_with(|| reverse_bfs(cfg, &predecessors, target_block));
        distance_map.insert(pc, distances.clone());
    }

    distance_map
}

fn reverse_bfs(
    cfg: &ControlFlowGraph,
    predecessors: &BTreeMap<Pc, BTreeSet<Pc>>,
    target_block: Pc,
) -> BlockDistances {
    let mut distances: BlockDistances = cfg
        .blocks()
        .keys()
        .map(|&pc| (pc, UNREACHABLE_DISTANCE))
        .collect();
    distances.insert(target_block, 0);

    let mut queue = VecDeque::from([target_block]);
    while let Some(block) = queue.pop_front() {
        let next = distances[&block] + 1;
        let Some(preds) = predecessors.get(&block) else {
            continue;
        };
        for &pred in preds {
            let distance = distances.entry(pred).or_insert(UNREACHABLE_DISTANCE);
            if *distance == UNREACHABLE_DISTANCE {
                *distance = next;
                queue.push_back(pred);
            }
        }
    }

    distances
}

/// Minimum distance, across all targets, of the blocks touched by `executed`.
///
/// Returns [`UNREACHABLE_DISTANCE`] when no executed instruction lies in a
/// block that can reach a target.
pub fn compute_min_distance(
    cfg: &ControlFlowGraph,
    distance_map: &DistanceMap,
    executed: &BTreeSet<Pc>,
) -> u32 {
    let blocks: BTreeSet<Pc> = executed
        .iter()
        .filter_map(|&pc| cfg.containing_block(pc))
        .collect();

    distance_map
        .values()
        .flat_map(|distances| blocks.iter().filter_map(|pc| distances.get(pc)))
        .copied()
        .min()
        .unwrap_or(UNREACHABLE_DISTANCE)
}

/// Sum over blocks of the largest finite distance any target assigns to them.
/// This is the normalization base of the distance signal.
pub fn max_distance_sum(distance_map: &DistanceMap) -> u64 {
    let mut max_by_block: BTreeMap<Pc, u32> = BTreeMap::new();
    for distances in distance_map.values() {
        for (&pc, &distance) in distances {
            let max = max_by_block.entry(pc).or_insert(0);
            if distance < UNREACHABLE_DISTANCE && distance > *max {
                *max = distance;
            }
        }
    }
    max_by_block.values().map(|&d| u64::from(d)).sum()
}

/// Progress made when the minimum distance goes from `before` to `after`.
///
/// Moving closer yields the number of hops gained. Moving from unreachable to
/// reachable yields [`UNREACHABLE_DISTANCE`] plus the hops gained over the
/// largest finite distance of the map, so consumers can tell the two apart
/// and subtract the sentinel to recover the gain. Becoming or staying
/// unreachable yields zero.
pub fn distance_delta(distance_map: &DistanceMap, before: u32, after: u32) -> u64 {
    if after == UNREACHABLE_DISTANCE {
        return 0;
    }
    if before == UNREACHABLE_DISTANCE {
        let worst = distance_map
            .values()
            .flat_map(|distances| distances.values())
            .copied()
            .filter(|&d| d < UNREACHABLE_DISTANCE)
            .max()
            .unwrap_or(0);
        return u64::from(UNREACHABLE_DISTANCE) + u64::from(worst.saturating_sub(after));
    }
    u64::from(before.saturating_sub(after))
}
