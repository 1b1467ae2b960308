//! Reports produced when a task finishes.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{compute_coverage, compute_min_distance};
use crate::cfg::{ControlFlowGraph, Pc};
use crate::model::{Contract, Task, Transaction};

/// Values sampled at increasing points in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries<T> {
    pub x: Vec<DateTime<Utc>>,
    pub y: Vec<T>,
}

impl<T> Default for TimeSeries<T> {
    fn default() -> Self {
        Self {
            x: Vec::new(),
            y: Vec::new(),
        }
    }
}

impl<T> TimeSeries<T> {
    pub fn push(&mut self, at: DateTime<Utc>, value: T) {
        self.x.push(at);
        self.y.push(value);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReport {
    pub timestamp: DateTime<Utc>,
    pub blockchain_hash: Option<String>,
    pub inputs: Vec<String>,
    pub detected_weaknesses: BTreeSet<String>,
    pub executed_instructions: BTreeSet<Pc>,
    pub delta_coverage: f64,
    pub delta_min_distance: u64,
}

impl From<&Transaction> for TransactionReport {
    fn from(tx: &Transaction) -> Self {
        Self {
            timestamp: tx.timestamp,
            blockchain_hash: tx.blockchain_hash.clone(),
            inputs: tx.inputs.clone(),
            detected_weaknesses: tx.detected_weaknesses.clone(),
            executed_instructions: tx.executed_instructions.clone(),
            delta_coverage: tx.delta_coverage,
            delta_min_distance: tx.delta_min_distance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskReport {
    /// Milliseconds between the start and the expiration of the task.
    pub time_elapsed: i64,
    pub contract_name: String,
    pub coverage: f64,
    pub coverage_by_time: TimeSeries<f64>,
    pub min_distance: u32,
    pub min_distance_by_time: TimeSeries<u32>,
    pub transactions: Vec<TransactionReport>,
    pub detected_weaknesses: BTreeSet<String>,
}

impl TaskReport {
    /// Summarizes a finished task from its contract and transactions.
    pub fn build(task: &Task, contract: &Contract, transactions: &[Transaction]) -> Self {
        let empty = ControlFlowGraph::default();
        let cfg = contract.cfg.as_ref().unwrap_or(&empty);
        let aggregate = &task.aggregated_executed_instructions;

        let time_elapsed = match (task.start_time, task.expiration) {
            (Some(start), Some(end)) => (end - start).num_milliseconds(),
            _ => 0,
        };

        Self {
            time_elapsed,
            contract_name: contract.name.clone(),
            coverage: compute_coverage(cfg, aggregate),
            coverage_by_time: replay(transactions, |executed| compute_coverage(cfg, executed)),
            min_distance: compute_min_distance(cfg, &contract.distance_map, aggregate),
            min_distance_by_time: replay(transactions, |executed| {
                compute_min_distance(cfg, &contract.distance_map, executed)
            }),
            transactions: transactions.iter().map(TransactionReport::from).collect(),
            detected_weaknesses: transactions
                .iter()
                .flat_map(|tx| tx.detected_weaknesses.iter().cloned())
                .collect(),
        }
    }
}

/// Replays transactions in timestamp order (ties keep their given order),
/// sampling `metric` over the union of everything executed so far.
pub fn replay<T>(
    transactions: &[Transaction],
    mut metric: impl FnMut(&BTreeSet<Pc>) -> T,
) -> TimeSeries<T> {
    let mut ordered: Vec<&Transaction> = transactions.iter().collect();
    ordered.sort_by_key(|tx| tx.timestamp);

    let mut executed = BTreeSet::new();
    let mut series = TimeSeries::default();
    for tx in ordered {
        executed.extend(tx.executed_instructions.iter().copied());
        series.push(tx.timestamp, metric(&executed));
    }
    series
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;

    use super::*;
    use crate::analysis::compute_distance_map;
    use crate::cfg::BasicBlock;
    use crate::constants::UNREACHABLE_DISTANCE;
    use crate::model::{FunctionId, FuzzingType};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// A(0) -> B(10) -> C(20), with the target instruction inside C.
    fn contract(task: &Task) -> Contract {
        let block = |pc: Pc, ops: &[(Pc, &str)], successors: Vec<Pc>| BasicBlock {
            pc,
            instructions: ops.iter().map(|(pc, op)| (*pc, op.to_string())).collect(),
            successors,
        };
        let cfg = ControlFlowGraph::new([
            block(0, &[(0, "PUSH1"), (2, "JUMP")], vec![10]),
            block(10, &[(10, "JUMPDEST"), (11, "JUMP")], vec![20]),
            block(20, &[(20, "JUMPDEST"), (21, "CALL")], vec![]),
        ]);
        let mut contract = Contract::new(task.id, "Chain", "[]");
        let distance_map = compute_distance_map(&cfg, &["CALL"]);
        contract.attach_analysis(cfg, distance_map);
        contract
    }

    fn executed(task: &Task, secs: i64, pcs: &[Pc]) -> Transaction {
        let mut tx = Transaction::new(task.id, FunctionId::new(), vec![], at(secs));
        tx.executed_instructions = pcs.iter().copied().collect();
        tx
    }

    #[test]
    fn coverage_over_time_never_decreases() {
        let task = Task::new(FuzzingType::Greybox, vec![], Duration::from_secs(60));
        let contract = contract(&task);
        // Out of order on purpose; replay sorts by timestamp.
        let transactions = vec![
            executed(&task, 3, &[0, 2, 10, 11]),
            executed(&task, 1, &[]),
            executed(&task, 2, &[0, 2]),
        ];
        let cfg = contract.cfg.as_ref().unwrap();
        let series = replay(&transactions, |pcs| compute_coverage(cfg, pcs));

        assert_eq!(series.x, vec![at(1), at(2), at(3)]);
        assert_eq!(series.y, vec![0.0, 2.0 / 6.0, 4.0 / 6.0]);
    }

    #[test]
    fn min_distance_over_time_approaches_the_target() {
        let task = Task::new(FuzzingType::DirectedGreybox, vec![], Duration::from_secs(60));
        let contract = contract(&task);
        let transactions = vec![
            executed(&task, 1, &[]),
            executed(&task, 2, &[0]),
            executed(&task, 3, &[11]),
        ];
        let cfg = contract.cfg.as_ref().unwrap();
        let series = replay(&transactions, |pcs| {
            compute_min_distance(cfg, &contract.distance_map, pcs)
        });
        assert_eq!(series.y, vec![UNREACHABLE_DISTANCE, 2, 1]);
    }

    #[test]
    fn builds_a_task_report() {
        let mut task = Task::new(FuzzingType::Greybox, vec![], Duration::from_secs(60));
        task.start_time = Some(at(0));
        task.expiration = Some(at(60));
        let contract = contract(&task);

        let mut first = executed(&task, 1, &[0, 2]);
        first.detected_weaknesses.insert("reentrancy".to_string());
        let mut second = executed(&task, 2, &[20, 21]);
        second.detected_weaknesses.insert("reentrancy".to_string());
        second.detected_weaknesses.insert("gasless_send".to_string());
        for tx in [&first, &second] {
            task.merge_executed(&tx.executed_instructions);
        }

        let report = TaskReport::build(&task, &contract, &[first, second]);
        assert_eq!(report.time_elapsed, 60_000);
        assert_eq!(report.contract_name, "Chain");
        assert_eq!(report.coverage, 4.0 / 6.0);
        assert_eq!(report.min_distance, 0);
        assert_eq!(report.transactions.len(), 2);
        assert_eq!(report.detected_weaknesses.len(), 2);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("coverageByTime").is_some());
        assert_eq!(json["minDistanceByTime"]["y"], serde_json::json!([2, 0]));
    }

    #[test]
    fn report_of_an_unanalyzed_contract_is_empty() {
        let task = Task::new(FuzzingType::Blackbox, vec![], Duration::from_secs(1));
        let contract = Contract::new(task.id, "Pending", "[]");
        let report = TaskReport::build(&task, &contract, &[]);
        assert_eq!(report.coverage, 0.0);
        assert_eq!(report.min_distance, UNREACHABLE_DISTANCE);
        assert!(report.coverage_by_time.is_empty());
        assert!(report.min_distance_by_time.is_empty());
    }
}
