use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use slog::{Logger, debug, info};

use super::{EventBus, TaskInputRequestEvent};
use crate::analysis::{compute_coverage, compute_min_distance, distance_delta};
use crate::cfg::{ControlFlowGraph, Pc};
use crate::error::Result;
use crate::model::{TaskId, Transaction, TransactionId, TransactionStatus};
use crate::oracle::{EventsSnapshot, Oracle, OracleKind, detect_weaknesses};
use crate::services::Store;

/// Records what the node observed while executing a fuzzed transaction.
///
/// Recording the last pending transaction of a running task requests the
/// next batch of inputs. Every write to a transaction outcome goes through
/// here, serialized by one lock.
pub struct ExecutionRecorder {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    critical_instructions: HashSet<String>,
    oracles: Vec<Box<dyn Oracle>>,
    // Serializes read-modify-write cycles on the task aggregate.
    commit: Mutex<()>,
    logger: Logger,
}

impl ExecutionRecorder {
    pub fn new(
        store: Arc<dyn Store>,
        bus: Arc<EventBus>,
        critical_instructions: &[String],
        oracles: &[OracleKind],
        logger: Logger,
    ) -> Self {
        Self {
            store,
            bus,
            critical_instructions: critical_instructions
                .iter()
                .map(|op| op.to_ascii_uppercase())
                .collect(),
            oracles: oracles.iter().map(|kind| kind.oracle()).collect(),
            commit: Mutex::new(()),
            logger,
        }
    }

    /// Stores the executed instructions of the transaction with hash
    /// `tx_hash`, together with the progress they made for its task.
    ///
    /// A transaction is recorded once: repeated callbacks for a `Done`
    /// transaction return it unchanged.
    pub fn record_execution(&self, tx_hash: &str, executed: &BTreeSet<Pc>) -> Result<Transaction> {
        let _commit = self.commit.lock();

        let mut tx = self.store.transaction_by_hash(tx_hash)?;
        if tx.status == TransactionStatus::Done {
            debug!(self.logger, "execution already recorded"; "transaction_id" => %tx.id);
            return Ok(tx);
        }
        let before = self.store.get_task(tx.task_id)?.aggregated_executed_instructions;
        let contract = self.store.find_contract_by_task(tx.task_id)?;
        let empty = ControlFlowGraph::default();
        let cfg = contract.cfg.as_ref().unwrap_or(&empty);

        let after: BTreeSet<Pc> = before.union(executed).copied().collect();

        tx.critical_instructions_hits = executed
            .iter()
            .filter_map(|&pc| cfg.opcode(pc))
            .filter(|op| self.critical_instructions.contains(&op.to_ascii_uppercase()))
            .count() as u64;
        tx.delta_coverage = compute_coverage(cfg, &after) - compute_coverage(cfg, &before);
        tx.delta_min_distance = distance_delta(
            &contract.distance_map,
            compute_min_distance(cfg, &contract.distance_map, &before),
            compute_min_distance(cfg, &contract.distance_map, &after),
        );
        tx.executed_instructions = executed.clone();
        tx.status = TransactionStatus::Done;
        self.store.update_transaction(&tx)?;

        // Only the aggregate is written: the task may be finished meanwhile.
        let task = self.store.merge_executed_instructions(tx.task_id, executed)?;

        debug!(self.logger, "execution recorded";
            "transaction_id" => %tx.id,
            "hits" => tx.critical_instructions_hits,
            "delta_coverage" => tx.delta_coverage,
            "delta_min_distance" => tx.delta_min_distance);

        if task.is_running() && !self.has_pending(task.id)? {
            self.bus
                .task_input_request
                .publish(TaskInputRequestEvent { task_id: task.id });
        }
        Ok(tx)
    }

    /// Closes the `Running` transactions of a task created at or before
    /// `cutoff`, whose execution callback never came. They end up `Done`
    /// without executed instructions. Returns their ids.
    pub fn expire_stale(&self, task_id: TaskId, cutoff: DateTime<Utc>) -> Result<Vec<TransactionId>> {
        let _commit = self.commit.lock();

        let stale: Vec<Transaction> = self
            .store
            .transactions_by_task(task_id)?
            .into_iter()
            .filter(|tx| tx.status == TransactionStatus::Running && tx.timestamp <= cutoff)
            .map(|mut tx| {
                tx.status = TransactionStatus::Done;
                tx
            })
            .collect();
        if stale.is_empty() {
            return Ok(Vec::new());
        }
        self.store.bulk_update_transactions(&stale)?;
        info!(self.logger, "timed out transactions";
            "task_id" => %task_id,
            "count" => stale.len());
        Ok(stale.into_iter().map(|tx| tx.id).collect())
    }

    pub(crate) fn has_pending(&self, task_id: TaskId) -> Result<bool> {
        Ok(self
            .store
            .transactions_by_task(task_id)?
            .iter()
            .any(|tx| tx.status.is_pending()))
    }

    /// Runs the enabled oracles over `snapshot` and adds what they detect to
    /// the transaction with hash `tx_hash`. Returns the newly detected
    /// weaknesses.
    pub fn record_weaknesses(&self, tx_hash: &str, snapshot: &EventsSnapshot) -> Result<BTreeSet<String>> {
        let _commit = self.commit.lock();

        let mut tx = self.store.transaction_by_hash(tx_hash)?;
        let detected = detect_weaknesses(&self.oracles, snapshot);
        let new: BTreeSet<String> = detected
            .difference(&tx.detected_weaknesses)
            .cloned()
            .collect();
        if !new.is_empty() {
            tx.detected_weaknesses.extend(new.iter().cloned());
            self.store.update_transaction(&tx)?;
            debug!(self.logger, "weaknesses detected";
                "transaction_id" => %tx.id,
                "weaknesses" => ?new);
        }
        Ok(new)
    }
}
