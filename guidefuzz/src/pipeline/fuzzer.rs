use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::RngCore;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use slog::{Logger, debug, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{EventBus, Listener, TaskInputRequestEvent};
use crate::abi::{AbiParam, TypeRegistry, TypedValue, deserialize_values, serialize_values};
use crate::error::{FuzzError, Result};
use crate::fuzz::FuzzerLeader;
use crate::model::{Function, Task, Transaction, TransactionId, TransactionStatus};
use crate::services::{ChainClient, Store};

/// Generates and submits a batch of transactions for a running task.
pub struct FuzzerListener {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    registry: Arc<dyn TypeRegistry>,
    leader: Arc<FuzzerLeader>,
    bus: Arc<EventBus>,
    batch_size: usize,
    rng: Mutex<StdRng>,
    logger: Logger,
}

/// A generated transaction and the typed arguments to submit it with.
type Batch = Vec<(Transaction, Vec<TypedValue>)>;

impl FuzzerListener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        registry: Arc<dyn TypeRegistry>,
        leader: Arc<FuzzerLeader>,
        bus: Arc<EventBus>,
        batch_size: usize,
        rng: StdRng,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            chain,
            registry,
            leader,
            bus,
            batch_size,
            rng: Mutex::new(rng),
            logger,
        }
    }

    fn generate_batch(&self, task: &Task, function: &Function, inputs: &[AbiParam]) -> Result<Batch> {
        let fuzzer = self.leader.get(task.fuzzing_type)?;
        let mut rng = self.rng.lock();
        (0..self.batch_size)
            .map(|_| {
                let generated = fuzzer.generate_input(function.id, &mut *rng)?;
                let serialized = serialize_values(self.registry.as_ref(), inputs, &generated)?;
                // Submit exactly what gets recorded.
                let values = deserialize_values(self.registry.as_ref(), inputs, &serialized)?;
                let tx = Transaction::new(task.id, function.id, serialized, Utc::now());
                Ok((tx, values))
            })
            .collect()
    }
}

/// A random payable function, or any function when none is payable.
/// Constructors are never picked.
pub fn choose_function<'a>(functions: &'a [Function], rng: &mut dyn RngCore) -> Option<&'a Function> {
    let callable: Vec<&Function> = functions.iter().filter(|f| !f.is_constructor).collect();
    let payable: Vec<&Function> = callable.iter().copied().filter(|f| f.payable).collect();
    let pool = if payable.is_empty() { callable } else { payable };
    pool.choose(rng).copied()
}

#[async_trait]
impl Listener for FuzzerListener {
    type Event = TaskInputRequestEvent;

    fn name(&self) -> &'static str {
        "fuzzer"
    }

    fn subscribe(&self) -> UnboundedReceiver<TaskInputRequestEvent> {
        self.bus.task_input_request.subscribe()
    }

    async fn handle(&self, event: TaskInputRequestEvent) -> Result<()> {
        let task = self.store.get_task(event.task_id)?;
        if !task.is_running() {
            debug!(self.logger, "task is not running"; "task_id" => %task.id);
            return Ok(());
        }
        let contract = self.store.find_contract_by_task(task.id)?;
        let abi = contract.abi()?;
        let functions = self.store.functions_by_contract(contract.id)?;

        let function = {
            let mut rng = self.rng.lock();
            choose_function(&functions, &mut *rng)
                .cloned()
                .ok_or_else(|| FuzzError::NoCandidateFunction(contract.name.clone()))?
        };
        let inputs = &abi.method(&function.name)?.inputs;
        let batch = self.generate_batch(&task, &function, inputs)?;

        let (mut transactions, values): (Vec<Transaction>, Vec<Vec<TypedValue>>) =
            batch.into_iter().unzip();
        self.store.bulk_create_transactions(transactions.clone())?;

        let calls: BTreeMap<TransactionId, Vec<TypedValue>> = transactions
            .iter()
            .map(|tx| tx.id)
            .zip(values)
            .collect();
        let mut outcome = self
            .chain
            .batch_call(&contract, &function.name, &calls)
            .await;

        for tx in &mut transactions {
            match outcome.hashes.remove(&tx.id) {
                Some(hash) => {
                    tx.status = TransactionStatus::Running;
                    tx.blockchain_hash = Some(hash);
                }
                None => {
                    let reason = outcome
                        .errors
                        .remove(&tx.id)
                        .unwrap_or_else(|| "no result reported".to_string());
                    warn!(self.logger, "failed to send transaction";
                        "transaction_id" => %tx.id,
                        "function" => &function.name,
                        "error" => reason);
                    tx.status = TransactionStatus::SendError;
                }
            }
        }
        self.store.bulk_update_transactions(&transactions)?;
        debug!(self.logger, "batch submitted";
            "task_id" => %task.id,
            "function" => &function.name,
            "size" => transactions.len());
        Ok(())
    }
}
