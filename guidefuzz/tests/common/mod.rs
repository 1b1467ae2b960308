//! In-process stand-ins for the node, the decompiler and the report
//! destination, plus fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use guidefuzz::Result;
use guidefuzz::abi::TypedValue;
use guidefuzz::cfg::Pc;
use guidefuzz::config::{Config, FuzzerConfig};
use guidefuzz::model::{
    Contract, ContractId, Function, FunctionId, Task, TaskId, TaskStatus, Transaction,
    TransactionId,
};
use guidefuzz::report::TaskReport;
use guidefuzz::services::{
    BatchOutcome, ChainClient, DecompiledBlock, DecompiledInstruction, Decompiler, Deployment,
    InMemoryStore, ReportSink, Store,
};

/// `deposit(uint256)` is payable, so the fuzzer always picks it.
pub const WALLET_ABI: &str = r#"[
    {"type": "function", "name": "deposit", "stateMutability": "payable",
     "inputs": [{"name": "amount", "type": "uint256"}]},
    {"type": "function", "name": "withdraw", "stateMutability": "nonpayable",
     "inputs": [{"name": "amount", "type": "uint256"}, {"name": "to", "type": "address"}]}
]"#;

/// PCs of the three blocks `A -> B -> C` served by [`FakeDecompiler`].
pub const BLOCK_A: [Pc; 2] = [0, 2];
pub const BLOCK_B: [Pc; 2] = [4, 5];
pub const BLOCK_C: [Pc; 2] = [7, 8];

pub fn discard_logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

pub fn pcs(blocks: &[&[Pc]]) -> BTreeSet<Pc> {
    blocks.iter().flat_map(|pcs| pcs.iter().copied()).collect()
}

pub fn fuzzer_config(seeds_size: usize, batch_size: usize) -> FuzzerConfig {
    FuzzerConfig {
        seeds_size,
        batch_size,
        critical_instructions: vec!["CALL".to_string()],
        seeds: BTreeMap::from([
            (
                "uint256".to_string(),
                vec!["0".to_string(), "1".to_string(), "1000".to_string()],
            ),
            (
                "address".to_string(),
                vec!["0x00000000000000000000000000000000000000aa".to_string()],
            ),
        ]),
        rng_seed: Some(7),
        ..FuzzerConfig::default()
    }
}

pub fn config(batch_size: usize) -> Config {
    Config {
        fuzzer: fuzzer_config(4, batch_size),
        ..Config::default()
    }
}

/// Polls `condition` until it holds or a few seconds went by.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// A node that accepts everything, handing out sequential hashes.
#[derive(Default)]
pub struct FakeChain {
    next_hash: AtomicU64,
    pub deploys: AtomicUsize,
    /// `(function, batch size)` of every submitted batch.
    pub batches: Mutex<Vec<(String, usize)>>,
    /// When set, every call of a batch is rejected.
    pub reject_calls: AtomicBool,
}

impl FakeChain {
    fn hash(&self) -> String {
        format!("0x{:064x}", self.next_hash.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChainClient for FakeChain {
    async fn deploy(&self, _contract: &Contract, _args: &[TypedValue]) -> anyhow::Result<Deployment> {
        self.deploys.fetch_add(1, Ordering::SeqCst);
        Ok(Deployment {
            address: "0x00000000000000000000000000000000000000c0".to_string(),
            tx_hash: self.hash(),
        })
    }

    async fn batch_call(
        &self,
        _contract: &Contract,
        function: &str,
        inputs: &BTreeMap<TransactionId, Vec<TypedValue>>,
    ) -> BatchOutcome {
        self.batches.lock().push((function.to_string(), inputs.len()));
        let mut outcome = BatchOutcome::default();
        for id in inputs.keys() {
            if self.reject_calls.load(Ordering::SeqCst) {
                outcome.errors.insert(*id, "nonce too low".to_string());
            } else {
                outcome.hashes.insert(*id, self.hash());
            }
        }
        outcome
    }
}

/// Serves the blocks `A -> B -> C`, where `B` holds the only `CALL`.
#[derive(Default)]
pub struct FakeDecompiler {
    pub calls: AtomicUsize,
}

fn block(pc: &str, instructions: &[(&str, &str)], successors: &[&str]) -> DecompiledBlock {
    DecompiledBlock {
        pc: pc.to_string(),
        instructions: instructions
            .iter()
            .map(|(pc, op)| DecompiledInstruction {
                pc: pc.to_string(),
                op: op.to_string(),
            })
            .collect(),
        successors: successors.iter().map(|pc| pc.to_string()).collect(),
    }
}

#[async_trait]
impl Decompiler for FakeDecompiler {
    async fn decompile(&self, _contract: &Contract) -> anyhow::Result<Vec<DecompiledBlock>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![
            block("0x00", &[("0x00", "PUSH1"), ("0x02", "JUMP")], &["0x04"]),
            block("0x04", &[("0x04", "JUMPDEST"), ("0x05", "CALL")], &["0x07"]),
            block("0x07", &[("0x07", "JUMPDEST"), ("0x08", "STOP")], &[]),
        ])
    }
}

/// Collects every report it receives.
#[derive(Default)]
pub struct CollectingSink {
    pub reports: Mutex<Vec<TaskReport>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn send_report(&self, report: &TaskReport) -> anyhow::Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("webhook unreachable"));
        }
        self.reports.lock().push(report.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct Fakes {
    pub chain: Arc<FakeChain>,
    pub decompiler: Arc<FakeDecompiler>,
    pub sink: Arc<CollectingSink>,
}

/// Forwards to an [`InMemoryStore`] and lets tests watch or interleave with
/// the pipeline's reads.
#[derive(Default)]
pub struct ObservedStore {
    pub inner: Arc<InMemoryStore>,
    pub function_lookups: AtomicUsize,
    /// When set, the next contract lookup by task first marks that task
    /// `Done`, as a concurrent periodic check would.
    pub finish_on_contract_lookup: AtomicBool,
}

impl ObservedStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }
}

impl Store for ObservedStore {
    fn create_task(&self, task: Task) -> Result<()> {
        self.inner.create_task(task)
    }

    fn get_task(&self, id: TaskId) -> Result<Task> {
        self.inner.get_task(id)
    }

    fn update_task(&self, task: &Task) -> Result<()> {
        self.inner.update_task(task)
    }

    fn update_task_status(&self, id: TaskId, status: TaskStatus) -> Result<Task> {
        self.inner.update_task_status(id, status)
    }

    fn merge_executed_instructions(&self, id: TaskId, executed: &BTreeSet<Pc>) -> Result<Task> {
        self.inner.merge_executed_instructions(id, executed)
    }

    fn running_tasks(&self) -> Result<Vec<Task>> {
        self.inner.running_tasks()
    }

    fn create_contract(&self, contract: Contract) -> Result<()> {
        self.inner.create_contract(contract)
    }

    fn get_contract(&self, id: ContractId) -> Result<Contract> {
        self.inner.get_contract(id)
    }

    fn update_contract(&self, contract: &Contract) -> Result<()> {
        self.inner.update_contract(contract)
    }

    fn find_contract_by_task(&self, task_id: TaskId) -> Result<Contract> {
        if self.finish_on_contract_lookup.swap(false, Ordering::SeqCst) {
            self.inner.update_task_status(task_id, TaskStatus::Done)?;
        }
        self.inner.find_contract_by_task(task_id)
    }

    fn create_functions(&self, functions: Vec<Function>) -> Result<()> {
        self.inner.create_functions(functions)
    }

    fn get_function(&self, id: FunctionId) -> Result<Function> {
        self.function_lookups.fetch_add(1, Ordering::SeqCst);
        self.inner.get_function(id)
    }

    fn functions_by_contract(&self, contract_id: ContractId) -> Result<Vec<Function>> {
        self.inner.functions_by_contract(contract_id)
    }

    fn find_constructor(&self, contract_id: ContractId) -> Result<Function> {
        self.inner.find_constructor(contract_id)
    }

    fn create_transaction(&self, transaction: Transaction) -> Result<()> {
        self.inner.create_transaction(transaction)
    }

    fn bulk_create_transactions(&self, transactions: Vec<Transaction>) -> Result<()> {
        self.inner.bulk_create_transactions(transactions)
    }

    fn get_transaction(&self, id: TransactionId) -> Result<Transaction> {
        self.inner.get_transaction(id)
    }

    fn update_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.inner.update_transaction(transaction)
    }

    fn bulk_update_transactions(&self, transactions: &[Transaction]) -> Result<()> {
        self.inner.bulk_update_transactions(transactions)
    }

    fn transactions_by_task(&self, task_id: TaskId) -> Result<Vec<Transaction>> {
        self.inner.transactions_by_task(task_id)
    }

    fn transaction_by_hash(&self, hash: &str) -> Result<Transaction> {
        self.inner.transaction_by_hash(hash)
    }

    fn recent_done_transactions(
        &self,
        function_id: FunctionId,
        limit: usize,
    ) -> Result<Vec<Transaction>> {
        self.inner.recent_done_transactions(function_id, limit)
    }
}
