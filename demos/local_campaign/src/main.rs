//! Runs a short campaign against a simulated wallet contract and prints the
//! final report as JSON.
//!
//! ```text
//! cargo run -p local_campaign -- [fuzzing_type]
//! ```
//!
//! `GUIDEFUZZ_CONFIG` may point to a TOML configuration; the built-in one
//! is used otherwise.

mod wallet;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use slog::{Drain, Logger, debug, info, o, warn};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

use guidefuzz::FuzzError;
use guidefuzz::abi::{BasicTypeRegistry, TypedValue};
use guidefuzz::config::{Config, FuzzerConfig};
use guidefuzz::model::{Contract, FuzzingType, Task, TaskId, TransactionId};
use guidefuzz::oracle::EventsSnapshot;
use guidefuzz::orchestrator::{Orchestrator, Services};
use guidefuzz::report::TaskReport;
use guidefuzz::services::{
    BatchOutcome, ChainClient, DecompiledBlock, Decompiler, Deployment, InMemoryStore, ReportSink,
};

const CAMPAIGN_DURATION: Duration = Duration::from_secs(5);
const BLOCK_TIME: Duration = Duration::from_millis(100);

/// A call accepted by the simulated node, waiting to be mined.
struct Call {
    hash: String,
    function: String,
    args: Vec<TypedValue>,
}

struct SimulatedChain {
    mempool: UnboundedSender<Call>,
    nonce: AtomicU64,
}

impl SimulatedChain {
    fn next_hash(&self) -> String {
        format!("0x{:064x}", self.nonce.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChainClient for SimulatedChain {
    async fn deploy(&self, _contract: &Contract, _args: &[TypedValue]) -> anyhow::Result<Deployment> {
        Ok(Deployment {
            address: "0x5fbdb2315678afecb367f032d93f642f64180aa3".to_string(),
            tx_hash: self.next_hash(),
        })
    }

    async fn batch_call(
        &self,
        _contract: &Contract,
        function: &str,
        inputs: &BTreeMap<TransactionId, Vec<TypedValue>>,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (id, args) in inputs {
            let hash = self.next_hash();
            let call = Call {
                hash: hash.clone(),
                function: function.to_string(),
                args: args.clone(),
            };
            match self.mempool.send(call) {
                Ok(()) => {
                    outcome.hashes.insert(*id, hash);
                }
                Err(_) => {
                    outcome.errors.insert(*id, "node is shutting down".to_string());
                }
            }
        }
        outcome
    }
}

struct WalletDecompiler;

#[async_trait]
impl Decompiler for WalletDecompiler {
    async fn decompile(&self, _contract: &Contract) -> anyhow::Result<Vec<DecompiledBlock>> {
        Ok(wallet::decompiled())
    }
}

struct ChannelSink(UnboundedSender<TaskReport>);

#[async_trait]
impl ReportSink for ChannelSink {
    async fn send_report(&self, report: &TaskReport) -> anyhow::Result<()> {
        self.0
            .send(report.clone())
            .map_err(|_| anyhow!("report receiver dropped"))
    }
}

fn terminal_logger() -> Logger {
    let decorator = slog_term::TermDecorator::new().build();
    let drain = slog_term::FullFormat::new(decorator).build().fuse();
    let drain = slog_async::Async::new(drain).build().fuse();
    Logger::root(drain, o!("campaign" => "local"))
}

fn seeds(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

fn builtin_config() -> Config {
    let mut fuzzer = FuzzerConfig {
        batch_size: 4,
        seeds_size: 8,
        ..FuzzerConfig::default()
    };
    fuzzer.seeds.insert(
        "uint256".to_string(),
        seeds(&["0", "1", "2", "1000000000000000000", "1000000000000000001"]),
    );
    fuzzer.seeds.insert(
        "address".to_string(),
        seeds(&[
            "0x0000000000000000000000000000000000000000",
            "0x70997970c51812dc3a010c7d01b50e0d17dc79c8",
        ]),
    );
    fuzzer.seeds.insert("bool".to_string(), seeds(&["true", "false"]));
    Config {
        fuzzer,
        ..Config::default()
    }
}

fn fuzzing_type(arg: Option<String>) -> anyhow::Result<FuzzingType> {
    let Some(arg) = arg else {
        return Ok(FuzzingType::DirectedGreybox);
    };
    FuzzingType::ALL
        .into_iter()
        .find(|ty| ty.to_string() == arg)
        .ok_or_else(|| anyhow!("unknown fuzzing type {arg:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let logger = terminal_logger();
    let config = match std::env::var_os("GUIDEFUZZ_CONFIG") {
        Some(path) => Config::load(&path).context("loading GUIDEFUZZ_CONFIG")?,
        None => builtin_config(),
    };
    let fuzzing_type = fuzzing_type(std::env::args().nth(1))?;

    let (mempool, mut pending_calls) = unbounded_channel();
    let (reports, mut finished) = unbounded_channel();
    let services = Services {
        store: Arc::new(InMemoryStore::new()),
        chain: Arc::new(SimulatedChain {
            mempool,
            nonce: AtomicU64::new(1),
        }),
        decompiler: Arc::new(WalletDecompiler),
        sink: Arc::new(ChannelSink(reports)),
        registry: Arc::new(BasicTypeRegistry),
    };
    let orchestrator = Orchestrator::start(config, services, logger.clone());

    let task = Task::new(fuzzing_type, vec![], CAMPAIGN_DURATION);
    let contract = Contract::new(TaskId::new(), "Wallet", wallet::WALLET_ABI);
    let task_id = orchestrator.register_task(task, contract)?;
    orchestrator.start_task(task_id, Utc::now())?;
    info!(logger, "campaign started"; "task_id" => %task_id, "fuzzing_type" => %fuzzing_type);

    let recorder = orchestrator.recorder().clone();
    let mut blocks = tokio::time::interval(BLOCK_TIME);
    let mut backlog: Vec<Call> = Vec::new();
    let report = loop {
        tokio::select! {
            Some(report) = finished.recv() => break report,
            _ = blocks.tick() => {
                while let Ok(call) = pending_calls.try_recv() {
                    backlog.push(call);
                }
                let mut unmined = Vec::new();
                for call in backlog.drain(..) {
                    let execution = wallet::execute(&call.function, &call.args);
                    match recorder.record_execution(&call.hash, &execution.executed) {
                        Ok(_) => {}
                        // The fuzzer has not stored the hash yet.
                        Err(FuzzError::NotFound { .. }) => {
                            unmined.push(call);
                            continue;
                        }
                        Err(err) => return Err(err.into()),
                    }
                    let snapshot = EventsSnapshot::from_events(&execution.events);
                    for weakness in recorder.record_weaknesses(&call.hash, &snapshot)? {
                        info!(logger, "weakness detected";
                            "weakness" => weakness,
                            "function" => &call.function,
                            "args" => ?call.args);
                    }
                }
                backlog = unmined;
                let outcome = orchestrator.check_tasks(Utc::now())?;
                if !outcome.timed_out.is_empty() {
                    warn!(logger, "transactions timed out"; "count" => outcome.timed_out.len());
                }
                if !outcome.redriven.is_empty() {
                    debug!(logger, "redriven tasks"; "tasks" => outcome.redriven.len());
                }
            }
        }
    };

    orchestrator.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
