//! A directed greybox fuzzing engine for smart contracts.
//!
//! The engine generates transaction inputs for a deployed contract's
//! functions, executes them against a blockchain node and feeds what the node
//! observed back into the next round of input generation. Inputs are steered
//! towards unexplored code and towards security-relevant instructions (calls,
//! delegate calls, reads of the block timestamp...), whose distance from every
//! basic block is computed on the contract's control flow graph.
//!
//! ## Getting Started
//!
//! Implement the collaborator traits of [`services`] for your node,
//! decompiler and report destination, then start an
//! [`orchestrator::Orchestrator`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use chrono::Utc;
//! use guidefuzz::abi::BasicTypeRegistry;
//! use guidefuzz::config::Config;
//! use guidefuzz::model::{Contract, FuzzingType, Task, TaskId};
//! use guidefuzz::orchestrator::{Orchestrator, Services};
//! use guidefuzz::services::{ChainClient, Decompiler, InMemoryStore, ReportSink};
//!
//! async fn campaign(
//!     chain: Arc<dyn ChainClient>,
//!     decompiler: Arc<dyn Decompiler>,
//!     sink: Arc<dyn ReportSink>,
//!     abi_json: &str,
//! ) -> guidefuzz::error::Result<()> {
//!     let logger = slog::Logger::root(slog::Discard, slog::o!());
//!     let config = Config::load("guidefuzz.toml")?;
//!     let services = Services {
//!         store: Arc::new(InMemoryStore::new()),
//!         chain,
//!         decompiler,
//!         sink,
//!         registry: Arc::new(BasicTypeRegistry),
//!     };
//!     let orchestrator = Orchestrator::start(config, services, logger);
//!
//!     // 1. Register the task and its contract.
//!     let task = Task::new(FuzzingType::DirectedGreybox, vec![], Duration::from_secs(600));
//!     let contract = Contract::new(TaskId::new(), "Wallet", abi_json);
//!     let task_id = orchestrator.register_task(task, contract)?;
//!
//!     // 2. Start it: the contract gets deployed, analyzed and fuzzed.
//!     orchestrator.start_task(task_id, Utc::now())?;
//!
//!     // 3. Execution callbacks from the node go to the recorder:
//!     //    orchestrator.recorder().record_execution(tx_hash, &executed_pcs)
//!
//!     // 4. A periodic check finishes the task once it expires, which
//!     //    sends its report.
//!     orchestrator.check_tasks(Utc::now())?;
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! For a complete local run, see `demos/local_campaign` in the repository.
pub mod abi;
pub mod analysis;
pub mod cfg;
pub mod config;
pub mod error;
pub mod fuzz;
pub mod model;
pub mod oracle;
pub mod orchestrator;
pub mod pipeline;
pub mod report;
pub mod services;
pub mod util;

pub mod constants;

pub use error::{FuzzError, Result};
