//! Wires the pipeline together and drives task lifecycles.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use slog::{Logger, info, o, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::abi::TypeRegistry;
use crate::config::Config;
use crate::error::Result;
use crate::fuzz::FuzzerLeader;
use crate::model::{Contract, Task, TaskId, TaskStatus, TransactionId};
use crate::pipeline::{
    DeployerListener, EventBus, ExecutionRecorder, FuzzerListener, ReporterListener,
    TaskFinishEvent, TaskInputRequestEvent, TaskStartEvent, start_listening,
};
use crate::services::{ChainClient, Decompiler, ReportSink, Store};
use crate::util::{cutoff, deadline, seeded_rng};

/// The external systems a campaign runs against.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn Store>,
    pub chain: Arc<dyn ChainClient>,
    pub decompiler: Arc<dyn Decompiler>,
    pub sink: Arc<dyn ReportSink>,
    pub registry: Arc<dyn TypeRegistry>,
}

/// What a periodic [`Orchestrator::check_tasks`] pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Tasks whose time ran out and that are now `Done`.
    pub finished: Vec<TaskId>,
    /// Transactions closed because their execution callback never came.
    pub timed_out: Vec<TransactionId>,
    /// Running tasks without in-flight transactions that got a new input
    /// request.
    pub redriven: Vec<TaskId>,
}

/// Owns the listeners of a campaign and exposes the task transitions.
///
/// Must be started from within a tokio runtime.
pub struct Orchestrator {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    recorder: Arc<ExecutionRecorder>,
    cancel: CancellationToken,
    listeners: Vec<JoinHandle<()>>,
    transaction_timeout: Duration,
    logger: Logger,
}

impl Orchestrator {
    pub fn start(config: Config, services: Services, logger: Logger) -> Self {
        let bus = Arc::new(EventBus::new());
        let cancel = CancellationToken::new();
        let transaction_timeout = config.transaction_timeout();
        let fuzzer_config = Arc::new(config.fuzzer);
        let leader = Arc::new(FuzzerLeader::from_config(
            fuzzer_config.clone(),
            services.store.clone(),
            services.registry.clone(),
        ));
        info!(logger, "starting pipeline";
            "fuzzers" => ?leader.enabled().collect::<Vec<_>>(),
            "oracles" => ?config.oracles);

        let deployer = Arc::new(DeployerListener::new(
            services.store.clone(),
            services.chain.clone(),
            services.decompiler,
            services.registry.clone(),
            bus.clone(),
            fuzzer_config.critical_instructions.clone(),
            seeded_rng(fuzzer_config.rng_seed, &logger),
            logger.new(o!("component" => "deployer")),
        ));
        let fuzzer = Arc::new(FuzzerListener::new(
            services.store.clone(),
            services.chain,
            services.registry,
            leader,
            bus.clone(),
            fuzzer_config.batch_size,
            seeded_rng(fuzzer_config.rng_seed, &logger),
            logger.new(o!("component" => "fuzzer")),
        ));
        let reporter = Arc::new(ReporterListener::new(
            services.store.clone(),
            services.sink,
            bus.clone(),
            logger.new(o!("component" => "reporter")),
        ));
        let recorder = Arc::new(ExecutionRecorder::new(
            services.store.clone(),
            bus.clone(),
            &fuzzer_config.critical_instructions,
            &config.oracles,
            logger.new(o!("component" => "execution")),
        ));

        let listeners = vec![
            start_listening(deployer, cancel.clone(), &logger),
            start_listening(fuzzer, cancel.clone(), &logger),
            start_listening(reporter, cancel.clone(), &logger),
        ];

        Self {
            store: services.store,
            bus,
            recorder,
            cancel,
            listeners,
            transaction_timeout,
            logger,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Entry point for execution callbacks from the node.
    pub fn recorder(&self) -> &Arc<ExecutionRecorder> {
        &self.recorder
    }

    /// Stores a new task with its contract and the contract's functions.
    pub fn register_task(&self, task: Task, mut contract: Contract) -> Result<TaskId> {
        contract.task_id = task.id;
        let functions = contract.abi()?.functions(contract.id);
        let task_id = task.id;
        self.store.create_task(task)?;
        self.store.create_contract(contract)?;
        self.store.create_functions(functions)?;
        Ok(task_id)
    }

    /// `Created -> Running`: stamps the start time and expiration and starts
    /// the pipeline on the task.
    pub fn start_task(&self, task_id: TaskId, now: DateTime<Utc>) -> Result<()> {
        let mut task = self.store.get_task(task_id)?;
        if task.status != TaskStatus::Created {
            warn!(self.logger, "task already started"; "task_id" => %task_id);
            return Ok(());
        }
        task.status = TaskStatus::Running;
        task.start_time = Some(now);
        task.expiration = Some(deadline(now, task.duration));
        self.store.update_task(&task)?;
        info!(self.logger, "task started";
            "task_id" => %task_id,
            "fuzzing_type" => %task.fuzzing_type);
        self.bus.task_start.publish(TaskStartEvent { task_id });
        Ok(())
    }

    /// Finishes expired tasks, closes transactions that waited too long for
    /// their execution and re-requests inputs for running tasks whose
    /// feedback loop went quiet.
    pub fn check_tasks(&self, now: DateTime<Utc>) -> Result<CheckOutcome> {
        let mut outcome = CheckOutcome::default();
        let stale_before = cutoff(now, self.transaction_timeout);
        for task in self.store.running_tasks()? {
            if task.is_expired(now) {
                self.store.update_task_status(task.id, TaskStatus::Done)?;
                info!(self.logger, "task finished"; "task_id" => %task.id);
                self.bus.task_finish.publish(TaskFinishEvent { task_id: task.id });
                outcome.finished.push(task.id);
                continue;
            }

            // Still deploying.
            if !self.store.find_contract_by_task(task.id)?.is_analyzed() {
                continue;
            }
            outcome
                .timed_out
                .extend(self.recorder.expire_stale(task.id, stale_before)?);
            if !self.recorder.has_pending(task.id)? {
                self.bus
                    .task_input_request
                    .publish(TaskInputRequestEvent { task_id: task.id });
                outcome.redriven.push(task.id);
            }
        }
        Ok(outcome)
    }

    /// Stops every listener and waits for them to return.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for listener in self.listeners {
            if let Err(err) = listener.await {
                warn!(self.logger, "listener ended abnormally"; "error" => %err);
            }
        }
        info!(self.logger, "pipeline stopped");
    }
}
