use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use slog::{Logger, debug, info};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{EventBus, Listener, TaskInputRequestEvent, TaskStartEvent};
use crate::abi::{AbiParam, TypeRegistry, TypedValue, deserialize_values};
use crate::analysis::compute_distance_map;
use crate::cfg::ControlFlowGraph;
use crate::error::{FuzzError, Result};
use crate::model::{Task, Transaction, TransactionStatus};
use crate::services::{ChainClient, Decompiler, Store};

/// Deploys the contract of a starting task and attaches its CFG and distance
/// map, then requests the first batch of inputs.
pub struct DeployerListener {
    store: Arc<dyn Store>,
    chain: Arc<dyn ChainClient>,
    decompiler: Arc<dyn Decompiler>,
    registry: Arc<dyn TypeRegistry>,
    bus: Arc<EventBus>,
    critical_instructions: Vec<String>,
    rng: Mutex<StdRng>,
    logger: Logger,
}

impl DeployerListener {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn Store>,
        chain: Arc<dyn ChainClient>,
        decompiler: Arc<dyn Decompiler>,
        registry: Arc<dyn TypeRegistry>,
        bus: Arc<EventBus>,
        critical_instructions: Vec<String>,
        rng: StdRng,
        logger: Logger,
    ) -> Self {
        Self {
            store,
            chain,
            decompiler,
            registry,
            bus,
            critical_instructions,
            rng: Mutex::new(rng),
            logger,
        }
    }

    /// Typed constructor arguments and their serialized form: the task's
    /// arguments when it has some, freshly generated values otherwise.
    fn constructor_args(
        &self,
        task: &Task,
        inputs: &[AbiParam],
    ) -> Result<(Vec<TypedValue>, Vec<String>)> {
        if !task.arguments.is_empty() {
            let values = deserialize_values(self.registry.as_ref(), inputs, &task.arguments)?;
            return Ok((values, task.arguments.clone()));
        }

        let mut rng = self.rng.lock();
        let mut values = Vec::with_capacity(inputs.len());
        let mut serialized = Vec::with_capacity(inputs.len());
        for param in inputs {
            let mut handler = self.registry.handler_for(&param.ty)?;
            handler.generate(&mut *rng);
            values.push(handler.value());
            serialized.push(handler.serialize());
        }
        Ok((values, serialized))
    }
}

#[async_trait]
impl Listener for DeployerListener {
    type Event = TaskStartEvent;

    fn name(&self) -> &'static str {
        "contract-deployer"
    }

    fn subscribe(&self) -> UnboundedReceiver<TaskStartEvent> {
        self.bus.task_start.subscribe()
    }

    async fn handle(&self, event: TaskStartEvent) -> Result<()> {
        let task = self.store.get_task(event.task_id)?;
        let mut contract = self.store.find_contract_by_task(task.id)?;
        let constructor = self.store.find_constructor(contract.id)?;
        let inputs = contract
            .abi()?
            .constructor()
            .map(|ctor| ctor.inputs.clone())
            .unwrap_or_default();
        let (args, serialized) = self.constructor_args(&task, &inputs)?;

        let deployment = self
            .chain
            .deploy(&contract, &args)
            .await
            .map_err(|e| FuzzError::external("chain client", e))?;
        info!(self.logger, "contract deployed";
            "task_id" => %task.id,
            "contract" => &contract.name,
            "address" => &deployment.address);

        contract.address = Some(deployment.address);
        contract.deployment_tx_hash = Some(deployment.tx_hash.clone());

        let mut deploy_tx = Transaction::new(task.id, constructor.id, serialized, Utc::now());
        deploy_tx.status = TransactionStatus::Done;
        deploy_tx.blockchain_hash = Some(deployment.tx_hash);
        self.store.create_transaction(deploy_tx)?;

        if contract.is_analyzed() {
            debug!(self.logger, "contract already analyzed, keeping its CFG"; "contract" => &contract.name);
        } else {
            let blocks = self
                .decompiler
                .decompile(&contract)
                .await
                .map_err(|e| FuzzError::external("decompiler", e))?;
            let cfg = ControlFlowGraph::from_decompiled(&blocks)?;
            let distance_map = compute_distance_map(&cfg, &self.critical_instructions);
            debug!(self.logger, "contract analyzed";
                "blocks" => cfg.blocks().len(),
                "instructions" => cfg.instructions().len(),
                "targets" => distance_map.len());
            contract.attach_analysis(cfg, distance_map);
        }
        self.store.update_contract(&contract)?;

        self.bus
            .task_input_request
            .publish(TaskInputRequestEvent { task_id: task.id });
        Ok(())
    }
}
