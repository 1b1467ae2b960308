//! Records the pipeline creates and enriches while a campaign runs.
//!
//! The records are plain data: persistence is delegated to a
//! [`Store`](crate::services::Store), and every stage of the pipeline loads,
//! updates and saves them independently.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::abi::AbiDefinition;
use crate::analysis::DistanceMap;
use crate::cfg::{ControlFlowGraph, Pc};
use crate::error::Result;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

record_id!(TaskId);
record_id!(ContractId);
record_id!(FunctionId);
record_id!(TransactionId);

/// The fuzzing strategy a task runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FuzzingType {
    Blackbox,
    Greybox,
    DirectedGreybox,
    OtherDirectedGreybox,
    GeneticAlgorithm,
}

impl FuzzingType {
    pub const ALL: [FuzzingType; 5] = [
        FuzzingType::Blackbox,
        FuzzingType::Greybox,
        FuzzingType::DirectedGreybox,
        FuzzingType::OtherDirectedGreybox,
        FuzzingType::GeneticAlgorithm,
    ];
}

impl fmt::Display for FuzzingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FuzzingType::Blackbox => "blackbox",
            FuzzingType::Greybox => "greybox",
            FuzzingType::DirectedGreybox => "directed_greybox",
            FuzzingType::OtherDirectedGreybox => "other_directed_greybox",
            FuzzingType::GeneticAlgorithm => "genetic_algorithm",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    Running,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Created,
    Running,
    Done,
    SendError,
}

impl TransactionStatus {
    /// A transaction is in flight until the node either rejected it or its
    /// execution has been recorded.
    pub fn is_pending(self) -> bool {
        matches!(self, TransactionStatus::Created | TransactionStatus::Running)
    }
}

/// A fuzzing campaign against one contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub fuzzing_type: FuzzingType,
    /// Serialized constructor arguments. When empty, the deployer generates them.
    pub arguments: Vec<String>,
    pub status: TaskStatus,
    pub duration: Duration,
    pub start_time: Option<DateTime<Utc>>,
    pub expiration: Option<DateTime<Utc>>,
    /// Union of the instructions executed by every transaction of the task.
    pub aggregated_executed_instructions: BTreeSet<Pc>,
}

impl Task {
    pub fn new(fuzzing_type: FuzzingType, arguments: Vec<String>, duration: Duration) -> Self {
        Self {
            id: TaskId::new(),
            fuzzing_type,
            arguments,
            status: TaskStatus::Created,
            duration,
            start_time: None,
            expiration: None,
            aggregated_executed_instructions: BTreeSet::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.is_some_and(|expiration| expiration <= now)
    }

    /// Merges executed instructions into the running aggregate. The aggregate
    /// only ever grows.
    pub fn merge_executed(&mut self, executed: &BTreeSet<Pc>) {
        self.aggregated_executed_instructions
            .extend(executed.iter().copied());
    }
}

/// A compiled contract, enriched with its CFG and distance map once deployed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub task_id: TaskId,
    pub name: String,
    pub source: String,
    pub compiled_code: String,
    pub runtime_bytecode: String,
    pub abi_definition: String,
    pub address: Option<String>,
    pub deployment_tx_hash: Option<String>,
    pub cfg: Option<ControlFlowGraph>,
    pub distance_map: DistanceMap,
    /// Number of critical instruction occurrences in the contract.
    pub target_instructions_freq: u64,
}

impl Contract {
    pub fn new(task_id: TaskId, name: impl Into<String>, abi_definition: impl Into<String>) -> Self {
        Self {
            id: ContractId::new(),
            task_id,
            name: name.into(),
            source: String::new(),
            compiled_code: String::new(),
            runtime_bytecode: String::new(),
            abi_definition: abi_definition.into(),
            address: None,
            deployment_tx_hash: None,
            cfg: None,
            distance_map: DistanceMap::new(),
            target_instructions_freq: 0,
        }
    }

    pub fn abi(&self) -> Result<AbiDefinition> {
        AbiDefinition::parse(&self.abi_definition)
    }

    pub fn is_analyzed(&self) -> bool {
        self.cfg.is_some()
    }

    pub fn total_instructions(&self) -> usize {
        self.cfg.as_ref().map_or(0, |cfg| cfg.instructions().len())
    }

    /// Attaches the CFG and distance map computed after deployment.
    ///
    /// Enrichment happens once: if the contract already carries an analysis,
    /// the new one is discarded and `false` is returned.
    pub fn attach_analysis(&mut self, cfg: ControlFlowGraph, distance_map: DistanceMap) -> bool {
        if self.is_analyzed() {
            return false;
        }
        self.target_instructions_freq = distance_map.len() as u64;
        self.cfg = Some(cfg);
        self.distance_map = distance_map;
        true
    }
}

/// A contract function (or its constructor) as declared by the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub id: FunctionId,
    pub contract_id: ContractId,
    pub name: String,
    pub number_of_args: usize,
    pub payable: bool,
    pub is_constructor: bool,
}

/// A fuzzed call, from generation to its recorded execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub task_id: TaskId,
    pub function_id: FunctionId,
    pub inputs: Vec<String>,
    pub status: TransactionStatus,
    pub blockchain_hash: Option<String>,
    pub executed_instructions: BTreeSet<Pc>,
    pub detected_weaknesses: BTreeSet<String>,
    /// Coverage gained over the task aggregate when this transaction executed.
    pub delta_coverage: f64,
    /// Reduction of the task's minimum distance to a target.
    pub delta_min_distance: u64,
    pub critical_instructions_hits: u64,
    pub timestamp: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        task_id: TaskId,
        function_id: FunctionId,
        inputs: Vec<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::new(),
            task_id,
            function_id,
            inputs,
            status: TransactionStatus::Created,
            blockchain_hash: None,
            executed_instructions: BTreeSet::new(),
            detected_weaknesses: BTreeSet::new(),
            delta_coverage: 0.0,
            delta_min_distance: 0,
            critical_instructions_hits: 0,
            timestamp,
        }
    }
}
