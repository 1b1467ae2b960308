//! Input generation strategies and the machinery they share.
//!
//! A [`Fuzzer`] turns a function id into one tuple of typed arguments. The
//! greybox family asks a [`PowerSchedule`](power_schedule::PowerSchedule) for
//! a batch of candidate tuples, built from the best past transactions of that
//! function (ranked by [`SeedOrderer`](orderer::SeedOrderer)) and evolved with
//! the [`genetic`] operators, then mutates the tuple it picks.

pub mod blackbox;
pub mod genetic;
pub mod genetic_algorithm;
pub mod greybox;
pub mod leader;
pub mod orderer;
pub mod power_schedule;

use rand::RngCore;

use crate::abi::{AbiParam, TypedValue};
use crate::error::Result;
use crate::model::{Contract, FunctionId};
use crate::services::Store;

pub use leader::FuzzerLeader;

/// Serialized inputs of one past transaction, one string per parameter.
pub type Seed = Vec<String>;

pub trait Fuzzer: Send + Sync {
    fn generate_input(
        &self,
        function_id: FunctionId,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TypedValue>>;
}

/// The signal a power schedule ranks past transactions by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RankingStrategy {
    Coverage,
    Distance,
    /// Every signal, combined by the configured
    /// [`ScorePolicy`](crate::config::ScorePolicy).
    DistanceCoverage,
}

/// A function together with its contract and parameter list.
pub(crate) struct FunctionTarget {
    pub id: FunctionId,
    pub contract: Contract,
    pub inputs: Vec<AbiParam>,
}

pub(crate) fn resolve_function(store: &dyn Store, function_id: FunctionId) -> Result<FunctionTarget> {
    let function = store.get_function(function_id)?;
    let contract = store.get_contract(function.contract_id)?;
    let abi = contract.abi()?;
    let inputs = if function.is_constructor {
        abi.constructor()
            .map(|ctor| ctor.inputs.clone())
            .unwrap_or_default()
    } else {
        abi.method(&function.name)?.inputs.clone()
    };
    Ok(FunctionTarget {
        id: function_id,
        contract,
        inputs,
    })
}
