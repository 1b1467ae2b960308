use thiserror::Error;

use crate::model::FuzzingType;

/// Errors raised by the fuzzing engine.
///
/// Every error is scoped to the task or transaction being processed; the
/// pipeline logs it and moves on to the next event.
#[derive(Error, Debug)]
pub enum FuzzError {
    /// A task, contract, function or transaction record is missing.
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    /// The contract's ABI definition could not be parsed, or lacks a method.
    #[error("malformed ABI definition: {0}")]
    MalformedAbi(String),

    /// The decompiler returned blocks that cannot form a control flow graph.
    #[error("malformed control flow graph: {0}")]
    MalformedCfg(String),

    /// A seed does not carry one field per function parameter.
    #[error("seeds list is invalid: expected {expected} fields, found {found}")]
    SeedListInvalid { expected: usize, found: usize },

    /// A serialized value could not be decoded by its type handler.
    #[error("value {value:?} is not a valid {ty}")]
    InvalidValue { ty: String, value: String },

    /// No type handler exists for the given ABI type.
    #[error("unsupported ABI type {0}")]
    UnsupportedType(String),

    /// The pre-configured seed corpus holds no value for the given ABI type.
    #[error("no pre-configured seeds for type {0}")]
    MissingSeeds(String),

    /// The contract exposes no function that can be fuzzed.
    #[error("contract {0} has no candidate function to fuzz")]
    NoCandidateFunction(String),

    /// The requested fuzzing strategy is disabled or unknown.
    #[error("fuzzing strategy {0} not found")]
    StrategyNotFound(FuzzingType),

    /// A collaborator (chain node, decompiler, report sink) failed.
    #[error("{service} failed: {source}")]
    External {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FuzzError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn external(service: &'static str, source: anyhow::Error) -> Self {
        Self::External { service, source }
    }

    /// External failures can be re-driven by publishing the triggering event
    /// again. Everything else fails the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::External { .. })
    }
}

pub type Result<T, E = FuzzError> = std::result::Result<T, E>;
