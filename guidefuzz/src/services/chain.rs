use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::abi::TypedValue;
use crate::model::{Contract, TransactionId};

/// Result of a contract deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub address: String,
    pub tx_hash: String,
}

/// Per-transaction result of a batch submission. Every submitted transaction
/// appears in exactly one of the two maps.
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub hashes: BTreeMap<TransactionId, String>,
    pub errors: BTreeMap<TransactionId, String>,
}

/// The blockchain node the fuzzed contract lives on.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn deploy(&self, contract: &Contract, args: &[TypedValue]) -> anyhow::Result<Deployment>;

    /// Submits one call of `function` per entry. Failures are reported per
    /// transaction; the batch itself never fails.
    async fn batch_call(
        &self,
        contract: &Contract,
        function: &str,
        inputs: &BTreeMap<TransactionId, Vec<TypedValue>>,
    ) -> BatchOutcome;
}
