use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::Contract;

/// One instruction as printed by the decompiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompiledInstruction {
    pub pc: String,
    pub op: String,
}

/// One basic block as printed by the decompiler; PCs are hex or decimal text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompiledBlock {
    pub pc: String,
    pub instructions: Vec<DecompiledInstruction>,
    pub successors: Vec<String>,
}

/// Recovers the basic blocks of a contract's runtime bytecode.
#[async_trait]
pub trait Decompiler: Send + Sync {
    async fn decompile(&self, contract: &Contract) -> anyhow::Result<Vec<DecompiledBlock>>;
}
