//! Control flow graph of a deployed contract, as recovered by the decompiler.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{FuzzError, Result};
use crate::services::DecompiledBlock;

/// A program counter inside the runtime bytecode.
pub type Pc = u64;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasicBlock {
    /// PC of the first instruction of the block; also its key in the graph.
    pub pc: Pc,
    /// Opcodes of the block, keyed by their PC.
    pub instructions: BTreeMap<Pc, String>,
    pub successors: Vec<Pc>,
}

/// Basic blocks keyed by PC, plus an index from every instruction to the
/// block containing it.
///
/// Successors that are not block keys point outside the recovered graph and
/// are ignored by the analyses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFlowGraph {
    blocks: BTreeMap<Pc, BasicBlock>,
    instructions: BTreeMap<Pc, String>,
    block_of: BTreeMap<Pc, Pc>,
}

impl ControlFlowGraph {
    pub fn new(blocks: impl IntoIterator<Item = BasicBlock>) -> Self {
        let mut cfg = Self::default();
        for block in blocks {
            cfg.block_of.insert(block.pc, block.pc);
            for (&pc, op) in &block.instructions {
                cfg.instructions.insert(pc, op.clone());
                cfg.block_of.insert(pc, block.pc);
            }
            cfg.blocks.insert(block.pc, block);
        }
        cfg
    }

    /// Builds the graph from the decompiler's output, parsing its PCs.
    pub fn from_decompiled(blocks: &[DecompiledBlock]) -> Result<Self> {
        let blocks = blocks
            .iter()
            .map(|block| {
                let instructions = block
                    .instructions
                    .iter()
                    .map(|instruction| Ok((parse_pc(&instruction.pc)?, instruction.op.clone())))
                    .collect::<Result<BTreeMap<_, _>>>()?;
                let successors = block
                    .successors
                    .iter()
                    .map(|pc| parse_pc(pc))
                    .collect::<Result<Vec<_>>>()?;
                Ok(BasicBlock {
                    pc: parse_pc(&block.pc)?,
                    instructions,
                    successors,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(blocks))
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn blocks(&self) -> &BTreeMap<Pc, BasicBlock> {
        &self.blocks
    }

    pub fn block(&self, pc: Pc) -> Option<&BasicBlock> {
        self.blocks.get(&pc)
    }

    /// Every known instruction of the contract, keyed by PC.
    pub fn instructions(&self) -> &BTreeMap<Pc, String> {
        &self.instructions
    }

    pub fn opcode(&self, pc: Pc) -> Option<&str> {
        self.instructions.get(&pc).map(String::as_str)
    }

    /// PC of the block that contains the instruction at `pc`.
    pub fn containing_block(&self, pc: Pc) -> Option<Pc> {
        self.block_of.get(&pc).copied()
    }

    /// Reverse adjacency restricted to edges between known blocks. Sets keep
    /// predecessors in ascending PC order.
    pub fn predecessors(&self) -> BTreeMap<Pc, BTreeSet<Pc>> {
        let mut predecessors: BTreeMap<Pc, BTreeSet<Pc>> = BTreeMap::new();
        for block in self.blocks.values() {
            for successor in &block.successors {
                if self.blocks.contains_key(successor) {
                    predecessors.entry(*successor).or_default().insert(block.pc);
                }
            }
        }
        predecessors
    }
}

/// Parses a PC written either as `0x`-prefixed hex or as a decimal number.
pub fn parse_pc(raw: &str) -> Result<Pc> {
    let raw = raw.trim();
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => Pc::from_str_radix(hex, 16),
        None => raw.parse::<Pc>(),
    };
    parsed.map_err(|_| FuzzError::MalformedCfg(format!("invalid program counter {raw:?}")))
}
