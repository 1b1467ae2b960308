//! A toy wallet contract, given as its basic blocks, and an interpreter that
//! decides which blocks a call runs through.

use std::collections::BTreeSet;

use num_bigint::BigUint;

use guidefuzz::abi::TypedValue;
use guidefuzz::cfg::Pc;
use guidefuzz::services::{DecompiledBlock, DecompiledInstruction};

pub const WALLET_ABI: &str = r#"[
    {"type": "constructor", "inputs": [{"name": "owner", "type": "address"}]},
    {"type": "function", "name": "deposit", "stateMutability": "nonpayable",
     "inputs": [{"name": "amount", "type": "uint256"}]},
    {"type": "function", "name": "withdraw", "stateMutability": "nonpayable",
     "inputs": [{"name": "amount", "type": "uint256"}, {"name": "to", "type": "address"}]},
    {"type": "function", "name": "lock", "stateMutability": "nonpayable",
     "inputs": [{"name": "locked", "type": "bool"}]}
]"#;

const DISPATCH: Pc = 0x00;
const DEPOSIT: Pc = 0x10;
const LARGE_DEPOSIT: Pc = 0x20;
const WITHDRAW: Pc = 0x30;
const PAYOUT: Pc = 0x40;
const LOCK: Pc = 0x50;
const EXIT: Pc = 0x60;

struct Block {
    pc: Pc,
    instructions: &'static [(Pc, &'static str)],
    successors: &'static [Pc],
}

const LAYOUT: &[Block] = &[
    Block {
        pc: DISPATCH,
        instructions: &[(0x00, "PUSH1"), (0x02, "CALLDATALOAD"), (0x03, "JUMPI")],
        successors: &[DEPOSIT, WITHDRAW, LOCK],
    },
    Block {
        pc: DEPOSIT,
        instructions: &[(0x10, "JUMPDEST"), (0x11, "SSTORE"), (0x12, "JUMPI")],
        successors: &[LARGE_DEPOSIT, EXIT],
    },
    Block {
        pc: LARGE_DEPOSIT,
        instructions: &[(0x20, "JUMPDEST"), (0x21, "NUMBER"), (0x22, "JUMP")],
        successors: &[EXIT],
    },
    Block {
        pc: WITHDRAW,
        instructions: &[(0x30, "JUMPDEST"), (0x31, "SLOAD"), (0x32, "JUMPI")],
        successors: &[PAYOUT, EXIT],
    },
    Block {
        pc: PAYOUT,
        instructions: &[(0x40, "JUMPDEST"), (0x41, "CALL"), (0x42, "JUMP")],
        successors: &[EXIT],
    },
    Block {
        pc: LOCK,
        instructions: &[(0x50, "JUMPDEST"), (0x51, "TIMESTAMP"), (0x52, "SSTORE"), (0x53, "JUMP")],
        successors: &[EXIT],
    },
    Block {
        pc: EXIT,
        instructions: &[(0x60, "JUMPDEST"), (0x61, "STOP")],
        successors: &[],
    },
];

/// The layout the way a decompiler prints it.
pub fn decompiled() -> Vec<DecompiledBlock> {
    LAYOUT
        .iter()
        .map(|block| DecompiledBlock {
            pc: format!("{:#x}", block.pc),
            instructions: block
                .instructions
                .iter()
                .map(|(pc, op)| DecompiledInstruction {
                    pc: format!("{pc:#x}"),
                    op: op.to_string(),
                })
                .collect(),
            successors: block.successors.iter().map(|pc| format!("{pc:#x}")).collect(),
        })
        .collect()
}

/// What the node observed while running one call.
pub struct Execution {
    pub executed: BTreeSet<Pc>,
    pub events: Vec<&'static str>,
}

fn uint(value: Option<&TypedValue>) -> BigUint {
    value
        .and_then(TypedValue::as_str)
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_default()
}

/// Runs `function` with `args`. Unknown functions only hit the dispatcher.
pub fn execute(function: &str, args: &[TypedValue]) -> Execution {
    let mut path = vec![DISPATCH];
    let mut events = Vec::new();
    match function {
        "deposit" => {
            path.push(DEPOSIT);
            events.push("StorageChanged");
            // Deposits above one ether are stamped with the block number.
            if uint(args.first()) > BigUint::from(10u64).pow(18) {
                path.push(LARGE_DEPOSIT);
                events.push("BlockNumber");
            }
        }
        "withdraw" => {
            path.push(WITHDRAW);
            // Odd amounts take the payout branch.
            if uint(args.first()).bit(0) {
                path.push(PAYOUT);
                events.extend(["EtherTransfer", "RepeatedCall"]);
            }
        }
        "lock" => {
            if args.first().and_then(TypedValue::as_bool) == Some(true) {
                path.push(LOCK);
                events.extend(["Timestamp", "StorageChanged"]);
            }
        }
        _ => {}
    }
    path.push(EXIT);

    let executed = LAYOUT
        .iter()
        .filter(|block| path.contains(&block.pc))
        .flat_map(|block| block.instructions.iter().map(|(pc, _)| *pc))
        .collect();
    Execution { executed, events }
}
