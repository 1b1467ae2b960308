//! Constants of the distance analysis and the genetic operators, and the
//! defaults of the campaign configuration.

/// Distance assigned to a basic block that has no path to a target
/// instruction. Any distance at or above this value is treated as "no path".
pub const UNREACHABLE_DISTANCE: u32 = u32::MAX;

/// Probability that the genetic mutation operator fires for one parameter.
pub const MUTATION_CHANCE: f64 = 0.1;

/// Opcodes treated as targets for directed fuzzing when the configuration
/// does not name any. They are the instructions implicated in the weakness
/// classes the oracles look for.
pub const DEFAULT_CRITICAL_INSTRUCTIONS: &[&str] = &[
    "CALL",
    "CALLCODE",
    "DELEGATECALL",
    "SELFDESTRUCT",
    "TIMESTAMP",
    "NUMBER",
    "BLOCKHASH",
];

/// Default number of seeds produced by one power schedule request.
pub const DEFAULT_SEEDS_SIZE: usize = 10;

/// Default number of transactions generated per input request.
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// Default cut points of the ranked seed list used by selection.
/// The first range is `[0, 40%)`, the second `[40%, 70%)` and the third the rest.
pub const DEFAULT_FIRST_RANGE: f64 = 0.4;
pub const DEFAULT_SECOND_RANGE: f64 = 0.7;

/// Default cumulative probabilities of drawing from the first and second
/// range (50% / 30% / 20%).
pub const DEFAULT_FIRST_LIMIT: f64 = 0.5;
pub const DEFAULT_SECOND_LIMIT: f64 = 0.8;

/// Default number of seconds a submitted transaction may wait for its
/// execution callback before the periodic task check closes it.
pub const DEFAULT_TRANSACTION_TIMEOUT_SECS: u64 = 30;
