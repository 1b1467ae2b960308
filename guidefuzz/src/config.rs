//! Campaign configuration, loaded from TOML.
//!
//! ```toml
//! oracles = ["reentrancy", "number_dependency"]
//! transaction_timeout_secs = 30
//!
//! [fuzzer]
//! seeds_size = 10
//! batch_size = 5
//! critical_instructions = ["CALL", "DELEGATECALL"]
//! enabled_fuzzers = ["greybox", "directed_greybox"]
//!
//! [fuzzer.seeds]
//! uint256 = ["0", "1", "115792089237316195423570985008687907853269984665640564039457584007913129639935"]
//!
//! [fuzzer.score_policy]
//! kind = "weighted_sum"
//! hits = 0.1
//! coverage = 0.6
//! distance = 0.3
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::abi::SeedCorpus;
use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_CRITICAL_INSTRUCTIONS, DEFAULT_FIRST_LIMIT, DEFAULT_FIRST_RANGE,
    DEFAULT_SECOND_LIMIT, DEFAULT_SECOND_RANGE, DEFAULT_SEEDS_SIZE,
    DEFAULT_TRANSACTION_TIMEOUT_SECS,
};
use crate::error::{FuzzError, Result};
use crate::model::FuzzingType;
use crate::oracle::OracleKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub fuzzer: FuzzerConfig,
    /// Oracles run over every recorded execution.
    pub oracles: Vec<OracleKind>,
    /// Seconds a submitted transaction waits for its execution callback
    /// before it is closed and its task fuzzed again.
    pub transaction_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            fuzzer: FuzzerConfig::default(),
            oracles: OracleKind::ALL.to_vec(),
            transaction_timeout_secs: DEFAULT_TRANSACTION_TIMEOUT_SECS,
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| FuzzError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FuzzError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transaction_timeout_secs == 0 {
            return Err(FuzzError::Config(
                "transaction_timeout_secs must be positive".to_string(),
            ));
        }
        self.fuzzer.validate()
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_secs(self.transaction_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FuzzerConfig {
    /// Number of input tuples a power schedule hands out per request.
    pub seeds_size: usize,
    /// Number of transactions generated per input request.
    pub batch_size: usize,
    /// Opcodes that become targets of the distance analysis.
    pub critical_instructions: Vec<String>,
    /// Pre-configured values per ABI type, used to bootstrap and top up pools.
    pub seeds: SeedCorpus,
    pub score_policy: ScorePolicy,
    pub selection: SelectionConfig,
    pub enabled_fuzzers: Vec<FuzzingType>,
    /// Fixed seed for the random generators; drawn from the OS when absent.
    pub rng_seed: Option<u64>,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        Self {
            seeds_size: DEFAULT_SEEDS_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            critical_instructions: DEFAULT_CRITICAL_INSTRUCTIONS
                .iter()
                .map(|op| op.to_string())
                .collect(),
            seeds: SeedCorpus::new(),
            score_policy: ScorePolicy::default(),
            selection: SelectionConfig::default(),
            enabled_fuzzers: FuzzingType::ALL.to_vec(),
            rng_seed: None,
        }
    }
}

impl FuzzerConfig {
    fn validate(&self) -> Result<()> {
        if self.seeds_size == 0 {
            return Err(FuzzError::Config("seeds_size must be positive".to_string()));
        }
        if self.batch_size == 0 {
            return Err(FuzzError::Config("batch_size must be positive".to_string()));
        }
        self.selection.validate()
    }
}

/// How the coverage, distance and critical-hit signals of a transaction are
/// combined into one score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorePolicy {
    WeightedSum {
        hits: f64,
        coverage: f64,
        distance: f64,
    },
    /// The strongest of the three signals.
    Max,
}

impl Default for ScorePolicy {
    fn default() -> Self {
        ScorePolicy::WeightedSum {
            hits: 0.1,
            coverage: 0.6,
            distance: 0.3,
        }
    }
}

/// Rank-biased selection over an ordered pool.
///
/// The pool is cut in three ranges at `first_range` and `second_range`
/// (fractions of its length). A uniform draw below `first_limit` picks from
/// the first range, below `second_limit` from the second, otherwise from the
/// third.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    pub first_range: f64,
    pub second_range: f64,
    pub first_limit: f64,
    pub second_limit: f64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            first_range: DEFAULT_FIRST_RANGE,
            second_range: DEFAULT_SECOND_RANGE,
            first_limit: DEFAULT_FIRST_LIMIT,
            second_limit: DEFAULT_SECOND_LIMIT,
        }
    }
}

impl SelectionConfig {
    fn validate(&self) -> Result<()> {
        let ordered = |a: f64, b: f64| 0.0 <= a && a <= b && b <= 1.0;
        if !ordered(self.first_range, self.second_range) {
            return Err(FuzzError::Config(
                "selection ranges must satisfy 0 <= first_range <= second_range <= 1".to_string(),
            ));
        }
        if !ordered(self.first_limit, self.second_limit) {
            return Err(FuzzError::Config(
                "selection limits must satisfy 0 <= first_limit <= second_limit <= 1".to_string(),
            ));
        }
        Ok(())
    }
}
