//! Ranking of past transactions by the signal a power schedule favours.

use super::RankingStrategy;
use crate::analysis::max_distance_sum;
use crate::config::ScorePolicy;
use crate::constants::UNREACHABLE_DISTANCE;
use crate::model::{Contract, Transaction};

/// Ranks past transactions of a contract, best first.
pub struct SeedOrderer {
    strategy: RankingStrategy,
    policy: ScorePolicy,
    target_instructions_freq: u64,
    total_instructions: usize,
    max_distance_sum: u64,
}

impl SeedOrderer {
    pub fn new(contract: &Contract, strategy: RankingStrategy, policy: ScorePolicy) -> Self {
        Self {
            strategy,
            policy,
            target_instructions_freq: contract.target_instructions_freq,
            total_instructions: contract.total_instructions(),
            max_distance_sum: max_distance_sum(&contract.distance_map),
        }
    }

    /// Sorts by descending score. Equal scores keep their relative order.
    pub fn order_transactions(&self, transactions: &mut [Transaction]) {
        transactions.sort_by(|a, b| self.score(b).total_cmp(&self.score(a)));
    }

    pub fn score(&self, transaction: &Transaction) -> f64 {
        match self.strategy {
            RankingStrategy::Coverage => self.coverage_ratio(transaction),
            RankingStrategy::Distance => self.distance_ratio(transaction),
            RankingStrategy::DistanceCoverage => {
                let hits = self.hits_ratio(transaction);
                let coverage = self.coverage_ratio(transaction);
                let distance = self.distance_ratio(transaction);
                match self.policy {
                    ScorePolicy::WeightedSum {
                        hits: w_hits,
                        coverage: w_coverage,
                        distance: w_distance,
                    } => w_hits * hits + w_coverage * coverage + w_distance * distance,
                    ScorePolicy::Max => hits.max(coverage).max(distance),
                }
            }
        }
    }

    fn hits_ratio(&self, transaction: &Transaction) -> f64 {
        if self.target_instructions_freq == 0 {
            return 0.0;
        }
        transaction.critical_instructions_hits as f64 / self.target_instructions_freq as f64
    }

    fn coverage_ratio(&self, transaction: &Transaction) -> f64 {
        if self.total_instructions == 0 {
            return 0.0;
        }
        transaction.executed_instructions.len() as f64 / self.total_instructions as f64
    }

    fn distance_ratio(&self, transaction: &Transaction) -> f64 {
        if self.max_distance_sum == 0 {
            return 0.0;
        }
        let mut delta = transaction.delta_min_distance;
        // Deltas out of the unreachable state carry the sentinel on top.
        if delta >= u64::from(UNREACHABLE_DISTANCE) {
            delta -= u64::from(UNREACHABLE_DISTANCE);
        }
        delta as f64 / self.max_distance_sum as f64
    }
}
