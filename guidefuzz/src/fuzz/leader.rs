use std::collections::BTreeMap;
use std::sync::Arc;

use super::blackbox::BlackboxFuzzer;
use super::genetic_algorithm::GeneticAlgorithmFuzzer;
use super::greybox::GreyboxFuzzer;
use super::power_schedule::PowerSchedule;
use super::{Fuzzer, RankingStrategy};
use crate::abi::TypeRegistry;
use crate::config::FuzzerConfig;
use crate::error::{FuzzError, Result};
use crate::model::FuzzingType;
use crate::services::Store;

/// Registry of the enabled fuzzing strategies.
pub struct FuzzerLeader {
    fuzzers: BTreeMap<FuzzingType, Box<dyn Fuzzer>>,
}

impl FuzzerLeader {
    pub fn new(fuzzers: BTreeMap<FuzzingType, Box<dyn Fuzzer>>) -> Self {
        Self { fuzzers }
    }

    /// Builds one fuzzer per entry of `enabled_fuzzers`, all sharing a single
    /// power schedule.
    pub fn from_config(
        config: Arc<FuzzerConfig>,
        store: Arc<dyn Store>,
        registry: Arc<dyn TypeRegistry>,
    ) -> Self {
        let schedule = Arc::new(PowerSchedule::new(
            store.clone(),
            registry.clone(),
            config.clone(),
        ));
        let greybox = |strategy| -> Box<dyn Fuzzer> {
            Box::new(GreyboxFuzzer::new(
                strategy,
                schedule.clone(),
                store.clone(),
                registry.clone(),
            ))
        };

        let fuzzers = config
            .enabled_fuzzers
            .iter()
            .map(|&ty| {
                let fuzzer: Box<dyn Fuzzer> = match ty {
                    FuzzingType::Blackbox => Box::new(BlackboxFuzzer::new(
                        store.clone(),
                        registry.clone(),
                        Arc::new(config.seeds.clone()),
                    )),
                    FuzzingType::Greybox => greybox(RankingStrategy::Coverage),
                    FuzzingType::DirectedGreybox => greybox(RankingStrategy::Distance),
                    FuzzingType::OtherDirectedGreybox => {
                        greybox(RankingStrategy::DistanceCoverage)
                    }
                    FuzzingType::GeneticAlgorithm => Box::new(GeneticAlgorithmFuzzer::new(
                        schedule.clone(),
                        store.clone(),
                        registry.clone(),
                        config.selection,
                    )),
                };
                (ty, fuzzer)
            })
            .collect();
        Self::new(fuzzers)
    }

    pub fn get(&self, fuzzing_type: FuzzingType) -> Result<&dyn Fuzzer> {
        self.fuzzers
            .get(&fuzzing_type)
            .map(Box::as_ref)
            .ok_or(FuzzError::StrategyNotFound(fuzzing_type))
    }

    pub fn enabled(&self) -> impl Iterator<Item = FuzzingType> + '_ {
        self.fuzzers.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::abi::BasicTypeRegistry;
    use crate::services::InMemoryStore;

    impl std::fmt::Debug for dyn Fuzzer + '_ {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn Fuzzer")
        }
    }

    fn leader(enabled: Vec<FuzzingType>) -> FuzzerLeader {
        let config = FuzzerConfig {
            enabled_fuzzers: enabled,
            ..FuzzerConfig::default()
        };
        FuzzerLeader::from_config(
            Arc::new(config),
            Arc::new(InMemoryStore::new()),
            Arc::new(BasicTypeRegistry),
        )
    }

    #[test]
    fn every_type_has_a_strategy() {
        let leader = leader(FuzzingType::ALL.to_vec());
        for ty in FuzzingType::ALL {
            assert!(leader.get(ty).is_ok(), "{ty} missing");
        }
    }

    #[test]
    fn disabled_types_are_not_found() {
        let leader = leader(vec![FuzzingType::Blackbox]);
        assert_eq!(leader.enabled().collect::<Vec<_>>(), vec![FuzzingType::Blackbox]);
        assert_matches!(
            leader.get(FuzzingType::DirectedGreybox),
            Err(FuzzError::StrategyNotFound(FuzzingType::DirectedGreybox))
        );
    }
}
