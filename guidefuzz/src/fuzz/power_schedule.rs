use std::sync::Arc;

use rand::RngCore;
use rand::seq::IndexedRandom;

use super::genetic::{crossover, selection};
use super::orderer::SeedOrderer;
use super::{FunctionTarget, RankingStrategy, Seed, resolve_function};
use crate::abi::{AbiParam, TypeRegistry, TypedValue, deserialize_values};
use crate::config::FuzzerConfig;
use crate::error::{FuzzError, Result};
use crate::model::FunctionId;
use crate::services::Store;

/// Hands out batches of candidate argument tuples for a function.
///
/// A batch is evolved from the function's most recent finished transactions:
/// they are ranked, a pool is drawn from them with rank-biased selection and
/// random pairs of the pool are recombined. Offspring that no longer decode
/// are dropped, and whatever the history cannot fill is topped up from the
/// pre-configured seed corpus.
pub struct PowerSchedule {
    store: Arc<dyn Store>,
    registry: Arc<dyn TypeRegistry>,
    config: Arc<FuzzerConfig>,
}

impl PowerSchedule {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<dyn TypeRegistry>,
        config: Arc<FuzzerConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Returns exactly `seeds_size` argument tuples for `function_id`.
    pub fn request_seeds(
        &self,
        function_id: FunctionId,
        strategy: RankingStrategy,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<TypedValue>>> {
        let target = resolve_function(self.store.as_ref(), function_id)?;
        self.seeds_for(&target, strategy, rng)
    }

    pub(crate) fn seeds_for(
        &self,
        target: &FunctionTarget,
        strategy: RankingStrategy,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<Vec<TypedValue>>> {
        let size = self.config.seeds_size;

        let mut history = self.store.recent_done_transactions(target.id, 2 * size)?;
        SeedOrderer::new(&target.contract, strategy, self.config.score_policy)
            .order_transactions(&mut history);
        let ranked: Vec<Seed> = history.into_iter().map(|tx| tx.inputs).collect();

        let selected: Vec<&Seed> = (0..ranked.len())
            .filter_map(|_| selection(&ranked, &self.config.selection, rng))
            .collect();

        let mut offspring: Vec<Seed> = Vec::new();
        if selected.len() > 2 {
            for _ in 0..2 * size {
                if offspring.len() >= size {
                    break;
                }
                let (Some(first), Some(second)) = (selected.choose(rng), selected.choose(rng))
                else {
                    break;
                };
                if let Some((child_a, child_b)) = crossover(first, second) {
                    offspring.push(child_a);
                    offspring.push(child_b);
                }
            }
            offspring.truncate(size);
        }

        let mut batch = Vec::with_capacity(size);
        for seed in &offspring {
            match deserialize_values(self.registry.as_ref(), &target.inputs, seed) {
                Ok(values) => batch.push(values),
                // Recombined text is not always a valid value of its type.
                Err(FuzzError::InvalidValue { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        while batch.len() < size {
            batch.push(self.corpus_tuple(&target.inputs, rng)?);
        }
        Ok(batch)
    }

    /// One tuple with a random corpus value for every parameter.
    pub(crate) fn corpus_tuple(
        &self,
        inputs: &[AbiParam],
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TypedValue>> {
        inputs
            .iter()
            .map(|param| {
                let mut handler = self.registry.handler_for(&param.ty)?;
                handler.load_seed(&self.config.seeds, rng)?;
                Ok(handler.value())
            })
            .collect()
    }
}
