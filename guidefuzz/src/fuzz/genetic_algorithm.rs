use std::sync::Arc;

use rand::RngCore;

use super::genetic::{mutation, selection};
use super::power_schedule::PowerSchedule;
use super::{Fuzzer, RankingStrategy, resolve_function};
use crate::abi::{TypeRegistry, TypedValue};
use crate::config::SelectionConfig;
use crate::constants::MUTATION_CHANCE;
use crate::error::Result;
use crate::model::FunctionId;
use crate::services::Store;

/// Picks a tuple of a `DistanceCoverage` batch with rank-biased selection and
/// only occasionally mutates its parameters.
pub struct GeneticAlgorithmFuzzer {
    schedule: Arc<PowerSchedule>,
    store: Arc<dyn Store>,
    registry: Arc<dyn TypeRegistry>,
    selection: SelectionConfig,
}

impl GeneticAlgorithmFuzzer {
    pub fn new(
        schedule: Arc<PowerSchedule>,
        store: Arc<dyn Store>,
        registry: Arc<dyn TypeRegistry>,
        selection: SelectionConfig,
    ) -> Self {
        Self {
            schedule,
            store,
            registry,
            selection,
        }
    }
}

impl Fuzzer for GeneticAlgorithmFuzzer {
    fn generate_input(
        &self,
        function_id: FunctionId,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TypedValue>> {
        let target = resolve_function(self.store.as_ref(), function_id)?;
        let batch = self
            .schedule
            .seeds_for(&target, RankingStrategy::DistanceCoverage, rng)?;
        let Some(chosen) = selection(&batch, &self.selection, rng) else {
            return Ok(Vec::new());
        };

        target
            .inputs
            .iter()
            .zip(chosen)
            .map(|(param, value)| {
                let mut handler = self.registry.handler_for(&param.ty)?;
                handler.set_value(value.clone());
                mutation(handler.as_mut(), MUTATION_CHANCE, rng);
                Ok(handler.value())
            })
            .collect()
    }
}
