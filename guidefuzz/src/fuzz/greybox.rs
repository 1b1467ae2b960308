use std::sync::Arc;

use rand::RngCore;
use rand::seq::IndexedRandom;

use super::genetic::mutate;
use super::power_schedule::PowerSchedule;
use super::{Fuzzer, RankingStrategy, resolve_function};
use crate::abi::{TypeRegistry, TypedValue};
use crate::error::Result;
use crate::model::FunctionId;
use crate::services::Store;

/// Feedback-driven fuzzing: picks one tuple of a power schedule batch and
/// mutates every parameter.
///
/// The ranking strategy is what tells the variants apart: coverage for plain
/// greybox, distance to the critical instructions for directed greybox and
/// the configured combination of every signal for the other directed variant.
pub struct GreyboxFuzzer {
    strategy: RankingStrategy,
    schedule: Arc<PowerSchedule>,
    store: Arc<dyn Store>,
    registry: Arc<dyn TypeRegistry>,
}

impl GreyboxFuzzer {
    pub fn new(
        strategy: RankingStrategy,
        schedule: Arc<PowerSchedule>,
        store: Arc<dyn Store>,
        registry: Arc<dyn TypeRegistry>,
    ) -> Self {
        Self {
            strategy,
            schedule,
            store,
            registry,
        }
    }

    pub fn strategy(&self) -> RankingStrategy {
        self.strategy
    }
}

impl Fuzzer for GreyboxFuzzer {
    fn generate_input(
        &self,
        function_id: FunctionId,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TypedValue>> {
        let target = resolve_function(self.store.as_ref(), function_id)?;
        let batch = self.schedule.seeds_for(&target, self.strategy, rng)?;
        let Some(chosen) = batch.choose(rng) else {
            return Ok(Vec::new());
        };

        target
            .inputs
            .iter()
            .zip(chosen)
            .map(|(param, value)| {
                let mut handler = self.registry.handler_for(&param.ty)?;
                handler.set_value(value.clone());
                mutate(handler.as_mut(), rng);
                Ok(handler.value())
            })
            .collect()
    }
}
