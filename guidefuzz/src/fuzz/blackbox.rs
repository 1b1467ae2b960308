use std::sync::Arc;

use rand::RngCore;

use super::genetic::mutate;
use super::{Fuzzer, resolve_function};
use crate::abi::{SeedCorpus, TypeRegistry, TypedValue};
use crate::error::Result;
use crate::model::FunctionId;
use crate::services::Store;

/// Ignores feedback: a corpus value per parameter, mutated once.
pub struct BlackboxFuzzer {
    store: Arc<dyn Store>,
    registry: Arc<dyn TypeRegistry>,
    seeds: Arc<SeedCorpus>,
}

impl BlackboxFuzzer {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<dyn TypeRegistry>,
        seeds: Arc<SeedCorpus>,
    ) -> Self {
        Self {
            store,
            registry,
            seeds,
        }
    }
}

impl Fuzzer for BlackboxFuzzer {
    fn generate_input(
        &self,
        function_id: FunctionId,
        rng: &mut dyn RngCore,
    ) -> Result<Vec<TypedValue>> {
        let target = resolve_function(self.store.as_ref(), function_id)?;
        target
            .inputs
            .iter()
            .map(|param| {
                let mut handler = self.registry.handler_for(&param.ty)?;
                handler.load_seed(&self.seeds, rng)?;
                mutate(handler.as_mut(), rng);
                Ok(handler.value())
            })
            .collect()
    }
}
