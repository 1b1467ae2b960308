use std::collections::BTreeMap;

use rand::RngCore;
use rand::seq::IndexedRandom;

use crate::error::{FuzzError, Result};

/// A typed call argument. Handlers decide what the JSON value looks like for
/// their ABI type; the engine treats it as opaque.
pub type TypedValue = serde_json::Value;

/// Pre-configured seed values, keyed by ABI type (`"uint256"`, `"address"`, ...).
pub type SeedCorpus = BTreeMap<String, Vec<String>>;

/// A mutation owned by a type handler: takes the current value and returns a
/// mutated one of the same type.
pub type Mutator = Box<dyn Fn(&TypedValue, &mut dyn RngCore) -> TypedValue + Send + Sync>;

/// Serialization, generation and mutation of values of one ABI type.
///
/// A handler holds one current value, the way the pipeline threads a single
/// argument through deserialize -> mutate -> serialize.
pub trait TypeHandler: Send {
    fn abi_type(&self) -> &str;

    fn value(&self) -> TypedValue;

    fn set_value(&mut self, value: TypedValue);

    fn serialize(&self) -> String;

    fn deserialize(&mut self, raw: &str) -> Result<()>;

    /// Replaces the current value with a freshly generated one.
    fn generate(&mut self, rng: &mut dyn RngCore);

    fn mutators(&self) -> Vec<Mutator>;

    /// Replaces the current value with one picked at random among the
    /// pre-configured seeds of this handler's type.
    fn load_seed(&mut self, corpus: &SeedCorpus, rng: &mut dyn RngCore) -> Result<()> {
        let raw = corpus
            .get(self.abi_type())
            .and_then(|seeds| seeds.choose(rng))
            .ok_or_else(|| FuzzError::MissingSeeds(self.abi_type().to_string()))?
            .clone();
        self.deserialize(&raw)
    }
}

/// Hands out a fresh handler for an ABI type.
pub trait TypeRegistry: Send + Sync {
    fn handler_for(&self, abi_type: &str) -> Result<Box<dyn TypeHandler>>;
}
