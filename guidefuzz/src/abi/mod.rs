//! Contract ABI definitions and the type-handler capability used to turn
//! serialized seeds into typed call arguments (and back).
//!
//! The engine never looks inside a typed value: it asks a [`TypeRegistry`] for
//! the [`TypeHandler`] of a parameter's ABI type and lets the handler
//! serialize, deserialize, generate and mutate it.

pub mod basic;
mod handler;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use basic::BasicTypeRegistry;
pub use handler::{Mutator, SeedCorpus, TypeHandler, TypeRegistry, TypedValue};

use crate::error::{FuzzError, Result};
use crate::model::{ContractId, Function, FunctionId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbiParam {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbiMethod {
    pub name: String,
    pub inputs: Vec<AbiParam>,
    pub payable: bool,
}

#[derive(Deserialize)]
struct AbiEntry {
    #[serde(rename = "type", default = "default_entry_kind")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default, rename = "stateMutability")]
    state_mutability: Option<String>,
    #[serde(default)]
    payable: Option<bool>,
}

fn default_entry_kind() -> String {
    "function".to_string()
}

impl AbiEntry {
    fn is_payable(&self) -> bool {
        self.payable.unwrap_or(false) || self.state_mutability.as_deref() == Some("payable")
    }
}

/// The callable surface of a contract: its constructor and its functions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AbiDefinition {
    constructor: Option<AbiMethod>,
    methods: BTreeMap<String, AbiMethod>,
}

impl AbiDefinition {
    /// Parses a Solidity JSON ABI. Events, errors, fallback and receive
    /// entries are skipped. Overloaded functions after the first get a numeric
    /// suffix (`transfer`, `transfer0`, `transfer1`, ...).
    pub fn parse(json: &str) -> Result<Self> {
        let entries: Vec<AbiEntry> =
            serde_json::from_str(json).map_err(|e| FuzzError::MalformedAbi(e.to_string()))?;

        let mut definition = Self::default();
        for entry in entries {
            let payable = entry.is_payable();
            match entry.kind.as_str() {
                "constructor" => {
                    definition.constructor = Some(AbiMethod {
                        name: String::new(),
                        inputs: entry.inputs,
                        payable,
                    });
                }
                "function" => {
                    if entry.name.is_empty() {
                        return Err(FuzzError::MalformedAbi(
                            "function entry without a name".to_string(),
                        ));
                    }
                    let mut name = entry.name.clone();
                    let mut overload = 0;
                    while definition.methods.contains_key(&name) {
                        name = format!("{}{overload}", entry.name);
                        overload += 1;
                    }
                    definition.methods.insert(
                        name.clone(),
                        AbiMethod {
                            name,
                            inputs: entry.inputs,
                            payable,
                        },
                    );
                }
                _ => {}
            }
        }
        Ok(definition)
    }

    pub fn constructor(&self) -> Option<&AbiMethod> {
        self.constructor.as_ref()
    }

    pub fn method(&self, name: &str) -> Result<&AbiMethod> {
        self.methods
            .get(name)
            .ok_or_else(|| FuzzError::MalformedAbi(format!("no method named {name}")))
    }

    pub fn methods(&self) -> impl Iterator<Item = &AbiMethod> {
        self.methods.values()
    }

    /// Function records for every method, plus the constructor. A contract
    /// without a declared constructor gets an implicit one without arguments.
    pub fn functions(&self, contract_id: ContractId) -> Vec<Function> {
        let constructor = Function {
            id: FunctionId::new(),
            contract_id,
            name: "constructor".to_string(),
            number_of_args: self.constructor.as_ref().map_or(0, |ctor| ctor.inputs.len()),
            payable: self.constructor.as_ref().is_some_and(|ctor| ctor.payable),
            is_constructor: true,
        };
        let methods = self.methods.values().map(|method| Function {
            id: FunctionId::new(),
            contract_id,
            name: method.name.clone(),
            number_of_args: method.inputs.len(),
            payable: method.payable,
            is_constructor: false,
        });
        std::iter::once(constructor).chain(methods).collect()
    }
}

/// Decodes one serialized seed into typed arguments for `inputs`.
///
/// The seed must carry exactly one field per parameter.
pub fn deserialize_values(
    registry: &dyn TypeRegistry,
    inputs: &[AbiParam],
    seed: &[String],
) -> Result<Vec<TypedValue>> {
    if seed.len() != inputs.len() {
        return Err(FuzzError::SeedListInvalid {
            expected: inputs.len(),
            found: seed.len(),
        });
    }
    inputs
        .iter()
        .zip(seed)
        .map(|(param, raw)| {
            let mut handler = registry.handler_for(&param.ty)?;
            handler.deserialize(raw)?;
            Ok(handler.value())
        })
        .collect()
}

/// Serializes typed arguments so they can be stored as a seed.
pub fn serialize_values(
    registry: &dyn TypeRegistry,
    inputs: &[AbiParam],
    values: &[TypedValue],
) -> Result<Vec<String>> {
    if values.len() != inputs.len() {
        return Err(FuzzError::SeedListInvalid {
            expected: inputs.len(),
            found: values.len(),
        });
    }
    inputs
        .iter()
        .zip(values)
        .map(|(param, value)| {
            let mut handler = registry.handler_for(&param.ty)?;
            handler.set_value(value.clone());
            Ok(handler.serialize())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const WALLET_ABI: &str = r#"[
        {"type": "constructor", "inputs": [{"name": "owner", "type": "address"}]},
        {"type": "function", "name": "deposit", "inputs": [], "stateMutability": "payable"},
        {"type": "function", "name": "withdraw", "inputs": [{"name": "amount", "type": "uint256"}], "stateMutability": "nonpayable"},
        {"type": "function", "name": "withdraw", "inputs": [{"name": "amount", "type": "uint256"}, {"name": "to", "type": "address"}]},
        {"type": "event", "name": "Deposit", "inputs": [{"name": "value", "type": "uint256"}]}
    ]"#;

    #[test]
    fn parses_methods_and_constructor() {
        let abi = AbiDefinition::parse(WALLET_ABI).unwrap();
        assert_eq!(abi.constructor().unwrap().inputs.len(), 1);
        assert!(abi.method("deposit").unwrap().payable);
        assert!(!abi.method("withdraw").unwrap().payable);
        assert_eq!(abi.method("withdraw0").unwrap().inputs.len(), 2);
        assert_matches!(abi.method("Deposit"), Err(FuzzError::MalformedAbi(_)));
    }

    #[test]
    fn builds_function_records() {
        let contract_id = ContractId::new();
        let functions = AbiDefinition::parse(WALLET_ABI)
            .unwrap()
            .functions(contract_id);
        assert_eq!(functions.len(), 4);
        assert_eq!(functions.iter().filter(|f| f.is_constructor).count(), 1);
        assert!(functions.iter().all(|f| f.contract_id == contract_id));
    }

    #[test]
    fn implicit_constructor_has_no_arguments() {
        let abi = AbiDefinition::parse(r#"[{"type": "function", "name": "ping", "inputs": []}]"#)
            .unwrap();
        let functions = abi.functions(ContractId::new());
        let constructor = functions.iter().find(|f| f.is_constructor).unwrap();
        assert_eq!(constructor.number_of_args, 0);
        assert!(abi.constructor().is_none());
    }

    #[test]
    fn rejects_invalid_json() {
        assert_matches!(AbiDefinition::parse("{not json"), Err(FuzzError::MalformedAbi(_)));
    }

    #[test]
    fn seed_arity_must_match_parameters() {
        let registry = BasicTypeRegistry::default();
        let abi = AbiDefinition::parse(WALLET_ABI).unwrap();
        let inputs = &abi.method("withdraw0").unwrap().inputs;

        let result = deserialize_values(&registry, inputs, &["1".to_string()]);
        assert_matches!(
            result,
            Err(FuzzError::SeedListInvalid {
                expected: 2,
                found: 1
            })
        );

        let values = deserialize_values(
            &registry,
            inputs,
            &[
                "42".to_string(),
                "0x00000000000000000000000000000000000000aa".to_string(),
            ],
        )
        .unwrap();
        let serialized = serialize_values(&registry, inputs, &values).unwrap();
        assert_eq!(serialized[0], "42");
    }
}
