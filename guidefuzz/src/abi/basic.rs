//! Reference type handlers for the elementary Solidity types.
//!
//! Numeric values (`uintN`, `intN`) and addresses are mutated as fixed-width
//! words: bit flips dominate, followed by byte flips, arithmetic and boundary
//! values, with an occasional complete replacement. Text and byte strings get
//! append / truncate / empty / byte-bump mutations.
//!
//! Typed values are JSON: decimal strings for integers, `0x`-prefixed hex for
//! addresses and byte strings, booleans and plain strings otherwise.

use num_bigint::{BigInt, BigUint, Sign};
use num_traits::{One, Zero};
use rand::{Rng, RngCore};

use super::handler::{Mutator, TypeHandler, TypeRegistry, TypedValue};
use crate::error::{FuzzError, Result};

const ADDRESS_BYTES: usize = 20;
const MAX_GENERATED_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Uint(u32),
    Int(u32),
    Address,
    Bool,
    String,
    /// `bytes` when `None`, `bytesN` otherwise.
    Bytes(Option<usize>),
}

impl Kind {
    fn parse(ty: &str) -> Option<Self> {
        match ty {
            "bool" => Some(Kind::Bool),
            "address" | "address payable" => Some(Kind::Address),
            "string" => Some(Kind::String),
            "bytes" => Some(Kind::Bytes(None)),
            _ => {
                if let Some(bits) = ty.strip_prefix("uint") {
                    parse_bits(bits).map(Kind::Uint)
                } else if let Some(bits) = ty.strip_prefix("int") {
                    parse_bits(bits).map(Kind::Int)
                } else if let Some(len) = ty.strip_prefix("bytes") {
                    let len: usize = len.parse().ok()?;
                    (1..=32).contains(&len).then_some(Kind::Bytes(Some(len)))
                } else {
                    None
                }
            }
        }
    }

    /// Width of the kinds handled as machine words.
    fn word_bits(self) -> Option<u32> {
        match self {
            Kind::Uint(bits) | Kind::Int(bits) => Some(bits),
            Kind::Address => Some(ADDRESS_BYTES as u32 * 8),
            _ => None,
        }
    }

    fn zero(self) -> TypedValue {
        match self {
            Kind::Bool => TypedValue::Bool(false),
            Kind::String => TypedValue::String(String::new()),
            Kind::Bytes(len) => TypedValue::String(encode_bytes(&vec![0; len.unwrap_or(0)])),
            Kind::Uint(_) | Kind::Int(_) | Kind::Address => from_word(self, &BigUint::zero()),
        }
    }
}

fn parse_bits(bits: &str) -> Option<u32> {
    if bits.is_empty() {
        return Some(256);
    }
    let bits: u32 = bits.parse().ok()?;
    (bits % 8 == 0 && (8..=256).contains(&bits)).then_some(bits)
}

fn modulus(bits: u32) -> BigUint {
    BigUint::one() << bits
}

fn encode_bytes(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn decode_bytes(raw: &str) -> Option<Vec<u8>> {
    let raw = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(raw).ok()
}

/// Two's complement word of a typed value.
fn to_word(kind: Kind, value: &TypedValue) -> Option<BigUint> {
    let raw = value.as_str()?;
    match kind {
        Kind::Uint(_) => match raw.strip_prefix("0x") {
            Some(hex) => BigUint::parse_bytes(hex.as_bytes(), 16),
            None => raw.parse().ok(),
        },
        Kind::Int(bits) => {
            let value: BigInt = raw.parse().ok()?;
            let modulus = BigInt::from(modulus(bits));
            (((value % &modulus) + &modulus) % &modulus).to_biguint()
        }
        Kind::Address => Some(BigUint::from_bytes_be(&decode_bytes(raw)?)),
        _ => None,
    }
}

fn from_word(kind: Kind, word: &BigUint) -> TypedValue {
    match kind {
        Kind::Int(bits) => {
            let half = BigUint::one() << (bits - 1);
            let value = if word >= &half {
                BigInt::from(word.clone()) - BigInt::from(modulus(bits))
            } else {
                BigInt::from(word.clone())
            };
            TypedValue::String(value.to_string())
        }
        Kind::Address => {
            let bytes = word.to_bytes_be();
            let mut padded = vec![0u8; ADDRESS_BYTES.saturating_sub(bytes.len())];
            padded.extend_from_slice(&bytes[bytes.len().saturating_sub(ADDRESS_BYTES)..]);
            TypedValue::String(encode_bytes(&padded))
        }
        _ => TypedValue::String(word.to_string()),
    }
}

fn random_word(bits: u32, rng: &mut dyn RngCore) -> BigUint {
    let len = rng.random_range(0..=bits as usize / 8);
    let mut bytes = vec![0u8; len];
    rng.fill_bytes(&mut bytes);
    BigUint::from_bytes_be(&bytes)
}

fn random_text(rng: &mut dyn RngCore) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let len = rng.random_range(0..=MAX_GENERATED_LEN);
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

type WordOp = fn(&BigUint, Kind, u32, &mut dyn RngCore) -> BigUint;

fn word_mutator(kind: Kind, bits: u32, op: WordOp) -> Mutator {
    Box::new(move |value, rng| {
        let word = to_word(kind, value).unwrap_or_default();
        from_word(kind, &(op(&word, kind, bits, rng) % modulus(bits)))
    })
}

fn flip_bit(word: &BigUint, _: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    word ^ (BigUint::one() << rng.random_range(0..bits))
}

fn flip_two_bits(word: &BigUint, _: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    let first = BigUint::one() << rng.random_range(0..bits);
    let second = BigUint::one() << rng.random_range(0..bits);
    word ^ (first | second)
}

fn flip_byte(word: &BigUint, _: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    let shift = rng.random_range(0..bits / 8) * 8;
    word ^ (BigUint::from(0xFFu8) << shift)
}

fn add_or_sub_one(word: &BigUint, _: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    if rng.random_bool(0.5) {
        word + 1u32
    } else {
        word + modulus(bits) - 1u32
    }
}

fn boundary(_: &BigUint, kind: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    let max = modulus(bits) - 1u32;
    match kind {
        Kind::Int(bits) => {
            let min = BigUint::one() << (bits - 1);
            match rng.random_range(0..4) {
                0 => BigUint::zero(),
                1 => max,
                2 => min.clone() - 1u32,
                _ => min,
            }
        }
        _ => match rng.random_range(0..3) {
            0 => BigUint::zero(),
            1 => BigUint::one(),
            _ => max,
        },
    }
}

fn havoc(_: &BigUint, _: Kind, bits: u32, rng: &mut dyn RngCore) -> BigUint {
    random_word(bits, rng)
}

fn text_mutators() -> Vec<Mutator> {
    vec![
        Box::new(|value, _| TypedValue::String(format!("{}FUZZ", value.as_str().unwrap_or_default()))),
        Box::new(|value, _| {
            let mut text = value.as_str().unwrap_or_default().to_string();
            text.pop();
            TypedValue::String(text)
        }),
        Box::new(|_, _| TypedValue::String(String::new())),
        Box::new(|value, rng| {
            let mut chars: Vec<char> = value.as_str().unwrap_or_default().chars().collect();
            if !chars.is_empty() {
                let idx = rng.random_range(0..chars.len());
                chars[idx] = char::from_u32(chars[idx] as u32 + 1).unwrap_or(chars[idx]);
            }
            TypedValue::String(chars.into_iter().collect())
        }),
    ]
}

fn bytes_mutators(fixed_len: Option<usize>) -> Vec<Mutator> {
    let bytes_of = |value: &TypedValue| {
        value
            .as_str()
            .and_then(decode_bytes)
            .unwrap_or_default()
    };
    let mut mutators: Vec<Mutator> = vec![
        Box::new(move |value, rng| {
            let mut bytes = bytes_of(value);
            if !bytes.is_empty() {
                let idx = rng.random_range(0..bytes.len());
                bytes[idx] ^= 1 << rng.random_range(0..8);
            }
            TypedValue::String(encode_bytes(&bytes))
        }),
        Box::new(move |value, _| {
            let bytes: Vec<u8> = bytes_of(value).iter().map(|b| !b).collect();
            TypedValue::String(encode_bytes(&bytes))
        }),
    ];
    if fixed_len.is_none() {
        mutators.push(Box::new(move |value, rng| {
            let mut bytes = bytes_of(value);
            bytes.push(rng.random());
            TypedValue::String(encode_bytes(&bytes))
        }));
        mutators.push(Box::new(move |value, _| {
            let mut bytes = bytes_of(value);
            bytes.pop();
            TypedValue::String(encode_bytes(&bytes))
        }));
    }
    mutators
}

/// Handler for one elementary Solidity type.
pub struct BasicTypeHandler {
    abi_type: String,
    kind: Kind,
    value: TypedValue,
}

impl BasicTypeHandler {
    fn invalid(&self, raw: &str) -> FuzzError {
        FuzzError::InvalidValue {
            ty: self.abi_type.clone(),
            value: raw.to_string(),
        }
    }
}

impl TypeHandler for BasicTypeHandler {
    fn abi_type(&self) -> &str {
        &self.abi_type
    }

    fn value(&self) -> TypedValue {
        self.value.clone()
    }

    fn set_value(&mut self, value: TypedValue) {
        self.value = value;
    }

    fn serialize(&self) -> String {
        match &self.value {
            TypedValue::String(raw) => raw.clone(),
            other => other.to_string(),
        }
    }

    fn deserialize(&mut self, raw: &str) -> Result<()> {
        // Whitespace is part of a string value.
        let raw = match self.kind {
            Kind::String => raw,
            _ => raw.trim(),
        };
        self.value = match self.kind {
            Kind::Bool => match raw {
                "true" | "1" => TypedValue::Bool(true),
                "false" | "0" => TypedValue::Bool(false),
                _ => return Err(self.invalid(raw)),
            },
            Kind::String => TypedValue::String(raw.to_string()),
            Kind::Bytes(fixed_len) => {
                let bytes = decode_bytes(raw).ok_or_else(|| self.invalid(raw))?;
                if fixed_len.is_some_and(|len| len != bytes.len()) {
                    return Err(self.invalid(raw));
                }
                TypedValue::String(encode_bytes(&bytes))
            }
            Kind::Address => {
                let bytes = decode_bytes(raw).ok_or_else(|| self.invalid(raw))?;
                if bytes.len() != ADDRESS_BYTES {
                    return Err(self.invalid(raw));
                }
                TypedValue::String(encode_bytes(&bytes))
            }
            Kind::Uint(bits) => {
                let word = to_word(self.kind, &TypedValue::String(raw.to_string()))
                    .filter(|word| word < &modulus(bits))
                    .ok_or_else(|| self.invalid(raw))?;
                from_word(self.kind, &word)
            }
            Kind::Int(bits) => {
                let value: BigInt = raw.parse().map_err(|_| self.invalid(raw))?;
                let half = BigInt::from(BigUint::one() << (bits - 1));
                let in_range = match value.sign() {
                    Sign::Minus => -value.clone() <= half,
                    _ => value < half,
                };
                if !in_range {
                    return Err(self.invalid(raw));
                }
                TypedValue::String(value.to_string())
            }
        };
        Ok(())
    }

    fn generate(&mut self, rng: &mut dyn RngCore) {
        self.value = match self.kind {
            Kind::Bool => TypedValue::Bool(rng.random_bool(0.5)),
            Kind::String => TypedValue::String(random_text(rng)),
            Kind::Bytes(fixed_len) => {
                let len = fixed_len.unwrap_or_else(|| rng.random_range(0..=MAX_GENERATED_LEN));
                let mut bytes = vec![0u8; len];
                rng.fill_bytes(&mut bytes);
                TypedValue::String(encode_bytes(&bytes))
            }
            kind => {
                let bits = kind.word_bits().unwrap_or(256);
                from_word(kind, &random_word(bits, rng))
            }
        };
    }

    fn mutators(&self) -> Vec<Mutator> {
        match self.kind {
            Kind::Bool => vec![Box::new(|value, _| {
                TypedValue::Bool(!value.as_bool().unwrap_or_default())
            })],
            Kind::String => text_mutators(),
            Kind::Bytes(fixed_len) => bytes_mutators(fixed_len),
            kind => {
                let bits = kind.word_bits().unwrap_or(256);
                // Weighted towards bit-level changes.
                let ops: [WordOp; 8] = [
                    flip_bit,
                    flip_bit,
                    flip_bit,
                    flip_two_bits,
                    flip_byte,
                    add_or_sub_one,
                    boundary,
                    havoc,
                ];
                ops.into_iter()
                    .map(|op| word_mutator(kind, bits, op))
                    .collect()
            }
        }
    }
}

/// Registry of [`BasicTypeHandler`]s. Array, tuple and function types are
/// not supported.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicTypeRegistry;

impl TypeRegistry for BasicTypeRegistry {
    fn handler_for(&self, abi_type: &str) -> Result<Box<dyn TypeHandler>> {
        let kind =
            Kind::parse(abi_type).ok_or_else(|| FuzzError::UnsupportedType(abi_type.to_string()))?;
        Ok(Box::new(BasicTypeHandler {
            abi_type: abi_type.to_string(),
            kind,
            value: kind.zero(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::abi::SeedCorpus;

    impl std::fmt::Debug for dyn TypeHandler + '_ {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("TypeHandler").field("abi_type", &self.abi_type()).finish()
        }
    }

    fn handler(ty: &str) -> Box<dyn TypeHandler> {
        BasicTypeRegistry.handler_for(ty).unwrap()
    }

    #[test]
    fn rejects_unsupported_types() {
        assert_matches!(
            BasicTypeRegistry.handler_for("uint256[]"),
            Err(FuzzError::UnsupportedType(_))
        );
        assert_matches!(
            BasicTypeRegistry.handler_for("uint7"),
            Err(FuzzError::UnsupportedType(_))
        );
    }

    #[test]
    fn integer_ranges_are_enforced() {
        let mut uint8 = handler("uint8");
        assert!(uint8.deserialize("255").is_ok());
        assert_matches!(uint8.deserialize("256"), Err(FuzzError::InvalidValue { .. }));

        let mut int8 = handler("int8");
        assert!(int8.deserialize("-128").is_ok());
        assert!(int8.deserialize("127").is_ok());
        assert_matches!(int8.deserialize("128"), Err(FuzzError::InvalidValue { .. }));
        assert_matches!(int8.deserialize("-129"), Err(FuzzError::InvalidValue { .. }));
    }

    #[test]
    fn word_mutations_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for ty in ["uint8", "int16", "uint256", "address"] {
            let mut handler = handler(ty);
            handler.generate(&mut rng);
            for _ in 0..200 {
                for mutator in handler.mutators() {
                    let mutated = mutator(&handler.value(), &mut rng);
                    handler.set_value(mutated);
                    let serialized = handler.serialize();
                    assert!(
                        handler.deserialize(&serialized).is_ok(),
                        "{ty} produced {serialized}"
                    );
                }
            }
        }
    }

    #[test]
    fn signed_words_wrap_around() {
        let mut int8 = handler("int8");
        int8.deserialize("-1").unwrap();
        assert_eq!(to_word(Kind::Int(8), &int8.value()), Some(BigUint::from(255u32)));
        assert_eq!(from_word(Kind::Int(8), &BigUint::from(128u32)), TypedValue::from("-128"));
    }

    #[test]
    fn addresses_are_normalized() {
        let mut address = handler("address");
        address
            .deserialize("0x00000000000000000000000000000000000000AB")
            .unwrap();
        assert_eq!(
            address.serialize(),
            "0x00000000000000000000000000000000000000ab"
        );
        assert_matches!(address.deserialize("0x1234"), Err(FuzzError::InvalidValue { .. }));
    }

    #[test]
    fn strings_keep_their_whitespace() {
        let mut text = handler("string");
        text.deserialize("  padded  ").unwrap();
        assert_eq!(text.value(), TypedValue::String("  padded  ".to_string()));
        assert_eq!(text.serialize(), "  padded  ");

        let mut amount = handler("uint256");
        amount.deserialize(" 42 ").unwrap();
        assert_eq!(amount.serialize(), "42");
    }

    #[test]
    fn fixed_bytes_keep_their_length() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut bytes4 = handler("bytes4");
        bytes4.generate(&mut rng);
        for mutator in bytes4.mutators() {
            let mutated = mutator(&bytes4.value(), &mut rng);
            bytes4.set_value(mutated);
        }
        let serialized = bytes4.serialize();
        assert_eq!(serialized.len(), 2 + 8);
        assert!(bytes4.deserialize(&serialized).is_ok());
    }

    #[test]
    fn loads_values_from_the_seed_corpus() {
        let mut rng = StdRng::seed_from_u64(1);
        let corpus = SeedCorpus::from([("bool".to_string(), vec!["true".to_string()])]);

        let mut flag = handler("bool");
        flag.load_seed(&corpus, &mut rng).unwrap();
        assert_eq!(flag.value(), TypedValue::Bool(true));

        let mut text = handler("string");
        assert_matches!(
            text.load_seed(&corpus, &mut rng),
            Err(FuzzError::MissingSeeds(ty)) if ty == "string"
        );
    }
}
