//! Vulnerability oracles.
//!
//! The instrumented node reports what happened during a transaction as a list
//! of named events. They are folded into an [`EventsSnapshot`] and every
//! enabled [`Oracle`] decides whether the combination reveals a weakness.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// What a single transaction did, as far as the oracles are concerned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EventsSnapshot {
    pub ether_transfer: bool,
    pub send_op: bool,
    pub storage_changed: bool,
    pub repeated_call: bool,
    pub nested_call_failed: bool,
    pub root_call_failed: bool,
    pub out_of_gas: bool,
    pub timestamp: bool,
    pub block_number: bool,
    pub block_hash: bool,
    pub delegate_call: bool,
    pub delegate_input_controlled: bool,
}

impl EventsSnapshot {
    /// Builds a snapshot from event names such as `"BlockNumber"` or
    /// `"storage_changed"`. Unknown names are ignored.
    pub fn from_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = Self::default();
        for event in events {
            let normalized: String = event
                .as_ref()
                .chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            let flag = match normalized.as_str() {
                "ethertransfer" => &mut snapshot.ether_transfer,
                "sendop" | "send" => &mut snapshot.send_op,
                "storagechanged" => &mut snapshot.storage_changed,
                "repeatedcall" | "reentrancycall" => &mut snapshot.repeated_call,
                "nestedcallfailed" | "exceptioncall" => &mut snapshot.nested_call_failed,
                "rootcallfailed" => &mut snapshot.root_call_failed,
                "outofgas" | "gaslesssend" => &mut snapshot.out_of_gas,
                "timestamp" => &mut snapshot.timestamp,
                "blocknumber" | "number" => &mut snapshot.block_number,
                "blockhash" => &mut snapshot.block_hash,
                "delegatecall" => &mut snapshot.delegate_call,
                "delegateinputcontrolled" => &mut snapshot.delegate_input_controlled,
                _ => continue,
            };
            *flag = true;
        }
        snapshot
    }

    /// The transaction had an observable effect worth protecting.
    fn has_effect(&self) -> bool {
        self.storage_changed || self.ether_transfer || self.send_op
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
    Reentrancy,
    ExceptionDisorder,
    GaslessSend,
    TimestampDependency,
    NumberDependency,
    DangerousDelegateCall,
}

impl OracleKind {
    pub const ALL: [OracleKind; 6] = [
        OracleKind::Reentrancy,
        OracleKind::ExceptionDisorder,
        OracleKind::GaslessSend,
        OracleKind::TimestampDependency,
        OracleKind::NumberDependency,
        OracleKind::DangerousDelegateCall,
    ];

    pub fn oracle(self) -> Box<dyn Oracle> {
        match self {
            OracleKind::Reentrancy => Box::new(Reentrancy),
            OracleKind::ExceptionDisorder => Box::new(ExceptionDisorder),
            OracleKind::GaslessSend => Box::new(GaslessSend),
            OracleKind::TimestampDependency => Box::new(TimestampDependency),
            OracleKind::NumberDependency => Box::new(NumberDependency),
            OracleKind::DangerousDelegateCall => Box::new(DangerousDelegateCall),
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OracleKind::Reentrancy => "reentrancy",
            OracleKind::ExceptionDisorder => "exception_disorder",
            OracleKind::GaslessSend => "gasless_send",
            OracleKind::TimestampDependency => "timestamp_dependency",
            OracleKind::NumberDependency => "number_dependency",
            OracleKind::DangerousDelegateCall => "dangerous_delegate_call",
        };
        f.write_str(name)
    }
}

pub trait Oracle: Send + Sync {
    fn kind(&self) -> OracleKind;

    fn detect(&self, snapshot: &EventsSnapshot) -> bool;
}

pub struct Reentrancy;

impl Oracle for Reentrancy {
    fn kind(&self) -> OracleKind {
        OracleKind::Reentrancy
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        snapshot.repeated_call && snapshot.ether_transfer
    }
}

/// A nested call threw but the root call carried on as if nothing happened.
pub struct ExceptionDisorder;

impl Oracle for ExceptionDisorder {
    fn kind(&self) -> OracleKind {
        OracleKind::ExceptionDisorder
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        snapshot.nested_call_failed && !snapshot.root_call_failed
    }
}

pub struct GaslessSend;

impl Oracle for GaslessSend {
    fn kind(&self) -> OracleKind {
        OracleKind::GaslessSend
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        snapshot.send_op && snapshot.out_of_gas
    }
}

pub struct TimestampDependency;

impl Oracle for TimestampDependency {
    fn kind(&self) -> OracleKind {
        OracleKind::TimestampDependency
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        snapshot.timestamp && snapshot.has_effect()
    }
}

pub struct NumberDependency;

impl Oracle for NumberDependency {
    fn kind(&self) -> OracleKind {
        OracleKind::NumberDependency
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        (snapshot.block_number || snapshot.block_hash) && snapshot.has_effect()
    }
}

pub struct DangerousDelegateCall;

impl Oracle for DangerousDelegateCall {
    fn kind(&self) -> OracleKind {
        OracleKind::DangerousDelegateCall
    }

    fn detect(&self, snapshot: &EventsSnapshot) -> bool {
        snapshot.delegate_call && snapshot.delegate_input_controlled
    }
}

/// Names of the weaknesses the given oracles detect in `snapshot`.
pub fn detect_weaknesses(oracles: &[Box<dyn Oracle>], snapshot: &EventsSnapshot) -> BTreeSet<String> {
    oracles
        .iter()
        .filter(|oracle| oracle.detect(snapshot))
        .map(|oracle| oracle.kind().to_string())
        .collect()
}
