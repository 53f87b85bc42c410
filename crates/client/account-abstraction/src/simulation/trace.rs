//! Tracer output consumed by the rule checker
//!
//! The bundler runs `simulateValidation` under a collector tracer which splits
//! the execution into one level per top-level call from the EntryPoint into an
//! entity, and records a flat list of call entry/exit events plus every keccak
//! preimage. These types mirror that JSON output.

use alloy_primitives::{Address, Bytes, Selector, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Full output of the bundler collector tracer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlerTracerResult {
    /// One level per call from the EntryPoint into factory, account or paymaster
    pub calls_from_entry_point: Vec<TopLevelCallInfo>,

    /// Every preimage passed to keccak256 during the simulated call
    #[serde(default)]
    pub keccak: Vec<Bytes>,
}

impl BundlerTracerResult {
    /// Parse the tracer's JSON output
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The level recorded for the given top-level selector
    pub fn level(&self, selector: Selector) -> Option<&TopLevelCallInfo> {
        self.calls_from_entry_point.iter().find(|level| level.top_level_method_sig == selector)
    }

    /// Call events of all levels, in trace order
    pub fn call_events(&self) -> impl Iterator<Item = &CallEvent> {
        self.calls_from_entry_point.iter().flat_map(|level| level.calls.iter())
    }
}

/// Everything recorded while the EntryPoint was inside one entity's top-level call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopLevelCallInfo {
    /// Selector of the top-level call, tags which entity this level belongs to
    pub top_level_method_sig: Selector,

    /// Target of the top-level call
    #[serde(default)]
    pub top_level_target_address: Address,

    /// Opcode name to number of executions
    #[serde(default)]
    pub opcodes: BTreeMap<String, u64>,

    /// Storage accessed, per contract
    #[serde(default)]
    pub access: BTreeMap<Address, StorageAccess>,

    /// Code size of every address called or inspected
    #[serde(default)]
    pub contract_size: BTreeMap<Address, u64>,

    /// Whether the level ran out of gas
    #[serde(default)]
    pub oog: bool,

    /// Call entry and exit events, in execution order
    #[serde(default)]
    pub calls: Vec<CallEvent>,
}

impl TopLevelCallInfo {
    /// Number of times an opcode executed in this level
    pub fn opcode_count(&self, opcode: &str) -> u64 {
        self.opcodes.get(opcode).copied().unwrap_or(0)
    }
}

/// Storage reads and writes of a single contract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccess {
    /// Slot to the value first read from it
    #[serde(default)]
    pub reads: BTreeMap<B256, B256>,

    /// Slot to the number of writes
    #[serde(default)]
    pub writes: BTreeMap<B256, u64>,
}

/// Kind of a call event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallEventKind {
    /// CALL
    #[serde(rename = "CALL")]
    Call,
    /// CALLCODE
    #[serde(rename = "CALLCODE")]
    CallCode,
    /// DELEGATECALL
    #[serde(rename = "DELEGATECALL")]
    DelegateCall,
    /// STATICCALL
    #[serde(rename = "STATICCALL")]
    StaticCall,
    /// CREATE
    #[serde(rename = "CREATE")]
    Create,
    /// CREATE2
    #[serde(rename = "CREATE2")]
    Create2,
    /// Frame exit via RETURN or STOP
    #[serde(rename = "RETURN")]
    Return,
    /// Frame exit via REVERT
    #[serde(rename = "REVERT")]
    Revert,
    /// Depth bookkeeping emitted by the tracer, carries no call
    #[serde(rename = "depth")]
    Depth,
}

impl CallEventKind {
    /// Whether the event opens a frame
    pub const fn is_entry(&self) -> bool {
        matches!(
            self,
            Self::Call
                | Self::CallCode
                | Self::DelegateCall
                | Self::StaticCall
                | Self::Create
                | Self::Create2
        )
    }

    /// Whether the event closes a frame
    pub const fn is_exit(&self) -> bool {
        matches!(self, Self::Return | Self::Revert)
    }

    /// Whether the event opens a contract creation frame
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// A single call entry or exit marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    /// Opcode that opened the frame, or the exit marker
    #[serde(rename = "type")]
    pub kind: CallEventKind,

    /// Caller, on entries
    #[serde(default)]
    pub from: Address,

    /// Callee, on entries
    #[serde(default)]
    pub to: Address,

    /// Value transferred, on entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,

    /// Call input on entries, returned or reverted payload on exits
    #[serde(default)]
    pub data: Bytes,

    /// Gas passed to the frame, on entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,

    /// Gas consumed by the frame, on exits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<u64>,
}

impl CallEvent {
    /// Create a call entry event
    pub fn enter(kind: CallEventKind, from: Address, to: Address, data: Bytes) -> Self {
        Self { kind, from, to, value: None, data, gas: None, gas_used: None }
    }

    /// Create a frame exit event
    pub fn exit(kind: CallEventKind, data: Bytes) -> Self {
        Self {
            kind,
            from: Address::ZERO,
            to: Address::ZERO,
            value: None,
            data,
            gas: None,
            gas_used: None,
        }
    }

    /// Set the value transferred by an entry event
    pub fn with_value(mut self, value: U256) -> Self {
        self.value = Some(value);
        self
    }

    /// First four bytes of the call input, `None` when shorter
    pub fn selector(&self) -> Option<Selector> {
        self.data.get(..4).map(Selector::from_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256, hex};

    #[test]
    fn test_parse_tracer_json() {
        let json = r#"{
            "callsFromEntryPoint": [{
                "topLevelMethodSig": "0x3a871cdd",
                "topLevelTargetAddress": "0x1111111111111111111111111111111111111111",
                "opcodes": { "CALL": 2, "SLOAD": 1 },
                "access": {
                    "0x2222222222222222222222222222222222222222": {
                        "reads": {
                            "0x0000000000000000000000000000000000000000000000000000000000000001":
                            "0x0000000000000000000000000000000000000000000000000000000000000005"
                        },
                        "writes": {}
                    }
                },
                "contractSize": { "0x2222222222222222222222222222222222222222": 1200 },
                "oog": false,
                "calls": [
                    { "type": "depth", "from": "0x0000000000000000000000000000000000000000" },
                    {
                        "type": "CALL",
                        "from": "0x1111111111111111111111111111111111111111",
                        "to": "0x2222222222222222222222222222222222222222",
                        "value": "0x0",
                        "data": "0x70a08231",
                        "gas": 50000
                    },
                    { "type": "RETURN", "data": "0x", "gasUsed": 100 }
                ]
            }],
            "keccak": ["0xdeadbeef"]
        }"#;

        let result = BundlerTracerResult::from_json(json).unwrap();
        assert_eq!(result.calls_from_entry_point.len(), 1);
        assert_eq!(result.keccak, vec![Bytes::from(hex!("deadbeef"))]);

        let level = result.level(Selector::from(hex!("3a871cdd"))).unwrap();
        assert_eq!(level.opcode_count("CALL"), 2);
        assert_eq!(level.opcode_count("TIMESTAMP"), 0);

        let target = address!("2222222222222222222222222222222222222222");
        assert_eq!(level.contract_size[&target], 1200);
        let slot = b256!("0000000000000000000000000000000000000000000000000000000000000001");
        assert!(level.access[&target].reads.contains_key(&slot));

        let kinds: Vec<_> = result.call_events().map(|event| event.kind).collect();
        assert_eq!(
            kinds,
            vec![CallEventKind::Depth, CallEventKind::Call, CallEventKind::Return]
        );
        assert_eq!(level.calls[1].selector(), Some(Selector::from(hex!("70a08231"))));
        assert_eq!(level.calls[2].gas_used, Some(100));
    }

    #[test]
    fn test_missing_level() {
        let result = BundlerTracerResult::default();
        assert!(result.level(Selector::from(hex!("570e1a36"))).is_none());
        assert_eq!(result.call_events().count(), 0);
    }

    #[test]
    fn test_event_kind_classes() {
        assert!(CallEventKind::Call.is_entry());
        assert!(CallEventKind::Create2.is_entry());
        assert!(CallEventKind::Create2.is_create());
        assert!(!CallEventKind::StaticCall.is_create());
        assert!(CallEventKind::Revert.is_exit());
        assert!(!CallEventKind::Depth.is_entry());
        assert!(!CallEventKind::Depth.is_exit());
    }

    #[test]
    fn test_selector_of_short_input() {
        let event = CallEvent::enter(
            CallEventKind::Call,
            Address::ZERO,
            Address::ZERO,
            Bytes::from(hex!("0102")),
        );
        assert_eq!(event.selector(), None);
    }
}
