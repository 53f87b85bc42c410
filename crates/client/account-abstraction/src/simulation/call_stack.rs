//! Call stack reconstruction
//!
//! The tracer records calls as a flat sequence of entry and exit markers. This
//! module folds them back into resolved calls with an explicit stack of open
//! frames: entries push, exits pop and resolve. Calls therefore come out in
//! exit order, nested calls before their caller, with the return from the
//! validation call itself last.

use alloy_primitives::{Address, Bytes, U256};
use tracing::{debug, warn};

use crate::decoding::{DecodedPayload, SelectorRegistry};

use super::trace::{BundlerTracerResult, CallEvent, CallEventKind};

/// Method name given to the implicit frame of the validation call itself
pub const TOP_LEVEL_METHOD: &str = "validateUserOp";

/// How a resolved frame was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// CALL
    Call,
    /// CALLCODE
    CallCode,
    /// DELEGATECALL
    DelegateCall,
    /// STATICCALL
    StaticCall,
    /// CREATE
    Create,
    /// CREATE2
    Create2,
    /// The validation call itself, which has no entry marker in the trace
    TopLevel,
}

impl CallKind {
    /// Kind of the frame an entry event opens
    pub const fn from_entry(kind: CallEventKind) -> Option<Self> {
        match kind {
            CallEventKind::Call => Some(Self::Call),
            CallEventKind::CallCode => Some(Self::CallCode),
            CallEventKind::DelegateCall => Some(Self::DelegateCall),
            CallEventKind::StaticCall => Some(Self::StaticCall),
            CallEventKind::Create => Some(Self::Create),
            CallEventKind::Create2 => Some(Self::Create2),
            CallEventKind::Return | CallEventKind::Revert | CallEventKind::Depth => None,
        }
    }

    /// Whether the frame deploys a contract
    pub const fn is_create(&self) -> bool {
        matches!(self, Self::Create | Self::Create2)
    }
}

/// A call matched with its exit and decoded where possible
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    /// Callee
    pub to: Address,
    /// Caller
    pub from: Address,
    /// How the frame was entered
    pub kind: CallKind,
    /// Function name, or the raw selector when unknown (`0x` for empty input)
    pub method: String,
    /// Set when the frame exited with RETURN
    pub return_value: Option<DecodedPayload>,
    /// Set when the frame exited with REVERT
    pub revert_value: Option<DecodedPayload>,
    /// Value transferred into the frame
    pub value: U256,
}

impl ResolvedCall {
    /// Whether the frame reverted
    pub const fn reverted(&self) -> bool {
        self.revert_value.is_some()
    }
}

/// Output of call stack reconstruction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallStack {
    /// Resolved calls in exit order
    pub calls: Vec<ResolvedCall>,
    /// Frames still open after the last event, zero for a well-formed trace
    pub unmatched: usize,
}

impl CallStack {
    /// Whether every entry was matched by an exit
    pub const fn is_balanced(&self) -> bool {
        self.unmatched == 0
    }
}

/// Reconstruct the calls of every level of a trace
pub fn resolved_calls(trace: &BundlerTracerResult, registry: &SelectorRegistry) -> CallStack {
    reconstruct_call_stack(trace.call_events(), registry)
}

/// Fold a flat event sequence into resolved calls
pub fn reconstruct_call_stack<'a>(
    events: impl IntoIterator<Item = &'a CallEvent>,
    registry: &SelectorRegistry,
) -> CallStack {
    let mut open: Vec<(CallKind, &CallEvent)> = Vec::new();
    let mut calls = Vec::new();

    for event in events {
        if event.kind.is_exit() {
            let call = match open.pop() {
                Some((kind, entry)) => resolve_frame(kind, entry, event, registry),
                None => resolve_top_level(event, registry),
            };
            calls.push(call);
        } else if let Some(kind) = CallKind::from_entry(event.kind) {
            open.push((kind, event));
        }
    }

    if !open.is_empty() {
        warn!(
            target: "aa-validation",
            unmatched = open.len(),
            resolved = calls.len(),
            "Call trace ended with open frames"
        );
    }

    debug!(target: "aa-validation", resolved = calls.len(), "Reconstructed call stack");

    CallStack { calls, unmatched: open.len() }
}

fn resolve_frame(
    kind: CallKind,
    entry: &CallEvent,
    exit: &CallEvent,
    registry: &SelectorRegistry,
) -> ResolvedCall {
    let reverted = exit.kind == CallEventKind::Revert;
    let value = entry.value.unwrap_or_default();

    // Creation frames return deployed bytecode, not ABI data
    if kind.is_create() {
        let receipt = DecodedPayload::CreationReceipt { len: exit.data.len() };
        let (return_value, revert_value) =
            if reverted { (None, Some(receipt)) } else { (Some(receipt), None) };
        return ResolvedCall {
            to: entry.to,
            from: entry.from,
            kind,
            method: String::new(),
            return_value,
            revert_value,
            value,
        };
    }

    let function = entry.selector().and_then(|selector| registry.function_by_selector(selector));
    let method = match function {
        Some(function) => function.name.clone(),
        None => raw_method(&entry.data),
    };

    let (return_value, revert_value) = if reverted {
        (None, Some(registry.decode_revert(&exit.data)))
    } else {
        let decoded = match function {
            Some(function) => registry.decode_return(function, &exit.data),
            None => DecodedPayload::Raw(exit.data.clone()),
        };
        (Some(decoded), None)
    };

    ResolvedCall { to: entry.to, from: entry.from, kind, method, return_value, revert_value, value }
}

fn resolve_top_level(exit: &CallEvent, registry: &SelectorRegistry) -> ResolvedCall {
    let (return_value, revert_value) = if exit.kind == CallEventKind::Revert {
        (None, Some(registry.decode_revert(&exit.data)))
    } else {
        let decoded = match registry.function_by_name(TOP_LEVEL_METHOD) {
            Some(function) => registry.decode_return(function, &exit.data),
            None => DecodedPayload::Raw(exit.data.clone()),
        };
        (Some(decoded), None)
    };

    ResolvedCall {
        to: Address::ZERO,
        from: Address::ZERO,
        kind: CallKind::TopLevel,
        method: TOP_LEVEL_METHOD.to_string(),
        return_value,
        revert_value,
        value: U256::ZERO,
    }
}

/// Selector of unknown call input as hex, `0x` for a plain transfer
fn raw_method(data: &Bytes) -> String {
    format!("0x{}", hex::encode(&data[..data.len().min(4)]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{IEntryPointV06, IPaymasterV06, IStakeManagerV06};
    use alloy_primitives::hex;
    use alloy_sol_types::{SolCall, SolError, SolValue};

    fn test_address(n: u8) -> Address {
        Address::new([n; 20])
    }

    fn enter(kind: CallEventKind, from: u8, to: u8, data: impl Into<Bytes>) -> CallEvent {
        CallEvent::enter(kind, test_address(from), test_address(to), data.into())
    }

    fn ret(data: impl Into<Bytes>) -> CallEvent {
        CallEvent::exit(CallEventKind::Return, data.into())
    }

    fn revert(data: impl Into<Bytes>) -> CallEvent {
        CallEvent::exit(CallEventKind::Revert, data.into())
    }

    fn depth() -> CallEvent {
        CallEvent::exit(CallEventKind::Depth, Bytes::new())
    }

    fn balance_of_input() -> Vec<u8> {
        IStakeManagerV06::balanceOfCall { account: test_address(0x01) }.abi_encode()
    }

    #[test]
    fn test_nested_calls_resolve_in_exit_order() {
        let registry = SelectorRegistry::global();
        let events = vec![
            enter(CallEventKind::Call, 0x01, 0x02, hex!("aabbccdd").to_vec()),
            enter(CallEventKind::StaticCall, 0x02, 0x03, balance_of_input()),
            ret(U256::from(5).abi_encode()),
            ret(Bytes::new()),
            ret(U256::ZERO.abi_encode()),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        assert!(stack.is_balanced());
        assert_eq!(stack.calls.len(), 3);

        let inner = &stack.calls[0];
        assert_eq!(inner.method, "balanceOf");
        assert_eq!(inner.kind, CallKind::StaticCall);
        assert_eq!(inner.from, test_address(0x02));
        assert_eq!(inner.to, test_address(0x03));
        assert_eq!(
            inner.return_value.as_ref().and_then(|ret| ret.name()),
            Some("balanceOf")
        );

        let outer = &stack.calls[1];
        assert_eq!(outer.method, "0xaabbccdd");
        assert_eq!(outer.return_value, Some(DecodedPayload::Raw(Bytes::new())));

        let top = &stack.calls[2];
        assert_eq!(top.kind, CallKind::TopLevel);
        assert_eq!(top.method, TOP_LEVEL_METHOD);
        assert_eq!(top.return_value.as_ref().and_then(|ret| ret.name()), Some("validateUserOp"));
    }

    #[test]
    fn test_resolved_count_equals_exit_count() {
        let registry = SelectorRegistry::global();
        let events = vec![
            depth(),
            enter(CallEventKind::Call, 0x01, 0x02, Bytes::new()),
            depth(),
            enter(CallEventKind::DelegateCall, 0x02, 0x03, Bytes::new()),
            ret(Bytes::new()),
            enter(CallEventKind::Call, 0x02, 0x04, Bytes::new()),
            revert(Bytes::new()),
            ret(Bytes::new()),
            ret(Bytes::new()),
        ];

        let exits = events.iter().filter(|event| event.kind.is_exit()).count();
        let stack = reconstruct_call_stack(&events, registry);
        assert_eq!(stack.calls.len(), exits);
        assert!(stack.is_balanced());
        assert!(stack.calls[1].reverted());
        assert_eq!(stack.calls[3].kind, CallKind::TopLevel);
    }

    #[test]
    fn test_plain_transfer_method() {
        let registry = SelectorRegistry::global();
        let events = vec![
            enter(CallEventKind::Call, 0x01, 0x02, Bytes::new()).with_value(U256::from(10)),
            ret(Bytes::new()),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        assert_eq!(stack.calls[0].method, "0x");
        assert_eq!(stack.calls[0].value, U256::from(10));
    }

    #[test]
    fn test_create_records_code_length() {
        let registry = SelectorRegistry::global();
        let events = vec![
            enter(CallEventKind::Create2, 0x01, 0x02, hex!("6080604052").to_vec()),
            ret(vec![0u8; 1234]),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        let create = &stack.calls[0];
        assert_eq!(create.kind, CallKind::Create2);
        assert_eq!(create.method, "");
        assert_eq!(create.return_value, Some(DecodedPayload::CreationReceipt { len: 1234 }));
        assert_eq!(create.revert_value, None);
    }

    #[test]
    fn test_revert_decodes_registered_error() {
        let registry = SelectorRegistry::global();
        let reason = IEntryPointV06::FailedOp { opIndex: U256::ZERO, reason: "AA23".to_string() };
        let events = vec![
            enter(CallEventKind::Call, 0x01, 0x02, hex!("12345678").to_vec()),
            revert(reason.abi_encode()),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        let call = &stack.calls[0];
        assert!(call.reverted());
        assert_eq!(call.revert_value.as_ref().and_then(|rev| rev.name()), Some("FailedOp"));
    }

    #[test]
    fn test_undecodable_return_is_raw() {
        let registry = SelectorRegistry::global();
        let input = IPaymasterV06::validatePaymasterUserOpCall::SELECTOR.to_vec();
        let events = vec![
            enter(CallEventKind::Call, 0x01, 0x03, input),
            ret(hex!("01").to_vec()),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        assert_eq!(stack.calls[0].method, "validatePaymasterUserOp");
        assert_eq!(stack.calls[0].return_value, Some(DecodedPayload::Raw(Bytes::from(hex!("01")))));
    }

    #[test]
    fn test_unbalanced_trace_is_tolerated() {
        let registry = SelectorRegistry::global();
        let events = vec![
            enter(CallEventKind::Call, 0x01, 0x02, Bytes::new()),
            enter(CallEventKind::Call, 0x02, 0x03, Bytes::new()),
            ret(Bytes::new()),
        ];

        let stack = reconstruct_call_stack(&events, registry);
        assert_eq!(stack.calls.len(), 1);
        assert_eq!(stack.unmatched, 1);
        assert!(!stack.is_balanced());
    }

    #[test]
    fn test_empty_trace() {
        let events: Vec<CallEvent> = vec![];
        let stack = reconstruct_call_stack(&events, SelectorRegistry::global());
        assert!(stack.calls.is_empty());
        assert!(stack.is_balanced());
    }
}
