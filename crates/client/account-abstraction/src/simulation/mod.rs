//! Trace-based UserOperation validation
//!
//! Consumes the bundler tracer output of a simulated validation and decides
//! whether the operation obeys the validation rules. The pipeline:
//! - Rebuild the calls made during validation from entry/exit markers
//! - Derive the storage slots owned by each entity from keccak preimages
//! - Check call shape, then opcodes, storage and code access per entity
//! - Collect the addresses and storage the validation depended on

mod aggregate;
mod call_stack;
mod error;
mod rules;
mod slots;
mod trace;
mod types;

pub use aggregate::{collect_addresses, collect_storage_map};
pub use call_stack::{
    reconstruct_call_stack, resolved_calls, CallKind, CallStack, ResolvedCall, TOP_LEVEL_METHOD,
};
pub use error::{
    EntityContext, RuleViolation, ScanError, ScanResult, TraceDefect, ValidationRule,
    OPCODE_VALIDATION_ERROR_CODE,
};
pub use rules::ValidationRuleChecker;
pub use slots::{is_associated, pad_address, resolve_entity_slots, EntitySlots, ASSOCIATED_SLOT_RANGE};
pub use trace::{BundlerTracerResult, CallEvent, CallEventKind, StorageAccess, TopLevelCallInfo};
pub use types::{
    EntityKind, EntityStakes, StakeInfo, StorageMap, UserOperation, ValidationOutcome,
};
