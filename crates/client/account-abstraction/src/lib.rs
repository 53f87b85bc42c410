//! Simulation-time validation rules for ERC-4337 user operations.

mod config;
pub mod contracts;
pub mod decoding;
pub mod simulation;

pub use config::{
    ConfigError, ValidationRulesArgs, ValidationRulesConfig, CREATE2_OPCODE,
    DEFAULT_BANNED_OPCODES,
};
pub use contracts::{entity_selector, ENTRYPOINT_V06_ADDRESS};
pub use decoding::{DecodedField, DecodedPayload, SelectorRegistry};
pub use simulation::{
    BundlerTracerResult, EntityKind, EntityStakes, RuleViolation, ScanError, ScanResult,
    StakeInfo, TraceDefect, UserOperation, ValidationOutcome, ValidationRule,
    ValidationRuleChecker,
};
