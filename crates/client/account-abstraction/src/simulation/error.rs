//! Validation rule violations and trace defects
//!
//! Two classes of failure come out of rule checking. A [`RuleViolation`] means
//! the operation is not admissible and should be rejected; a [`TraceDefect`]
//! means the trace handed to the checker broke its contract, which points at a
//! bug in the simulation pipeline rather than at the operation.

use alloy_primitives::{Address, B256};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::types::EntityKind;

/// JSON-RPC error code for opcode and storage validation failures
pub const OPCODE_VALIDATION_ERROR_CODE: i64 = -32502;

/// Result type for validation rule checking
pub type ScanResult<T> = Result<T, ScanError>;

/// Validation rule identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationRule {
    /// A call into the EntryPoint other than a deposit
    IllegalEntryPointCall,
    /// A call carrying value to anything but the EntryPoint
    CallWithValue,
    /// The entity ran out of gas and reverted internally
    OutOfGas,
    /// A banned opcode was used
    BannedOpcode,
    /// CREATE2 used more than the entity is allowed to
    InvalidCreate2,
    /// Storage slot not associated with the sender or the entity
    ForbiddenStorageAccess,
    /// Storage access that requires the entity to be staked
    UnstakedStorageAccess,
    /// Unstaked paymaster returned a context
    UnstakedPaymasterContext,
    /// Access to an address without deployed code
    UndeployedContractAccess,
}

impl ValidationRule {
    /// Get the rule ID string
    pub const fn id(&self) -> &'static str {
        match self {
            Self::IllegalEntryPointCall => "OP-052",
            Self::CallWithValue => "OP-061",
            Self::OutOfGas => "OP-020",
            Self::BannedOpcode => "OP-011",
            Self::InvalidCreate2 => "OP-031",
            Self::ForbiddenStorageAccess => "STO-021",
            Self::UnstakedStorageAccess => "STO-031",
            Self::UnstakedPaymasterContext => "EREP-050",
            Self::UndeployedContractAccess => "OP-041",
        }
    }
}

impl fmt::Display for ValidationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

/// The entity a violation is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityContext {
    /// Role of the entity
    pub entity: EntityKind,
    /// Address of the entity, absent when no stake record exists for it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<Address>,
}

/// Validation rule violation
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("[{rule}] {description}")]
pub struct RuleViolation {
    /// The rule that was violated
    pub rule: ValidationRule,

    /// Human-readable description
    pub description: String,

    /// The entity that caused the violation, for per-entity rules
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<EntityContext>,
}

impl RuleViolation {
    /// Create a violation that is not attributed to a single entity
    pub fn new(rule: ValidationRule, description: impl Into<String>) -> Self {
        Self { rule, description: description.into(), context: None }
    }

    /// Create a violation attributed to an entity
    pub fn for_entity(
        rule: ValidationRule,
        entity: EntityKind,
        address: Option<Address>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            rule,
            description: description.into(),
            context: Some(EntityContext { entity, address }),
        }
    }

    /// JSON-RPC error code reported for every violation
    pub const fn code(&self) -> i64 {
        OPCODE_VALIDATION_ERROR_CODE
    }

    /// The entity the violation is attributed to
    pub fn entity(&self) -> Option<EntityKind> {
        self.context.map(|ctx| ctx.entity)
    }
}

/// The trace broke the contract between the tracer and the rule checker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceDefect {
    /// No call from the EntryPoint into any entity was recorded
    #[error("unexpected trace result: no calls from entrypoint")]
    NoEntryPointCalls,

    /// The account's validateUserOp level is missing
    #[error("missing trace into validateUserOp")]
    MissingAccountTrace,

    /// An entity accessed storage but has no stake record
    #[error("{entity} not in userOp, but has storage accesses in {address}")]
    MissingStakeInfo {
        /// The entity with recorded accesses
        entity: EntityKind,
        /// The contract whose storage was accessed
        address: Address,
        /// The slot that required stake
        slot: B256,
    },
}

/// Error returned by validation rule checking
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The operation violates a validation rule
    #[error(transparent)]
    Violation(#[from] RuleViolation),

    /// The trace is malformed
    #[error("internal: {0}")]
    Defect(#[from] TraceDefect),
}

impl ScanError {
    /// Check if this error indicates a broken trace pipeline rather than a bad operation
    pub const fn is_defect(&self) -> bool {
        matches!(self, Self::Defect(_))
    }

    /// The rule violation, if this is one
    pub const fn as_violation(&self) -> Option<&RuleViolation> {
        match self {
            Self::Violation(violation) => Some(violation),
            Self::Defect(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_violation_display() {
        let violation = RuleViolation::for_entity(
            ValidationRule::BannedOpcode,
            EntityKind::Paymaster,
            Some(Address::repeat_byte(0x03)),
            "paymaster uses banned opcode: TIMESTAMP",
        );
        assert_eq!(violation.to_string(), "[OP-011] paymaster uses banned opcode: TIMESTAMP");
        assert_eq!(violation.code(), OPCODE_VALIDATION_ERROR_CODE);
        assert_eq!(violation.entity(), Some(EntityKind::Paymaster));
    }

    #[test]
    fn test_scan_error_classes() {
        let violation: ScanError =
            RuleViolation::new(ValidationRule::CallWithValue, "may not make CALL with value")
                .into();
        assert!(!violation.is_defect());
        assert!(violation.as_violation().is_some());
        assert_eq!(violation.to_string(), "[OP-061] may not make CALL with value");

        let defect: ScanError = TraceDefect::NoEntryPointCalls.into();
        assert!(defect.is_defect());
        assert!(defect.as_violation().is_none());
        assert_eq!(
            defect.to_string(),
            "internal: unexpected trace result: no calls from entrypoint"
        );
    }

    #[test]
    fn test_violation_serializes_context() {
        let violation = RuleViolation::for_entity(
            ValidationRule::OutOfGas,
            EntityKind::Factory,
            Some(Address::repeat_byte(0x02)),
            "factory internally reverts on oog",
        );
        let json = serde_json::to_value(&violation).unwrap();
        assert_eq!(json["rule"], "OutOfGas");
        assert_eq!(json["context"]["entity"], "factory");
    }
}
