//! Validation rule checking
//!
//! Applies the ERC-7562 validation rules to the trace of a simulated
//! `simulateValidation` call. The checker first looks at the shape of every
//! call made during validation, then walks the trace level of each entity in
//! the order factory, account, paymaster, and stops at the first violation.
//!
//! Reference: https://eips.ethereum.org/EIPS/eip-7562

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, B256, U256};
use tracing::{debug, info};

use crate::config::{ValidationRulesConfig, CREATE2_OPCODE};
use crate::contracts::entity_selector;
use crate::decoding::SelectorRegistry;

use super::aggregate::{collect_addresses, collect_storage_map};
use super::call_stack::{resolved_calls, ResolvedCall};
use super::error::{RuleViolation, ScanResult, TraceDefect, ValidationRule};
use super::slots::{is_associated, resolve_entity_slots, EntitySlots};
use super::trace::{BundlerTracerResult, StorageAccess, TopLevelCallInfo};
use super::types::{EntityKind, EntityStakes, StakeInfo, UserOperation, ValidationOutcome};

/// Method names an entity may call on the EntryPoint during validation
const ALLOWED_ENTRY_POINT_METHODS: &[&str] = &["depositTo", "0x"];

/// Name of the paymaster validation function
const PAYMASTER_VALIDATION_METHOD: &str = "validatePaymasterUserOp";

/// Name of the paymaster context return field
const PAYMASTER_CONTEXT_FIELD: &str = "context";

/// Validation rule checker
#[derive(Debug, Clone, Default)]
pub struct ValidationRuleChecker {
    config: ValidationRulesConfig,
}

impl ValidationRuleChecker {
    /// Create a new rule checker
    pub const fn new(config: ValidationRulesConfig) -> Self {
        Self { config }
    }

    /// The policy this checker applies
    pub const fn config(&self) -> &ValidationRulesConfig {
        &self.config
    }

    /// Check a traced validation against the rules
    ///
    /// Returns the addresses and storage the validation depended on, or the
    /// first violation found. A [`TraceDefect`] means the trace itself is
    /// unusable and says nothing about the operation.
    pub fn check(
        &self,
        op: &UserOperation,
        trace: &BundlerTracerResult,
        stakes: &EntityStakes,
        entry_point: Address,
    ) -> ScanResult<ValidationOutcome> {
        if trace.calls_from_entry_point.is_empty() {
            return Err(TraceDefect::NoEntryPointCalls.into());
        }

        debug!(
            target: "aa-validation",
            sender = %op.sender,
            levels = trace.calls_from_entry_point.len(),
            preimages = trace.keccak.len(),
            "Checking validation rules"
        );

        let call_stack = resolved_calls(trace, SelectorRegistry::global());
        check_entry_point_calls(&call_stack.calls, entry_point)?;
        check_call_values(&call_stack.calls, entry_point)?;

        let slots = resolve_entity_slots(
            &trace.keccak,
            &stakes.addresses(),
            self.config.double_mapping_association,
        );
        let scope = ScanScope { op, stakes, entry_point, slots: &slots, config: &self.config };

        for entity in EntityKind::ALL {
            let Some(level) = trace.level(entity_selector(entity)) else {
                if entity == EntityKind::Account {
                    return Err(TraceDefect::MissingAccountTrace.into());
                }
                continue;
            };

            let subject = Subject::new(entity, stakes);
            debug!(
                target: "aa-validation",
                entity = %entity,
                address = ?subject.address,
                opcodes = level.opcodes.len(),
                accessed = level.access.len(),
                "Checking entity level"
            );

            check_out_of_gas(&subject, level)?;
            check_banned_opcodes(&subject, level, &self.config)?;
            check_create2(&subject, level)?;
            check_storage_access(&subject, level, &scope)?;
            if entity == EntityKind::Paymaster {
                check_paymaster_context(&subject, &call_stack.calls, &self.config)?;
            }
            check_undeployed_contracts(&subject, level, op.sender, &self.config)?;
        }

        let outcome = ValidationOutcome {
            addresses: collect_addresses(trace),
            storage_map: collect_storage_map(trace),
        };

        info!(
            target: "aa-validation",
            sender = %op.sender,
            addresses = outcome.addresses.len(),
            "UserOperation passed validation rules"
        );

        Ok(outcome)
    }
}

/// Inputs shared by the storage checks of every entity
#[derive(Debug, Clone, Copy)]
struct ScanScope<'a> {
    op: &'a UserOperation,
    stakes: &'a EntityStakes,
    entry_point: Address,
    slots: &'a EntitySlots,
    config: &'a ValidationRulesConfig,
}

impl ScanScope<'_> {
    /// Role name of a known entity address, the address itself otherwise
    fn name_of(&self, address: Address) -> String {
        self.stakes
            .role_of(address)
            .map_or_else(|| address.to_string(), |role| role.as_str().to_string())
    }
}

/// The entity whose level is being checked
#[derive(Debug, Clone, Copy)]
struct Subject<'a> {
    kind: EntityKind,
    address: Option<Address>,
    stake: Option<&'a StakeInfo>,
}

impl<'a> Subject<'a> {
    fn new(kind: EntityKind, stakes: &'a EntityStakes) -> Self {
        let stake = stakes.get(kind);
        Self { kind, address: stake.map(|info| info.address), stake }
    }

    fn violation(&self, rule: ValidationRule, description: impl Into<String>) -> RuleViolation {
        RuleViolation::for_entity(rule, self.kind, self.address, description)
    }

    /// Fail unless the entity is staked, a missing stake record is a trace defect
    fn require_stake(
        &self,
        rule: ValidationRule,
        config: &ValidationRulesConfig,
        description: impl FnOnce() -> String,
        missing: impl FnOnce() -> TraceDefect,
    ) -> ScanResult<()> {
        let Some(stake) = self.stake else {
            return Err(missing().into());
        };
        if stake.is_staked(config) {
            Ok(())
        } else {
            Err(self.violation(rule, description()).into())
        }
    }
}

/// Only deposits may call into the EntryPoint, and only the EntryPoint may call itself
fn check_entry_point_calls(calls: &[ResolvedCall], entry_point: Address) -> Result<(), RuleViolation> {
    let illegal = calls.iter().find(|call| {
        call.to == entry_point
            && call.from != entry_point
            && !ALLOWED_ENTRY_POINT_METHODS.contains(&call.method.as_str())
    });

    match illegal {
        Some(call) => Err(RuleViolation::new(
            ValidationRule::IllegalEntryPointCall,
            format!("illegal call into EntryPoint during validation {}", call.method),
        )),
        None => Ok(()),
    }
}

/// Value may only be sent to the EntryPoint
fn check_call_values(calls: &[ResolvedCall], entry_point: Address) -> Result<(), RuleViolation> {
    if calls.iter().any(|call| call.to != entry_point && call.value > U256::ZERO) {
        return Err(RuleViolation::new(ValidationRule::CallWithValue, "may not make CALL with value"));
    }
    Ok(())
}

fn check_out_of_gas(subject: &Subject<'_>, level: &TopLevelCallInfo) -> Result<(), RuleViolation> {
    if level.oog {
        return Err(subject.violation(
            ValidationRule::OutOfGas,
            format!("{} internally reverts on oog", subject.kind),
        ));
    }
    Ok(())
}

fn check_banned_opcodes(
    subject: &Subject<'_>,
    level: &TopLevelCallInfo,
    config: &ValidationRulesConfig,
) -> Result<(), RuleViolation> {
    let banned = level
        .opcodes
        .iter()
        .find(|&(opcode, &count)| count > 0 && config.is_banned(opcode));

    match banned {
        Some((opcode, _)) => Err(subject.violation(
            ValidationRule::BannedOpcode,
            format!("{} uses banned opcode: {opcode}", subject.kind),
        )),
        None => Ok(()),
    }
}

/// The factory may CREATE2 the sender once, nobody else may use it at all
fn check_create2(subject: &Subject<'_>, level: &TopLevelCallInfo) -> Result<(), RuleViolation> {
    let count = level.opcode_count(CREATE2_OPCODE);

    if subject.kind == EntityKind::Factory {
        if count > 1 {
            return Err(subject.violation(
                ValidationRule::InvalidCreate2,
                format!("{} with too many {CREATE2_OPCODE}", subject.kind),
            ));
        }
    } else if count > 0 {
        return Err(subject.violation(
            ValidationRule::InvalidCreate2,
            format!("{} uses banned opcode: {CREATE2_OPCODE}", subject.kind),
        ));
    }

    Ok(())
}

/// How a single storage slot access is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotAccess {
    Allowed,
    RequiresStake,
    Forbidden,
}

fn classify_slot(
    subject: &Subject<'_>,
    contract: Address,
    slot: B256,
    scope: &ScanScope<'_>,
) -> SlotAccess {
    if is_associated(slot, scope.op.sender, scope.slots) {
        // The sender may not be deployed yet, so its associated storage is not
        // safe to probe without stake
        if scope.op.has_init_code() {
            SlotAccess::RequiresStake
        } else {
            SlotAccess::Allowed
        }
    } else if subject.address.is_some_and(|entity| {
        entity == contract || is_associated(slot, entity, scope.slots)
    }) {
        SlotAccess::RequiresStake
    } else {
        SlotAccess::Forbidden
    }
}

fn check_storage_access(
    subject: &Subject<'_>,
    level: &TopLevelCallInfo,
    scope: &ScanScope<'_>,
) -> ScanResult<()> {
    for (&contract, access) in &level.access {
        if contract == scope.op.sender || contract == scope.entry_point {
            continue;
        }

        let mut stake_slot = None;
        for (slot, is_write) in accessed_slots(access) {
            match classify_slot(subject, contract, slot, scope) {
                SlotAccess::Allowed => {}
                SlotAccess::RequiresStake => stake_slot = Some(slot),
                SlotAccess::Forbidden => {
                    let direction = if is_write { "write to" } else { "read from" };
                    return Err(subject
                        .violation(
                            ValidationRule::ForbiddenStorageAccess,
                            format!(
                                "{} has forbidden {direction} {} slot {slot}",
                                subject.kind,
                                scope.name_of(contract)
                            ),
                        )
                        .into());
                }
            }
        }

        if let Some(slot) = stake_slot {
            subject.require_stake(
                ValidationRule::UnstakedStorageAccess,
                scope.config,
                || format!("unstaked {} accessed {} slot {slot}", subject.kind, scope.name_of(contract)),
                || TraceDefect::MissingStakeInfo { entity: subject.kind, address: contract, slot },
            )?;
        }
    }

    Ok(())
}

/// Written slots first, then read slots, each tagged with the map it came from
fn accessed_slots(access: &StorageAccess) -> impl Iterator<Item = (B256, bool)> + '_ {
    access
        .writes
        .keys()
        .map(|&slot| (slot, true))
        .chain(access.reads.keys().map(|&slot| (slot, false)))
}

/// A non-empty context means a postOp call later, which requires stake
fn check_paymaster_context(
    subject: &Subject<'_>,
    calls: &[ResolvedCall],
    config: &ValidationRulesConfig,
) -> Result<(), RuleViolation> {
    let Some(stake) = subject.stake else {
        return Ok(());
    };

    let context = calls
        .iter()
        .find(|call| call.method == PAYMASTER_VALIDATION_METHOD && call.to == stake.address)
        .and_then(|call| call.return_value.as_ref())
        .and_then(|ret| ret.field(PAYMASTER_CONTEXT_FIELD));

    let has_context = matches!(context, Some(DynSolValue::Bytes(context)) if !context.is_empty());
    if has_context && !stake.is_staked(config) {
        return Err(subject.violation(
            ValidationRule::UnstakedPaymasterContext,
            "unstaked paymaster must not return context",
        ));
    }
    Ok(())
}

/// The sender is exempt because it may be deployed by this very operation
fn check_undeployed_contracts(
    subject: &Subject<'_>,
    level: &TopLevelCallInfo,
    sender: Address,
    config: &ValidationRulesConfig,
) -> Result<(), RuleViolation> {
    let undeployed = level
        .contract_size
        .iter()
        .find(|&(&address, &size)| address != sender && size <= config.undeployed_code_size);

    match undeployed {
        Some((address, _)) => Err(subject.violation(
            ValidationRule::UndeployedContractAccess,
            format!("{} accesses un-deployed contract {address}", subject.kind),
        )),
        None => Ok(()),
    }
}
