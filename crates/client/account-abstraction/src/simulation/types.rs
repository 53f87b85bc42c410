//! Core types for trace-based UserOperation validation
//!
//! The operation under validation, entity stake records and the outcome handed
//! back to the mempool layer.

use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::config::ValidationRulesConfig;

/// UserOperation in the EntryPoint v0.6 layout
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    /// The account making the operation
    pub sender: Address,
    /// Anti-replay nonce
    pub nonce: U256,
    /// Factory address followed by factory calldata, empty when the account exists
    pub init_code: Bytes,
    /// Data passed to the account during execution
    pub call_data: Bytes,
    /// Gas limit for the execution phase
    pub call_gas_limit: U256,
    /// Gas limit for the validation phase
    pub verification_gas_limit: U256,
    /// Gas paid to the bundler for pre-verification work
    pub pre_verification_gas: U256,
    /// Maximum fee per gas
    pub max_fee_per_gas: U256,
    /// Maximum priority fee per gas
    pub max_priority_fee_per_gas: U256,
    /// Paymaster address followed by paymaster data, empty when self-sponsored
    pub paymaster_and_data: Bytes,
    /// Signature checked by the account
    pub signature: Bytes,
}

impl UserOperation {
    /// Whether this operation deploys its sender
    pub fn has_init_code(&self) -> bool {
        !self.init_code.is_empty()
    }

    /// Factory is the first 20 bytes of initCode (if present)
    pub fn factory(&self) -> Option<Address> {
        (self.init_code.len() >= 20).then(|| Address::from_slice(&self.init_code[..20]))
    }

    /// Paymaster is the first 20 bytes of paymasterAndData (if present)
    pub fn paymaster(&self) -> Option<Address> {
        (self.paymaster_and_data.len() >= 20)
            .then(|| Address::from_slice(&self.paymaster_and_data[..20]))
    }
}

/// One of the untrusted parties that supply code to a UserOperation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EntityKind {
    /// Deploys the sender through initCode
    Factory,
    /// The sender itself
    Account,
    /// Sponsors the gas of the operation
    Paymaster,
}

impl EntityKind {
    /// Order in which entities are checked
    pub const ALL: [Self; 3] = [Self::Factory, Self::Account, Self::Paymaster];

    /// Role name used in violation messages
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Factory => "factory",
            Self::Account => "account",
            Self::Paymaster => "paymaster",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stake information for an entity (account, factory, paymaster)
///
/// Retrieved from the EntryPoint by the caller before the rules are checked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StakeInfo {
    /// The entity address
    pub address: Address,

    /// Amount of ETH staked
    pub stake: U256,

    /// Unstake delay in seconds
    pub unstake_delay_sec: u64,
}

impl StakeInfo {
    /// Create a new StakeInfo for an address with no stake
    pub const fn unstaked(address: Address) -> Self {
        Self { address, stake: U256::ZERO, unstake_delay_sec: 0 }
    }

    /// Create a StakeInfo with the given stake and delay
    pub const fn new(address: Address, stake: U256, unstake_delay_sec: u64) -> Self {
        Self { address, stake, unstake_delay_sec }
    }

    /// Both the stake and the unstake delay must strictly exceed the configured minimums
    pub fn is_staked(&self, config: &ValidationRulesConfig) -> bool {
        self.stake > config.min_stake_value && self.unstake_delay_sec > config.min_unstake_delay
    }
}

/// Collected stake information for all entities
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStakes {
    /// Sender stake info
    pub sender: StakeInfo,

    /// Factory stake info (if present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<StakeInfo>,

    /// Paymaster stake info (if present)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymaster: Option<StakeInfo>,
}

impl EntityStakes {
    /// Stake info of the given entity
    pub fn get(&self, entity: EntityKind) -> Option<&StakeInfo> {
        match entity {
            EntityKind::Factory => self.factory.as_ref(),
            EntityKind::Account => Some(&self.sender),
            EntityKind::Paymaster => self.paymaster.as_ref(),
        }
    }

    /// Address of the given entity, if it takes part in the operation
    pub fn address(&self, entity: EntityKind) -> Option<Address> {
        self.get(entity).map(|info| info.address)
    }

    /// All known entity addresses, in check order
    pub fn addresses(&self) -> Vec<Address> {
        EntityKind::ALL.iter().filter_map(|&entity| self.address(entity)).collect()
    }

    /// Role of an address, if it is one of the known entities
    pub fn role_of(&self, address: Address) -> Option<EntityKind> {
        EntityKind::ALL.into_iter().find(|&entity| self.address(entity) == Some(address))
    }
}

/// Storage read by the validation, keyed by contract then slot
pub type StorageMap = HashMap<Address, BTreeMap<B256, B256>>;

/// Successful result of validation rule checking
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    /// Every contract address the validation touched, without duplicates
    pub addresses: Vec<Address>,

    /// Storage read per contract, first level to read an address wins
    pub storage_map: StorageMap,
}
