//! Validation rule configuration
//!
//! The banned opcode list, the staking thresholds and the code size under which
//! a contract counts as not deployed are policy constants. They are exposed as
//! CLI flags so they can be recalibrated without touching the rule checker.
//!
//! # Staking thresholds
//!
//! An entity is staked when its stake AND its unstake delay are both strictly
//! greater than the configured minimums. The defaults (1 wei, 1 second) are
//! placeholders rather than calibrated protocol minimums, so any real stake
//! passes.

use alloy_primitives::U256;
use std::collections::BTreeSet;
use thiserror::Error;

/// Errors that can occur when validating config
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric threshold is out of range
    #[error("Config validation failed: {0}")]
    ValidationError(String),

    /// An entry of the banned opcode list was refused
    #[error("Invalid banned opcode '{opcode}': {reason}")]
    InvalidOpcode {
        /// The opcode name as given
        opcode: String,
        /// Why it was refused
        reason: String,
    },
}

/// Opcodes an entity may never execute during validation
pub const DEFAULT_BANNED_OPCODES: &[&str] = &[
    "GASPRICE",
    "GASLIMIT",
    "DIFFICULTY",
    "PREVRANDAO",
    "RANDOM",
    "TIMESTAMP",
    "BASEFEE",
    "BLOCKHASH",
    "NUMBER",
    "SELFBALANCE",
    "BALANCE",
    "ORIGIN",
    "GAS",
    "CREATE",
    "COINBASE",
    "SELFDESTRUCT",
];

/// CREATE2 is governed by its own per-entity limit and cannot be banned outright
pub const CREATE2_OPCODE: &str = "CREATE2";

const DEFAULT_MIN_STAKE_VALUE: u64 = 1;
const DEFAULT_MIN_UNSTAKE_DELAY: u64 = 1;

/// Code size at or below which an address counts as not deployed
const DEFAULT_UNDEPLOYED_CODE_SIZE: u64 = 2;

/// EIP-170 contract code size limit
const MAX_CONTRACT_CODE_SIZE: u64 = 24576;

/// Validation rule CLI arguments
///
/// # Example usage:
///
/// ```bash
/// bundler \
///     --validation.min-stake 100000000000000000 \
///     --validation.min-unstake-delay 86400 \
///     --validation.banned-opcodes GASPRICE,TIMESTAMP,NUMBER
/// ```
#[derive(Debug, Clone, PartialEq, Eq, clap::Args)]
#[command(next_help_heading = "Validation Rules")]
pub struct ValidationRulesArgs {
    /// Stake (in wei) an entity must exceed to count as staked
    #[arg(long = "validation.min-stake", default_value_t = U256::from(DEFAULT_MIN_STAKE_VALUE))]
    pub min_stake_value: U256,

    /// Unstake delay (in seconds) an entity must exceed to count as staked
    #[arg(long = "validation.min-unstake-delay", default_value_t = DEFAULT_MIN_UNSTAKE_DELAY)]
    pub min_unstake_delay: u64,

    /// Code size at or below which a called contract counts as not deployed
    #[arg(
        long = "validation.undeployed-code-size",
        default_value_t = DEFAULT_UNDEPLOYED_CODE_SIZE
    )]
    pub undeployed_code_size: u64,

    /// Comma separated opcode names banned during validation.
    /// Defaults to the standard list when not given.
    #[arg(long = "validation.banned-opcodes", value_delimiter = ',')]
    pub banned_opcodes: Vec<String>,

    /// Also associate slots of nested mappings keyed by an already associated slot.
    /// Experimental, known to produce false positives.
    #[arg(long = "validation.double-mapping-association", default_value = "false")]
    pub double_mapping_association: bool,
}

impl Default for ValidationRulesArgs {
    fn default() -> Self {
        Self {
            min_stake_value: U256::from(DEFAULT_MIN_STAKE_VALUE),
            min_unstake_delay: DEFAULT_MIN_UNSTAKE_DELAY,
            undeployed_code_size: DEFAULT_UNDEPLOYED_CODE_SIZE,
            banned_opcodes: vec![],
            double_mapping_association: false,
        }
    }
}

impl ValidationRulesArgs {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for opcode in &self.banned_opcodes {
            if opcode.is_empty() {
                return Err(ConfigError::InvalidOpcode {
                    opcode: opcode.clone(),
                    reason: "empty opcode name".to_string(),
                });
            }
            if !opcode.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
                return Err(ConfigError::InvalidOpcode {
                    opcode: opcode.clone(),
                    reason: "opcode names are upper case mnemonics".to_string(),
                });
            }
            if opcode == CREATE2_OPCODE {
                return Err(ConfigError::InvalidOpcode {
                    opcode: opcode.clone(),
                    reason: "CREATE2 is limited per entity, factories need it".to_string(),
                });
            }
        }

        if self.undeployed_code_size >= MAX_CONTRACT_CODE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "--validation.undeployed-code-size must be below the {MAX_CONTRACT_CODE_SIZE} byte code size limit"
            )));
        }

        Ok(())
    }

    /// Build the rule configuration from the CLI args
    pub fn rules_config(&self) -> Result<ValidationRulesConfig, ConfigError> {
        self.validate()?;

        let mut config = ValidationRulesConfig::default()
            .with_min_stake(self.min_stake_value, self.min_unstake_delay)
            .with_undeployed_code_size(self.undeployed_code_size)
            .with_double_mapping_association(self.double_mapping_association);

        if !self.banned_opcodes.is_empty() {
            config = config.with_banned_opcodes(self.banned_opcodes.iter().cloned());
        }

        Ok(config)
    }
}

/// Policy used by the rule checker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRulesConfig {
    /// Stake an entity must exceed to count as staked
    pub min_stake_value: U256,

    /// Unstake delay an entity must exceed to count as staked
    pub min_unstake_delay: u64,

    /// Code size at or below which an address counts as not deployed
    pub undeployed_code_size: u64,

    /// Opcodes no entity may execute
    pub banned_opcodes: BTreeSet<String>,

    /// Associate `keccak(x ++ slot)` with the owner of `slot`
    pub double_mapping_association: bool,
}

impl Default for ValidationRulesConfig {
    fn default() -> Self {
        Self {
            min_stake_value: U256::from(DEFAULT_MIN_STAKE_VALUE),
            min_unstake_delay: DEFAULT_MIN_UNSTAKE_DELAY,
            undeployed_code_size: DEFAULT_UNDEPLOYED_CODE_SIZE,
            banned_opcodes: DEFAULT_BANNED_OPCODES.iter().map(|op| op.to_string()).collect(),
            double_mapping_association: false,
        }
    }
}

impl ValidationRulesConfig {
    /// Set the staking thresholds
    pub fn with_min_stake(mut self, min_stake_value: U256, min_unstake_delay: u64) -> Self {
        self.min_stake_value = min_stake_value;
        self.min_unstake_delay = min_unstake_delay;
        self
    }

    /// Set the undeployed code size threshold
    pub fn with_undeployed_code_size(mut self, size: u64) -> Self {
        self.undeployed_code_size = size;
        self
    }

    /// Replace the banned opcode list
    ///
    /// `CREATE2` is dropped from the list, its use is limited per entity instead.
    pub fn with_banned_opcodes(mut self, opcodes: impl IntoIterator<Item = String>) -> Self {
        self.banned_opcodes =
            opcodes.into_iter().filter(|opcode| opcode != CREATE2_OPCODE).collect();
        self
    }

    /// Enable or disable the nested mapping association rule
    pub fn with_double_mapping_association(mut self, enabled: bool) -> Self {
        self.double_mapping_association = enabled;
        self
    }

    /// Check if an opcode is banned
    pub fn is_banned(&self, opcode: &str) -> bool {
        opcode != CREATE2_OPCODE && self.banned_opcodes.contains(opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    #[derive(Debug, Parser)]
    struct TestCli {
        #[command(flatten)]
        rules: ValidationRulesArgs,
    }

    #[test]
    fn test_default_args_validate() {
        let args = ValidationRulesArgs::default();
        assert!(args.validate().is_ok());
        assert_eq!(args.rules_config().unwrap(), ValidationRulesConfig::default());
    }

    #[test]
    fn test_clap_defaults_match_default() {
        let cli = TestCli::parse_from(["bundler"]);
        assert_eq!(cli.rules, ValidationRulesArgs::default());
    }

    #[test]
    fn test_parse_flags() {
        let cli = TestCli::parse_from([
            "bundler",
            "--validation.min-stake",
            "100000000000000000",
            "--validation.min-unstake-delay",
            "86400",
            "--validation.banned-opcodes",
            "TIMESTAMP,NUMBER",
            "--validation.double-mapping-association",
        ]);

        let config = cli.rules.rules_config().unwrap();
        assert_eq!(config.min_stake_value, U256::from(100_000_000_000_000_000u64));
        assert_eq!(config.min_unstake_delay, 86400);
        assert!(config.is_banned("TIMESTAMP"));
        assert!(config.is_banned("NUMBER"));
        assert!(!config.is_banned("GASPRICE"));
        assert!(config.double_mapping_association);
    }

    #[test]
    fn test_create2_cannot_be_banned() {
        let args = ValidationRulesArgs {
            banned_opcodes: vec!["CREATE2".to_string()],
            ..Default::default()
        };
        assert!(matches!(args.validate(), Err(ConfigError::InvalidOpcode { .. })));
    }

    #[test]
    fn test_lower_case_opcode_rejected() {
        let args = ValidationRulesArgs {
            banned_opcodes: vec!["timestamp".to_string()],
            ..Default::default()
        };
        assert!(matches!(args.validate(), Err(ConfigError::InvalidOpcode { .. })));
    }

    #[rstest]
    #[case::default(DEFAULT_UNDEPLOYED_CODE_SIZE, true)]
    #[case::below_limit(MAX_CONTRACT_CODE_SIZE - 1, true)]
    #[case::at_limit(MAX_CONTRACT_CODE_SIZE, false)]
    #[case::max(u64::MAX, false)]
    fn test_undeployed_size_upper_bound(#[case] size: u64, #[case] valid: bool) {
        let args = ValidationRulesArgs { undeployed_code_size: size, ..Default::default() };
        if valid {
            assert!(args.validate().is_ok());
        } else {
            assert!(matches!(args.validate(), Err(ConfigError::ValidationError(_))));
        }
    }

    #[test]
    fn test_builder_never_bans_create2() {
        let opcodes = DEFAULT_BANNED_OPCODES
            .iter()
            .map(|op| op.to_string())
            .chain([CREATE2_OPCODE.to_string()]);
        let config = ValidationRulesConfig::default().with_banned_opcodes(opcodes);

        assert!(!config.banned_opcodes.contains(CREATE2_OPCODE));
        assert!(!config.is_banned(CREATE2_OPCODE));
        assert!(config.is_banned("TIMESTAMP"));
    }

    #[test]
    fn test_default_banned_opcodes() {
        let config = ValidationRulesConfig::default();
        for opcode in DEFAULT_BANNED_OPCODES {
            assert!(config.is_banned(opcode), "{opcode} should be banned");
        }
        assert!(!config.is_banned("CALL"));
        assert!(!config.is_banned(CREATE2_OPCODE));
    }
}
