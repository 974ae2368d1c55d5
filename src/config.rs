//! Configuration loading and validation

use anyhow::{Context, Result};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::path::Path;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub chain: ChainConfig,
    #[serde(default)]
    pub compound: CompoundConfig,
    #[serde(default)]
    pub accounts: AccountsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// REST (gRPC-gateway) endpoint of the node
    #[serde(default = "default_node_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_chain_id")]
    pub chain_id: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    /// Staking token denomination
    #[serde(default = "default_denom")]
    pub denom: String,
    #[serde(default = "default_account_prefix")]
    pub account_prefix: String,
    #[serde(default = "default_validator_prefix")]
    pub validator_prefix: String,
    /// Validator receiving every re-delegation
    #[serde(default = "default_target_validator")]
    pub target_validator: String,
    /// Fee per gas unit, in native units
    #[serde(default = "default_gas_unit_cost")]
    pub gas_unit_cost: u64,
    #[serde(default = "default_memo")]
    pub memo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompoundConfig {
    /// Minimum pending amount (tokens) before an account is withdrawn
    #[serde(default = "default_minimum_withdraw")]
    pub minimum_withdraw: Decimal,
    /// Tokens left unstaked on every account
    #[serde(default = "default_keep_unstaked")]
    pub keep_unstaked: Decimal,
    #[serde(default = "default_recheck_period_secs")]
    pub recheck_period_secs: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AccountsConfig {
    /// Validator operator addresses whose commission is withdrawn
    #[serde(default)]
    pub validators: Vec<String>,
    /// Delegator addresses to compound
    #[serde(default)]
    pub delegators: Vec<String>,
    /// Base64 encrypted seed phrases (see `compound encrypt`)
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Lowest accepted `minimum_withdraw`, in tokens
pub const MIN_MINIMUM_WITHDRAW: i64 = 10;
/// Lowest accepted `keep_unstaked`, in tokens
pub const MIN_KEEP_UNSTAKED: i64 = 2;
/// Longest accepted recheck period
pub const MAX_RECHECK_PERIOD_SECS: u64 = 86_400;

fn default_node_endpoint() -> String {
    "http://127.0.0.1:1317".to_string()
}

fn default_chain_id() -> String {
    "fxcore".to_string()
}

fn default_timeout_ms() -> u64 {
    15_000
}

fn default_denom() -> String {
    "FX".to_string()
}

fn default_account_prefix() -> String {
    "fx".to_string()
}

fn default_validator_prefix() -> String {
    "fxvaloper".to_string()
}

fn default_target_validator() -> String {
    "fxvaloper1z67rkadwrp2nf4zwxpktpqnw969plelyjj5alt".to_string()
}

fn default_gas_unit_cost() -> u64 {
    4_000_000_000_000
}

fn default_memo() -> String {
    "FrenchXCore AutoCompounder".to_string()
}

fn default_minimum_withdraw() -> Decimal {
    Decimal::from(100)
}

fn default_keep_unstaked() -> Decimal {
    Decimal::from(5)
}

fn default_recheck_period_secs() -> u64 {
    300
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            endpoint: default_node_endpoint(),
            chain_id: default_chain_id(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            denom: default_denom(),
            account_prefix: default_account_prefix(),
            validator_prefix: default_validator_prefix(),
            target_validator: default_target_validator(),
            gas_unit_cost: default_gas_unit_cost(),
            memo: default_memo(),
        }
    }
}

impl Default for CompoundConfig {
    fn default() -> Self {
        Self {
            minimum_withdraw: default_minimum_withdraw(),
            keep_unstaked: default_keep_unstaked(),
            recheck_period_secs: default_recheck_period_secs(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let settings = config::Config::builder()
            // Load from file if exists
            .add_source(config::File::from(path).required(false))
            // Override with environment variables (prefix COMPOUNDER__)
            .add_source(
                config::Environment::with_prefix("COMPOUNDER")
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(":")
                    .with_list_parse_key("accounts.validators")
                    .with_list_parse_key("accounts.delegators")
                    .with_list_parse_key("accounts.seeds")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut config: Config = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.normalize();
        config.validate()?;

        Ok(config)
    }

    /// Addresses are compared case-insensitively; keep them lower-cased
    fn normalize(&mut self) {
        for address in self
            .accounts
            .validators
            .iter_mut()
            .chain(self.accounts.delegators.iter_mut())
        {
            *address = address.trim().to_lowercase();
        }
        self.chain.target_validator = self.chain.target_validator.trim().to_lowercase();
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        url::Url::parse(&self.node.endpoint)
            .with_context(|| format!("Invalid node endpoint: {}", self.node.endpoint))?;

        if self.node.chain_id.is_empty() {
            anyhow::bail!("chain_id cannot be empty");
        }

        if self.compound.minimum_withdraw < Decimal::from(MIN_MINIMUM_WITHDRAW) {
            anyhow::bail!(
                "minimum_withdraw must be greater or equal to {} {}",
                MIN_MINIMUM_WITHDRAW,
                self.chain.denom
            );
        }

        if self.compound.keep_unstaked < Decimal::from(MIN_KEEP_UNSTAKED) {
            anyhow::bail!(
                "keep_unstaked must be greater or equal to {} {}",
                MIN_KEEP_UNSTAKED,
                self.chain.denom
            );
        }

        if self.compound.recheck_period_secs == 0
            || self.compound.recheck_period_secs > MAX_RECHECK_PERIOD_SECS
        {
            anyhow::bail!(
                "recheck_period_secs must be between 1 and {}",
                MAX_RECHECK_PERIOD_SECS
            );
        }

        if self.accounts.seeds.is_empty() {
            anyhow::bail!("At least one encrypted seed phrase must be configured");
        }

        if self.accounts.validators.is_empty() && self.accounts.delegators.is_empty() {
            anyhow::bail!("At least one delegator or validator must be specified");
        }

        for validator in &self.accounts.validators {
            if !validator.starts_with(&self.chain.validator_prefix) {
                anyhow::bail!("Invalid validator address: {}", validator);
            }
        }

        for delegator in &self.accounts.delegators {
            if !delegator.starts_with(&self.chain.account_prefix)
                || delegator.starts_with(&self.chain.validator_prefix)
            {
                anyhow::bail!("Invalid delegator address: {}", delegator);
            }
        }

        Ok(())
    }

    /// Get masked configuration for display (hide secrets)
    pub fn masked_display(&self) -> String {
        format!(
            r#"Configuration:
  Node:
    endpoint: {}
    chain_id: {}
    timeout: {}ms
  Chain:
    denom: {}
    target_validator: {}
    gas_unit_cost: {}
  Compound:
    minimum_withdraw: {} {}
    keep_unstaked: {} {}
    recheck_period: {}s
  Accounts:
    validators: {:?}
    delegators: {:?}
    seeds: {} configured (***)
"#,
            self.node.endpoint,
            self.node.chain_id,
            self.node.timeout_ms,
            self.chain.denom,
            self.chain.target_validator,
            self.chain.gas_unit_cost,
            self.compound.minimum_withdraw,
            self.chain.denom,
            self.compound.keep_unstaked,
            self.chain.denom,
            self.compound.recheck_period_secs,
            self.accounts.validators,
            self.accounts.delegators,
            self.accounts.seeds.len(),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            chain: ChainConfig::default(),
            compound: CompoundConfig::default(),
            accounts: AccountsConfig::default(),
        }
    }
}
