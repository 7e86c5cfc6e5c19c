//! Configuration management for the cross-chain router
//!
//! Loads configuration from TOML files with environment variable substitution.

use crate::chain::value::{FeeRule, SwapLimits};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub router: RouterConfig,
    pub database: DatabaseConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    pub mpc: MpcConfig,
    pub chains: HashMap<String, ChainConfig>,
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,
    #[serde(default)]
    pub swap_configs: HashMap<String, SwapConfig>,
    #[serde(default)]
    pub fee_configs: HashMap<String, FeeConfig>,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    pub reload: Option<ReloadConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouterConfig {
    /// Identifier written into every payout, distinguishes router deployments
    pub identifier: String,
    pub instance_id: String,
    /// Server nodes initiate signing; oracle nodes only accept
    pub is_server: bool,
    #[serde(default)]
    pub sign_with_private_key: bool,
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub health_check_interval_secs: u64,
    #[serde(default = "default_max_tx_not_found_secs")]
    pub max_tx_not_found_secs: u64,
    #[serde(default = "default_scan_window_secs")]
    pub scan_window_secs: u64,
    #[serde(default = "default_nonce_recycle_ack_secs")]
    pub nonce_recycle_ack_secs: u64,
    #[serde(default = "default_nonce_passed_wait_secs")]
    pub nonce_passed_wait_secs: u64,
    #[serde(default)]
    pub log_json: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Addresses allowed to sign `/admin` requests; empty refuses them all
    #[serde(default)]
    pub admin_accounts: Vec<String>,
    #[serde(default = "default_admin_signature_ttl_secs")]
    pub admin_signature_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpcConfig {
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,
    pub group_id: String,
    pub needed_oracles: u32,
    pub total_oracles: u32,
    #[serde(default)]
    pub mode: u32,
    #[serde(default = "default_sign_status_retry_count")]
    pub sign_status_retry_count: u32,
    #[serde(default = "default_sign_status_interval_secs")]
    pub sign_status_interval_secs: u64,
    #[serde(default = "default_liveness_interval_secs")]
    pub liveness_interval_secs: u64,
    #[serde(default = "default_initiator_backoff_secs")]
    pub initiator_backoff_secs: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    /// Signer addresses allowed to initiate sign requests this node accepts
    #[serde(default)]
    pub initiators: Vec<String>,
    #[serde(default = "default_accept_interval_secs")]
    pub accept_interval_secs: u64,
    /// Pending sign requests older than this are no longer listed
    #[serde(default = "default_max_accept_sign_interval_secs")]
    pub max_accept_sign_interval_secs: i64,
    pub default_node: MpcNodeConfig,
    #[serde(default)]
    pub other_nodes: Vec<MpcNodeConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MpcNodeConfig {
    pub rpc_address: String,
    pub sign_groups: Vec<String>,
    pub keystore_file: Option<String>,
    pub password_file: Option<String>,
    pub private_key_env: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub router_contract: String,
    pub router_mpc: String,
    #[serde(default)]
    pub router_mpc_pubkey: String,
    pub confirmations: u64,
    #[serde(default)]
    pub initial_height: u64,
    pub gas_price_strategy: GasPriceStrategy,
    pub max_gas_price_gwei: u64,
    #[serde(default)]
    pub plus_gas_price_percent: u64,
    #[serde(default = "default_gas_limit")]
    pub default_gas_limit: u64,
    /// Env var holding a private key for direct signing (test and ops path)
    pub private_key_env: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
    Arbitrum,
    Optimism,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token_id: String,
    pub chain_id: u64,
    pub address: String,
    pub decimals: u8,
    pub underlying: Option<String>,
    pub router_contract: Option<String>,
}

/// Swap bounds for a token id, with 18 decimals
#[derive(Debug, Clone, Deserialize)]
pub struct SwapConfig {
    pub maximum_swap: String,
    pub minimum_swap: String,
    pub big_value_threshold: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub swap_fee_rate_per_million: u64,
    pub maximum_swap_fee: String,
    pub minimum_swap_fee: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlacklistConfig {
    #[serde(default)]
    pub chain_ids: Vec<u64>,
    #[serde(default)]
    pub token_ids: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReloadConfig {
    pub config_chain_id: u64,
    pub config_contract: String,
    pub reload_cycle_secs: u64,
    pub poll_interval_secs: u64,
}

fn default_admin_signature_ttl_secs() -> u64 {
    300
}

fn default_max_tx_not_found_secs() -> u64 {
    7200
}

fn default_scan_window_secs() -> u64 {
    7 * 24 * 3600
}

fn default_nonce_recycle_ack_secs() -> u64 {
    300
}

fn default_nonce_passed_wait_secs() -> u64 {
    600
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_api_prefix() -> String {
    "smpc_".to_string()
}

fn default_rpc_timeout_secs() -> u64 {
    10
}

fn default_sign_status_retry_count() -> u32 {
    70
}

fn default_sign_status_interval_secs() -> u64 {
    10
}

fn default_liveness_interval_secs() -> u64 {
    10
}

fn default_initiator_backoff_secs() -> u64 {
    60
}

fn default_ping_count() -> u32 {
    3
}

fn default_accept_interval_secs() -> u64 {
    20
}

fn default_max_accept_sign_interval_secs() -> i64 {
    600
}

fn default_gas_limit() -> u64 {
    300_000
}

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

impl Settings {
    /// Load settings from the file named by `ROUTER_CONFIG`
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Config file path from `ROUTER_CONFIG`, `config/default.toml` otherwise
    pub fn config_path() -> PathBuf {
        env::var("ROUTER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"))
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.enabled_chains().is_empty() {
            anyhow::bail!("At least one chain must be enabled");
        }

        for (name, chain) in &self.chains {
            if chain.enabled {
                if chain.rpc_urls.is_empty() {
                    anyhow::bail!("Chain {} has no RPC URLs configured", name);
                }
                if chain.router_contract.is_empty() {
                    anyhow::bail!("Chain {} has no router contract", name);
                }
                if chain.router_mpc_pubkey.is_empty() && !self.router.sign_with_private_key {
                    tracing::warn!("Chain {} has no router mpc public key", name);
                }
            }
        }

        for account in &self.api.admin_accounts {
            if account.parse::<ethers::types::Address>().is_err() {
                anyhow::bail!("Invalid admin account {}", account);
            }
        }
        if self.api.admin_accounts.is_empty() {
            tracing::warn!("No admin accounts configured, admin API is disabled");
        }

        if self.database.backend == StoreBackend::Postgres && self.database.url.is_empty() {
            anyhow::bail!("Postgres backend requires database.url");
        }

        let mpc = &self.mpc;
        if mpc.needed_oracles == 0 || mpc.needed_oracles > mpc.total_oracles {
            anyhow::bail!(
                "Invalid mpc threshold {}/{}",
                mpc.needed_oracles,
                mpc.total_oracles
            );
        }

        for (token_id, swap_config) in &self.swap_configs {
            if let Err(e) = SwapLimits::try_from(swap_config) {
                anyhow::bail!("Swap config {}: {}", token_id, e);
            }
        }
        for (token_id, fee_config) in &self.fee_configs {
            if let Err(e) = FeeRule::try_from(fee_config) {
                anyhow::bail!("Fee config {}: {}", token_id, e);
            }
        }

        for token in &self.tokens {
            if self.get_chain_by_id(token.chain_id).is_none() {
                anyhow::bail!(
                    "Token {} references unknown chain {}",
                    token.token_id,
                    token.chain_id
                );
            }
        }

        Ok(())
    }

    /// Get list of enabled chains
    pub fn enabled_chains(&self) -> Vec<(&String, &ChainConfig)> {
        self.chains.iter().filter(|(_, c)| c.enabled).collect()
    }

    /// Get chain config by chain ID
    pub fn get_chain_by_id(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.chains.values().find(|c| c.chain_id == chain_id)
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    ENV_VAR_PATTERN
        .replace_all(input, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}
