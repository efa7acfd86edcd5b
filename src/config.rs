//! Configuration for the pay402 facilitator server.
//!
//! One immutable [`Config`] value is constructed at process start and passed
//! explicitly into the store, validator, and settlement constructors. Business
//! logic never reads the environment; only the serde defaults here do.

use clap::Parser;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use url::Url;

use crate::types::{Address, TokenAmount};

/// CLI arguments for the pay402 facilitator server.
#[derive(Parser, Debug)]
#[command(name = "pay402")]
#[command(about = "pay402 facilitator HTTP server")]
struct CliArgs {
    /// Path to the JSON configuration file
    #[arg(long, short, env = "CONFIG", default_value = "config.json")]
    config: PathBuf,
}

/// The platform revenue-share policy applied to split payments.
///
/// Chosen per deployment: either a percentage of the authorized total or a
/// fixed per-payment fee in minimal currency units.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FeePolicy {
    /// Platform takes `floor(total * percent)`; `percent` is in `[0, 1]`.
    Percent { percent: Decimal },
    /// Platform takes a fixed amount per payment.
    Fixed { amount: TokenAmount },
}

/// Which settlement backend to run, selected once at startup.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum LedgerConfig {
    /// Deterministic simulation, no chain access. For integration testing.
    Simulated,
    /// Sponsored settlement over a Solana RPC endpoint.
    Rpc {
        rpc_url: Url,
        /// Base58-encoded fee-payer keypair. Supports `$ENV_VAR` references.
        signer: String,
    },
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig::Simulated
    }
}

/// Server configuration.
///
/// Fields use serde defaults that fall back to environment variables,
/// then to hardcoded defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "config_defaults::default_port")]
    port: u16,
    #[serde(default = "config_defaults::default_host")]
    host: IpAddr,
    /// Address that collects the platform fee on split payments.
    platform_address: Address,
    #[serde(default = "config_defaults::default_fee")]
    fee: FeePolicy,
    #[serde(default = "config_defaults::default_nonce_ttl_secs")]
    nonce_ttl_secs: u64,
    #[serde(default = "config_defaults::default_sweep_interval_secs")]
    sweep_interval_secs: u64,
    #[serde(default = "config_defaults::default_confirm_timeout_secs")]
    confirm_timeout_secs: u64,
    #[serde(default = "config_defaults::default_database_path")]
    database_path: String,
    #[serde(default)]
    ledger: LedgerConfig,
}

pub mod config_defaults {
    use super::FeePolicy;
    use rust_decimal::Decimal;
    use std::env;
    use std::net::IpAddr;
    use std::str::FromStr;

    pub const DEFAULT_PORT: u16 = 8080;
    pub const DEFAULT_HOST: &str = "0.0.0.0";
    pub const DEFAULT_NONCE_TTL_SECS: u64 = 300;
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
    pub const DEFAULT_CONFIRM_TIMEOUT_SECS: u64 = 30;
    pub const DEFAULT_DATABASE_PATH: &str = "pay402.db";

    /// Returns the default port value with fallback: $PORT env var -> 8080
    pub fn default_port() -> u16 {
        env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the default host value with fallback: $HOST env var -> "0.0.0.0"
    pub fn default_host() -> IpAddr {
        env::var("HOST")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(IpAddr::V4(DEFAULT_HOST.parse().unwrap()))
    }

    pub fn default_fee() -> FeePolicy {
        FeePolicy::Percent {
            percent: Decimal::from_str("0.4").expect("valid decimal"),
        }
    }

    pub fn default_nonce_ttl_secs() -> u64 {
        env::var("NONCE_TTL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_NONCE_TTL_SECS)
    }

    pub fn default_sweep_interval_secs() -> u64 {
        env::var("SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
    }

    pub fn default_confirm_timeout_secs() -> u64 {
        env::var("CONFIRM_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_CONFIRM_TIMEOUT_SECS)
    }

    pub fn default_database_path() -> String {
        env::var("DATABASE_PATH")
            .ok()
            .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {0}: {1}")]
    FileRead(PathBuf, std::io::Error),
    #[error("Failed to parse config file: {0}")]
    JsonParse(#[from] serde_json::Error),
    #[error("Invalid fee policy: {0}")]
    InvalidFee(String),
    #[error("Environment variable {0} referenced by config is not set")]
    MissingEnv(String),
}

impl Config {
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn platform_address(&self) -> Address {
        self.platform_address
    }

    pub fn fee(&self) -> &FeePolicy {
        &self.fee
    }

    /// Validity window for freshly issued nonces.
    pub fn nonce_ttl_secs(&self) -> u64 {
        self.nonce_ttl_secs
    }

    pub fn sweep_interval_secs(&self) -> u64 {
        self.sweep_interval_secs
    }

    /// Upper bound on the ledger confirmation wait during settlement.
    pub fn confirm_timeout_secs(&self) -> u64 {
        self.confirm_timeout_secs
    }

    pub fn database_path(&self) -> &str {
        &self.database_path
    }

    pub fn ledger(&self) -> &LedgerConfig {
        &self.ledger
    }

    /// Load configuration from CLI arguments and JSON file.
    ///
    /// The config file path is determined by the `--config <path>` CLI
    /// argument or the `CONFIG` env var, defaulting to `./config.json`.
    /// Values not present in the config file resolve via environment
    /// variables or defaults during deserialization.
    pub fn load() -> Result<Self, ConfigError> {
        let cli_args = CliArgs::parse();
        let config_path = Path::new(&cli_args.config)
            .canonicalize()
            .map_err(|e| ConfigError::FileRead(cli_args.config, e))?;
        Self::load_from_path(config_path)
    }

    fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(&path).map_err(|e| ConfigError::FileRead(path, e))?;
        Self::from_json(&content)
    }

    /// Parse and validate a JSON configuration document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(content)?;
        config.resolve_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve `$ENV_VAR` references in secret-bearing fields so keys stay
    /// out of config files committed to disk.
    fn resolve_env(&mut self) -> Result<(), ConfigError> {
        if let LedgerConfig::Rpc { signer, .. } = &mut self.ledger
            && let Some(var) = signer.strip_prefix('$')
        {
            let resolved =
                std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string()))?;
            *signer = resolved;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let FeePolicy::Percent { percent } = &self.fee {
            if percent.is_sign_negative() || *percent > Decimal::ONE {
                return Err(ConfigError::InvalidFee(format!(
                    "percent must be within [0, 1], got {percent}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config =
            Config::from_json(r#"{"platform_address": "11111111111111111111111111111112"}"#)
                .unwrap();
        assert_eq!(config.port(), config_defaults::DEFAULT_PORT);
        assert_eq!(
            config.nonce_ttl_secs(),
            config_defaults::DEFAULT_NONCE_TTL_SECS
        );
        assert!(matches!(config.ledger(), LedgerConfig::Simulated));
        assert!(matches!(config.fee(), FeePolicy::Percent { .. }));
    }

    #[test]
    fn test_full_config_parses() {
        let config = Config::from_json(
            r#"{
                "port": 9000,
                "platform_address": "11111111111111111111111111111112",
                "fee": {"type": "fixed", "amount": "2500"},
                "nonce_ttl_secs": 60,
                "ledger": {"mode": "rpc", "rpc_url": "https://api.devnet.solana.com", "signer": "4NMwxzmYj2uvHuq8xoqhY8RXg63KSVJM1DXkpbmkUY7YQWuoyQgFnnzn6yo3CMnqZasnNPNuAT2TLwQsCaKkUddp"}
            }"#,
        )
        .unwrap();
        assert_eq!(config.port(), 9000);
        assert_eq!(config.nonce_ttl_secs(), 60);
        assert!(matches!(config.ledger(), LedgerConfig::Rpc { .. }));
        assert_eq!(
            config.fee(),
            &FeePolicy::Fixed {
                amount: TokenAmount::new(2500)
            }
        );
    }

    #[test]
    fn test_percent_out_of_range_rejected() {
        let result = Config::from_json(
            r#"{
                "platform_address": "11111111111111111111111111111112",
                "fee": {"type": "percent", "percent": "1.5"}
            }"#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidFee(_))));
    }
}
