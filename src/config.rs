// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup. Invalid
//! values fail startup rather than falling back silently.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `DATA_DIR` | Directory for the embedded ledger database | `/data` |
//! | `TRON_RPC_URL` | TRON HTTP API base URL | `https://api.trongrid.io` |
//! | `TRON_API_KEY` | TronGrid API key header value | unset |
//! | `USDT_CONTRACT` | TRC-20 token contract address | mainnet USDT |
//! | `ENCRYPTION_SECRET` | Key-vault secret (hex, base64, or passphrase) | required |
//! | `PLATFORM_PRIVATE_KEY` | Hex platform signing key | required |
//! | `DEPOSIT_SCAN_INTERVAL_SECS` | Deposit scan period | `30` |
//! | `REQUIRED_CONFIRMATIONS` | Confirmation depth before crediting | `1` |
//! | `MIN_DEPOSIT` | Minimum credited deposit (token base units) | `1000000` |
//! | `WITHDRAW_POLL_INTERVAL_SECS` | Withdrawal worker period | `20` |
//! | `WITHDRAW_BATCH_SIZE` | Max queued withdrawals claimed per cycle | `5` |
//! | `WITHDRAW_FEE_RESERVE` | Request-time fee reserve (token base units) | `1000000` |
//! | `WITHDRAW_STALE_AFTER_SECS` | Reaper staleness threshold | `900` |
//! | `SWEEP_ENABLED` | Enable the consolidation sweeper | `false` |
//! | `SWEEP_INTERVAL_SECS` | Sweep period | `90` |
//! | `MIN_SWEEP_AMOUNT` | Minimum swept balance (token base units) | `10000000` |
//! | `GAS_TOPUP_THRESHOLD_SUN` | Native balance floor before top-up | `30000000` |
//! | `GAS_TOPUP_AMOUNT_SUN` | Native top-up amount (sun) | `30000000` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info` |

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// TRC-20 USDT contract on TRON mainnet.
pub const MAINNET_USDT_CONTRACT: &str = "TR7NHqjeKQxGTCi8q8ZY4pL8otSzgjLj6t";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

/// Fully resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,

    pub rpc_url: url::Url,
    pub api_key: Option<String>,
    pub token_contract: String,

    pub encryption_secret: String,
    pub platform_private_key: String,

    pub deposit_scan_interval: Duration,
    pub required_confirmations: u64,
    pub min_deposit: u64,

    pub withdraw_poll_interval: Duration,
    pub withdraw_batch_size: usize,
    /// Request-time fee reserve, consumed by `CustodyService::new`. The
    /// daemon itself runs only the pipelines; the embedding caller (the
    /// web layer) constructs the facade and passes this through.
    pub withdraw_fee_reserve: u64,
    pub withdraw_stale_after: Duration,

    pub sweep_enabled: bool,
    pub sweep_interval: Duration,
    pub min_sweep_amount: u64,
    pub gas_topup_threshold: u64,
    pub gas_topup_amount: u64,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let rpc_raw =
            env::var("TRON_RPC_URL").unwrap_or_else(|_| "https://api.trongrid.io".to_string());
        let rpc_url = rpc_raw.parse::<url::Url>().map_err(|_| ConfigError::Invalid {
            var: "TRON_RPC_URL",
            value: rpc_raw.clone(),
        })?;

        Ok(Self {
            data_dir: env::var("DATA_DIR").unwrap_or_else(|_| "/data".to_string()).into(),
            rpc_url,
            api_key: env::var("TRON_API_KEY").ok().filter(|v| !v.is_empty()),
            token_contract: env::var("USDT_CONTRACT")
                .unwrap_or_else(|_| MAINNET_USDT_CONTRACT.to_string()),
            encryption_secret: require("ENCRYPTION_SECRET")?,
            platform_private_key: require("PLATFORM_PRIVATE_KEY")?,
            deposit_scan_interval: Duration::from_secs(parse_var(
                "DEPOSIT_SCAN_INTERVAL_SECS",
                30,
            )?),
            required_confirmations: parse_var("REQUIRED_CONFIRMATIONS", 1)?,
            min_deposit: parse_var("MIN_DEPOSIT", 1_000_000)?,
            withdraw_poll_interval: Duration::from_secs(parse_var(
                "WITHDRAW_POLL_INTERVAL_SECS",
                20,
            )?),
            withdraw_batch_size: parse_var("WITHDRAW_BATCH_SIZE", 5usize)?,
            withdraw_fee_reserve: parse_var("WITHDRAW_FEE_RESERVE", 1_000_000)?,
            withdraw_stale_after: Duration::from_secs(parse_var(
                "WITHDRAW_STALE_AFTER_SECS",
                900,
            )?),
            sweep_enabled: parse_bool("SWEEP_ENABLED", false)?,
            sweep_interval: Duration::from_secs(parse_var("SWEEP_INTERVAL_SECS", 90)?),
            min_sweep_amount: parse_var("MIN_SWEEP_AMOUNT", 10_000_000)?,
            gas_topup_threshold: parse_var("GAS_TOPUP_THRESHOLD_SUN", 30_000_000)?,
            gas_topup_amount: parse_var("GAS_TOPUP_AMOUNT_SUN", 30_000_000)?,
        })
    }
}

fn require(var: &'static str) -> Result<String, ConfigError> {
    match env::var(var) {
        Ok(v) if !v.is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parse_var<T: std::str::FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
        Err(_) => Ok(default),
    }
}

fn parse_bool(var: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(var) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::Invalid { var, value: raw }),
        },
        Err(_) => Ok(default),
    }
}
