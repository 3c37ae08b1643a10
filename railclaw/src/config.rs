//! Configuration surface (spec §6)
//!
//! Loaded once at startup from an optional `config/railclaw.toml` (or
//! `RAILCLAW_CONFIG` override) layered under environment variables via the
//! `config` crate, then a `.env` pass for local secrets. Mirrors the
//! teacher's split: typed sub-structs with redacted `Debug` impls for
//! anything secret (`operator::config::EvmConfig` redacts `private_key`
//! the same way).

#![allow(dead_code)]

use eyre::{eyre, Result, WrapErr};
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;

/// Per-chain RPC + token configuration: `rpc.<chain>`, `tokens.<chain>.<symbol>`.
#[derive(Clone, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub tokens: HashMap<String, String>,
    #[serde(default)]
    pub native_symbol: Option<String>,
    #[serde(default = "default_block_time_seconds")]
    pub block_time_seconds: u64,
    #[serde(default = "default_lookback_blocks")]
    pub lookback_blocks: u64,
}

fn default_block_time_seconds() -> u64 {
    2
}

fn default_lookback_blocks() -> u64 {
    1500
}

impl fmt::Debug for ChainConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainConfig")
            .field("rpc_url", &self.rpc_url)
            .field("ws_url", &self.ws_url)
            .field("tokens", &self.tokens)
            .field("native_symbol", &self.native_symbol)
            .finish()
    }
}

/// `bridge.spokePools.<chain>`, `bridge.acrossChainIds.<chain>`, and the
/// fee/deadline knobs shared across every bridge payment.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    pub spoke_pools: HashMap<String, String>,
    pub across_chain_ids: HashMap<String, u64>,
    #[serde(default = "default_relay_fee_pct")]
    pub estimated_relay_fee_pct: f64,
    #[serde(default = "default_min_relay_fee_buffer")]
    pub min_relay_fee_buffer: f64,
    #[serde(default = "default_fill_deadline_offset_sec")]
    pub fill_deadline_offset_sec: u64,
    pub solana_rpc_url: String,
    pub solana_spoke_pool_program: String,
    pub solana_usdc_mint: String,
    pub solana_chain_id: u64,
    #[serde(default = "default_historical_lookback")]
    pub historical_lookback_blocks: u64,
    #[serde(default = "default_resume_lookback")]
    pub resume_lookback_blocks: u64,
}

fn default_relay_fee_pct() -> f64 {
    0.0012
}
fn default_min_relay_fee_buffer() -> f64 {
    0.01
}
fn default_fill_deadline_offset_sec() -> u64 {
    6 * 3600
}
fn default_historical_lookback() -> u64 {
    300
}
fn default_resume_lookback() -> u64 {
    2000
}

#[derive(Clone, Deserialize)]
pub struct EncryptionConfig {
    /// 32-byte AES-256-GCM key, hex-encoded (spec §6 `encryption.walletKey`).
    pub wallet_key: String,
}

impl fmt::Debug for EncryptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionConfig")
            .field("wallet_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub base_url: String,
    #[serde(default = "default_expiry_hours")]
    pub default_expiry_hours: u64,
}

fn default_expiry_hours() -> u64 {
    24
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_required_confirmations")]
    pub required_confirmations: u64,
    #[serde(default = "default_direct_timeout_ms")]
    pub direct_timeout_ms: u64,
    #[serde(default = "default_bridge_timeout_ms")]
    pub bridge_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}
fn default_required_confirmations() -> u64 {
    20
}
fn default_direct_timeout_ms() -> u64 {
    3_600_000
}
fn default_bridge_timeout_ms() -> u64 {
    7_200_000
}

#[derive(Clone, Deserialize)]
pub struct SolConfig {
    /// Hex-encoded 64-byte Ed25519 keypair for the dispenser wallet, if
    /// configured (spec §4.D.2 stage 2: "if a configured dispenser wallet
    /// is present").
    #[serde(default)]
    pub dispenser_key: Option<String>,
    #[serde(default = "default_fund_amount_lamports")]
    pub fund_amount_lamports: u64,
}

fn default_fund_amount_lamports() -> u64 {
    5_000_000
}

impl fmt::Debug for SolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SolConfig")
            .field("dispenser_key", &self.dispenser_key.as_ref().map(|_| "<redacted>"))
            .field("fund_amount_lamports", &self.fund_amount_lamports)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_metrics_listen_addr")]
    pub metrics_listen_addr: String,
}

fn default_api_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}
fn default_metrics_listen_addr() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub data_dir: String,
    pub policy_path: String,
    pub chains: HashMap<String, ChainConfig>,
    pub bridge: BridgeConfig,
    pub encryption: EncryptionConfig,
    pub payment: PaymentConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub sol: SolConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

impl Default for SolConfig {
    fn default() -> Self {
        Self {
            dispenser_key: None,
            fund_amount_lamports: default_fund_amount_lamports(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_api_listen_addr(),
            metrics_listen_addr: default_metrics_listen_addr(),
        }
    }
}

impl Config {
    /// Load layered config: `config/railclaw.toml` (or `RAILCLAW_CONFIG`),
    /// overridden by `RAILCLAW__<SECTION>__<KEY>` environment variables, with
    /// a `.env` pass first for local secrets (mirrors
    /// `operator::config::Config::load`'s `.env`-then-env approach, but
    /// keeps the `config` crate's layered file/env merge for the nested
    /// per-chain tables §6 requires).
    pub fn load() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(?path, "loaded .env file");
        }

        let config_path =
            std::env::var("RAILCLAW_CONFIG").unwrap_or_else(|_| "config/railclaw.toml".to_string());

        let settings = config::Config::builder()
            .add_source(config::File::with_name(&config_path).required(false))
            .add_source(config::Environment::with_prefix("RAILCLAW").separator("__"))
            .build()
            .wrap_err("failed to assemble configuration sources")?;

        let cfg: Config = settings
            .try_deserialize()
            .wrap_err_with(|| format!("failed to parse configuration from {config_path}"))?;

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.chains.is_empty() {
            return Err(eyre!("at least one entry under `chains` is required"));
        }
        let key_bytes = hex::decode(self.encryption.wallet_key.trim_start_matches("0x"))
            .wrap_err("encryption.wallet_key must be hex")?;
        if key_bytes.len() != 32 {
            return Err(eyre!(
                "encryption.wallet_key must decode to 32 bytes, got {}",
                key_bytes.len()
            ));
        }
        Ok(())
    }

    pub fn chain(&self, chain: &str) -> Result<&ChainConfig> {
        self.chains
            .get(chain)
            .ok_or_else(|| eyre!("no rpc configuration for chain {chain:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_monitoring_values() {
        assert_eq!(default_required_confirmations(), 20);
        assert_eq!(default_direct_timeout_ms(), 3_600_000);
        assert_eq!(default_bridge_timeout_ms(), 7_200_000);
    }

    #[test]
    fn test_validate_rejects_empty_chains() {
        let cfg = Config {
            data_dir: "/tmp/railclaw".into(),
            policy_path: "/tmp/policy.yaml".into(),
            chains: HashMap::new(),
            bridge: BridgeConfig {
                spoke_pools: HashMap::new(),
                across_chain_ids: HashMap::new(),
                estimated_relay_fee_pct: default_relay_fee_pct(),
                min_relay_fee_buffer: default_min_relay_fee_buffer(),
                fill_deadline_offset_sec: default_fill_deadline_offset_sec(),
                solana_rpc_url: "http://localhost:8899".into(),
                solana_spoke_pool_program: "11111111111111111111111111111111".into(),
                solana_usdc_mint: "11111111111111111111111111111111".into(),
                solana_chain_id: 1399811149,
                historical_lookback_blocks: default_historical_lookback(),
                resume_lookback_blocks: default_resume_lookback(),
            },
            encryption: EncryptionConfig {
                wallet_key: hex::encode([0u8; 32]),
            },
            payment: PaymentConfig {
                base_url: "https://pay.example.com".into(),
                default_expiry_hours: 24,
            },
            monitoring: MonitoringConfig {
                poll_interval_ms: 30_000,
                required_confirmations: 20,
                direct_timeout_ms: 3_600_000,
                bridge_timeout_ms: 7_200_000,
            },
            sol: SolConfig::default(),
            api: ApiConfig::default(),
        };
        assert!(cfg.validate().is_err());
    }
}
