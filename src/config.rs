//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (bot tokens, the operator wallet key) are referenced by
//! env-var name in the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub bot: BotConfig,
    pub rpc: RpcConfig,
    pub monitor: MonitorConfig,
    pub operator: OperatorConfig,
    pub alerts: AlertsConfig,
    pub price: PriceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    pub name: String,
    /// Sqlite database path, e.g. "sqlite://solpeer.db?mode=rwc".
    pub database_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RpcConfig {
    /// Solana JSON-RPC endpoint.
    pub url: String,
    /// Signing collaborator endpoint for outbound transfers.
    pub signer_url: String,
    /// Per-request deadline. The monitor runs as a single task, so an
    /// unbounded RPC call would suspend the whole loop.
    pub request_timeout_secs: u64,
    /// How many recent signatures to page per wallet per tick.
    pub signature_page_limit: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    /// Whether copy trading is enabled at startup (default: off, an
    /// operator command turns it on).
    #[serde(default)]
    pub autostart: bool,
    /// Base58 addresses to watch for trades to mirror.
    pub watched_wallets: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OperatorConfig {
    /// Env var holding the operator wallet keypair (never stored in TOML).
    pub wallet_key_env: String,
    /// Operator wallet public address (source of mirrored transfers).
    pub wallet_address: String,
    /// Destination for mirrored transfers. The upstream selection rule is
    /// an open product question; until it is decided this is static config.
    pub mirror_destination: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertsConfig {
    pub telegram_bot_token_env: Option<String>,
    pub telegram_chat_id_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PriceConfig {
    pub coingecko_enabled: bool,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
