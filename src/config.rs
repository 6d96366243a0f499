//! Configuration management for the transfer service
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub api: ApiConfig,
    pub chain: ChainConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub wallet: WalletConfig,
    #[serde(default)]
    pub tokens: TokensConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub gas_price_strategy: GasPriceStrategy,
    /// Tip offered on EIP-1559 chains, capped by the user's max gas price
    #[serde(default = "default_priority_fee_gwei")]
    pub priority_fee_gwei: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GasPriceStrategy {
    Legacy,
    Eip1559,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    #[serde(default = "default_relay_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WalletConfig {
    /// Name of the environment variable holding a hex private key
    pub private_key_env: Option<String>,
    /// External signer speaking `eth_signTransaction`
    pub remote_signer_url: Option<String>,
    /// Account the remote signer should sign for
    pub remote_signer_account: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokensConfig {
    pub enabled: bool,
    /// Alchemy-compatible JSON-RPC endpoint (including API key)
    pub api_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub context_attempts: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            context_attempts: 3,
            retry_base_ms: 250,
            retry_max_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyConfig {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
}

impl NotifyConfig {
    /// Bot token and chat id, when both are set
    pub fn telegram(&self) -> Option<(&str, &str)> {
        Some((
            non_empty(&self.telegram_bot_token)?,
            non_empty(&self.telegram_chat_id)?,
        ))
    }
}

// Unset ${VAR} references substitute to empty strings
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub json: bool,
}

fn default_priority_fee_gwei() -> String {
    "2".to_string()
}

fn default_relay_timeout_ms() -> u64 {
    30_000
}

impl Settings {
    /// Load settings from the file named by `GAS_SNOOZE_CONFIG`
    pub fn load() -> Result<Self> {
        let config_path = env::var("GAS_SNOOZE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }

        if self.relay.url.trim().is_empty() {
            anyhow::bail!("Relay URL must be configured");
        }

        if self.pipeline.context_attempts == 0 {
            anyhow::bail!("pipeline.context_attempts must be at least 1");
        }

        if self.wallet.remote_signer_url.is_some() && self.wallet.remote_signer_account.is_none() {
            anyhow::bail!("wallet.remote_signer_account is required with remote_signer_url");
        }

        Ok(())
    }

    /// Settings that load but leave part of the service degraded
    pub fn warnings(&self) -> Vec<&'static str> {
        let mut warnings = Vec::new();

        if self.wallet.private_key_env.is_none() && self.wallet.remote_signer_url.is_none() {
            warnings.push("No signing key or wallet configured - every submission will fail");
        }

        if self.tokens.enabled && self.tokens.api_url.is_none() {
            warnings.push("Token discovery enabled without api_url - native transfers only");
        }

        if self.notify.telegram().is_none()
            && (non_empty(&self.notify.telegram_bot_token).is_some()
                || non_empty(&self.notify.telegram_chat_id).is_some())
        {
            warnings.push("Telegram needs both telegram_bot_token and telegram_chat_id - notifications disabled");
        }

        warnings
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex::Regex =
            regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("valid env var pattern");
    }

    ENV_VAR
        .replace_all(input, |cap: &regex::Captures| {
            env::var(&cap[1]).unwrap_or_default()
        })
        .into_owned()
}
