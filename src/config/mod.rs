//! Configuration management for the autotrader.
//!
//! Loads settings from a config file and environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration.
///
/// Loaded once at startup and passed by reference into each component;
/// immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL for read-only market data queries
    #[serde(default)]
    pub api_url: String,
    /// Base URL for signed trade operations
    #[serde(default)]
    pub trade_url: String,
    /// Base URL for kline queries
    #[serde(default)]
    pub kline_url: String,
    /// Websocket endpoint for event subscriptions
    #[serde(default)]
    pub wsapi_url: String,
    /// Seconds between order placement ticks
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Markets to trade, in bot-internal symbol form (e.g. "ethusdt")
    #[serde(default)]
    pub markets: Vec<String>,
    /// Accounts that place orders
    #[serde(default)]
    pub accounts: Vec<AccountCredentials>,
}

/// Credentials for one trading account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountCredentials {
    pub name: String,
    #[serde(default)]
    pub access_key: String,
    #[serde(default)]
    pub secret_key: String,
}

fn default_interval_secs() -> u64 {
    10
}

impl Config {
    /// Load configuration from the `config` file and environment variables.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(false))
            .add_source(config::Environment::default().separator("__").prefix("AUTOTRADER"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Scheduling interval as a [`Duration`].
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(!self.api_url.is_empty(), "api_url must be set");
        anyhow::ensure!(!self.trade_url.is_empty(), "trade_url must be set");
        anyhow::ensure!(!self.wsapi_url.is_empty(), "wsapi_url must be set");
        anyhow::ensure!(self.interval_secs > 0, "interval_secs must be positive");
        anyhow::ensure!(!self.markets.is_empty(), "at least one market must be configured");
        anyhow::ensure!(
            !self.accounts.is_empty(),
            "at least one account must be configured"
        );

        for account in &self.accounts {
            anyhow::ensure!(
                !account.name.is_empty(),
                "every account needs a non-empty name"
            );
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            trade_url: String::new(),
            kline_url: String::new(),
            wsapi_url: String::new(),
            interval_secs: default_interval_secs(),
            markets: Vec::new(),
            accounts: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populated() -> Config {
        Config {
            api_url: "https://gateway.example.com/".into(),
            trade_url: "https://trade.example.com/".into(),
            kline_url: "https://kline.example.com/".into(),
            wsapi_url: "wss://gateway.example.com/websocket".into(),
            interval_secs: 10,
            markets: vec!["ethusdt".into()],
            accounts: vec![AccountCredentials {
                name: "maker1".into(),
                access_key: "ak".into(),
                secret_key: "sk".into(),
            }],
        }
    }

    #[test]
    fn test_populated_config_is_valid() {
        assert!(populated().validate().is_ok());
    }

    #[test]
    fn test_default_config_is_rejected() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_empty_accounts_rejected() {
        let mut config = populated();
        config.accounts.clear();
        assert!(config.validate().is_err());
    }
}
