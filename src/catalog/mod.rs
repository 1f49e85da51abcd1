//! Per-market trading constraints, loaded once at startup.

use crate::exchange::{MarketConstraint, RestClient};
use anyhow::{Context, Result};
use std::collections::HashMap;
use tracing::info;

/// Strip the separator characters the exchange uses in catalog keys so a
/// lookup by bot-internal symbol always succeeds. Idempotent.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.chars().filter(|c| *c != '_').collect()
}

/// Read-only map from normalized market symbol to its trading constraints.
///
/// No trading decision can be made without size limits, so a load failure
/// is fatal to startup.
pub struct MarketCatalog {
    constraints: HashMap<String, MarketConstraint>,
}

impl MarketCatalog {
    /// Fetch and normalize the markets catalog from the gateway.
    pub async fn load(client: &RestClient) -> Result<Self> {
        let raw = client
            .markets()
            .await
            .context("Failed to load market catalog")?;

        let constraints: HashMap<String, MarketConstraint> = raw
            .into_iter()
            .map(|(symbol, constraint)| (normalize_symbol(&symbol), constraint))
            .collect();

        info!(markets = constraints.len(), "market catalog loaded");
        Ok(Self { constraints })
    }

    pub fn constraint(&self, market: &str) -> Option<&MarketConstraint> {
        self.constraints.get(market)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_normalize_strips_separators() {
        assert_eq!(normalize_symbol("eth_usdt"), "ethusdt");
        assert_eq!(normalize_symbol("ethusdt"), "ethusdt");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_symbol("btc_usdt");
        assert_eq!(normalize_symbol(&once), once);
    }

    #[tokio::test]
    async fn test_load_normalizes_catalog_keys() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/data/v1/markets"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(
                r#"{
                    "eth_usdt": {"amountScale":4,"priceScale":2,"minAmount":0.001,"minSize":0.001},
                    "btc_usdt": {"amountScale":4,"priceScale":2,"minAmount":0.0001,"minSize":0.0001}
                }"#,
                "application/json",
            ))
            .mount(&server)
            .await;

        let config = crate::config::Config {
            api_url: server.uri(),
            trade_url: server.uri(),
            kline_url: server.uri(),
            wsapi_url: "wss://unused.example.com".into(),
            interval_secs: 10,
            markets: vec![],
            accounts: vec![],
        };
        let client = RestClient::new(&config).unwrap();
        let catalog = MarketCatalog::load(&client).await.unwrap();

        assert!(catalog.constraint("eth_usdt").is_none());
        let constraint = catalog.constraint("ethusdt").unwrap();
        assert_eq!(constraint.min_amount, dec!(0.001));
    }

    #[tokio::test]
    async fn test_load_fails_when_gateway_unreachable() {
        let config = crate::config::Config {
            api_url: "http://127.0.0.1:1".into(),
            trade_url: "http://127.0.0.1:1".into(),
            kline_url: "http://127.0.0.1:1".into(),
            wsapi_url: "wss://unused.example.com".into(),
            interval_secs: 10,
            markets: vec![],
            accounts: vec![],
        };
        let client = RestClient::new(&config).unwrap();
        assert!(MarketCatalog::load(&client).await.is_err());
    }
}
