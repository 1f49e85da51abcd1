//! REST gateway client.
//!
//! Read-only market data lives under `data/v1/` on the api URL; order
//! operations are signed per account and issued against the trade URL.

use crate::config::Config;
use crate::exchange::traits::AccountGateway;
use crate::exchange::types::{
    decimal_from_json, Account, MarketConstraint, OrderAck, OrderIntent, Side, TickerResponse,
    TickerSnapshot,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

/// HTTP client for the exchange gateway.
pub struct RestClient {
    http: reqwest::Client,
    api_url: String,
    trade_url: String,
}

impl RestClient {
    /// Create a new gateway client from configuration.
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            trade_url: config.trade_url.clone(),
        })
    }

    /// Generate an HMAC-SHA256 signature over a canonical payload.
    pub(crate) fn sign(secret_key: &str, payload: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret_key.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Current timestamp in milliseconds.
    fn timestamp() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_millis() as u64
    }

    fn join(base: &str, path: &str) -> String {
        if base.ends_with('/') {
            format!("{}{}", base, path)
        } else {
            format!("{}/{}", base, path)
        }
    }

    /// Build a signed trade URL for `method` with the given parameters.
    ///
    /// Parameters are sorted by key before signing so the signature is
    /// independent of insertion order.
    fn signed_url(&self, account: &Account, method: &str, mut params: Vec<(String, String)>) -> String {
        params.push(("accesskey".to_string(), account.access_key.clone()));
        params.push(("method".to_string(), method.to_string()));
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let query_string: String = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");

        let signature = Self::sign(&account.secret_key, &query_string);
        format!(
            "{}?{}&sign={}&reqTime={}",
            Self::join(&self.trade_url, method),
            query_string,
            signature,
            Self::timestamp()
        )
    }

    /// Load the per-market constraint catalog.
    ///
    /// Values are parsed through their JSON literals so the exchange's
    /// reported scales survive intact.
    #[instrument(skip(self))]
    pub async fn markets(&self) -> Result<HashMap<String, MarketConstraint>> {
        let url = Self::join(&self.api_url, "data/v1/markets");
        let body: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch markets catalog")?
            .json()
            .await
            .context("Failed to parse markets catalog response")?;

        let entries = body
            .as_object()
            .context("Markets catalog is not a JSON object")?;

        let mut constraints = HashMap::with_capacity(entries.len());
        for (symbol, fields) in entries {
            let field = |name: &str| -> Result<Decimal> {
                fields
                    .get(name)
                    .and_then(decimal_from_json)
                    .with_context(|| format!("Market {} is missing {}", symbol, name))
            };

            constraints.insert(
                symbol.clone(),
                MarketConstraint {
                    min_amount: field("minAmount")?,
                    min_size: field("minSize")?,
                    amount_scale: field("amountScale")?,
                    price_scale: field("priceScale")?,
                },
            );
        }

        Ok(constraints)
    }

    /// Load the market-group catalog (e.g. the `zone` suffix list).
    #[instrument(skip(self))]
    pub async fn group_markets(&self) -> Result<HashMap<String, Vec<String>>> {
        let url = Self::join(&self.api_url, "data/v1/getGroupMarkets");
        self.http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch group markets")?
            .json()
            .await
            .context("Failed to parse group markets response")
    }
}

#[async_trait]
impl AccountGateway for RestClient {
    #[instrument(skip(self))]
    async fn ticker(&self, market: &str) -> Result<TickerSnapshot> {
        let url = format!(
            "{}?market={}",
            Self::join(&self.api_url, "data/v1/ticker"),
            market
        );
        let response: TickerResponse = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch ticker")?
            .json()
            .await
            .context("Failed to parse ticker response")?;

        Ok(response.ticker)
    }

    #[instrument(skip(self))]
    async fn depth_prices(&self, market: &str, size: u32) -> Result<Vec<Decimal>> {
        let url = format!(
            "{}?market={}&size={}",
            Self::join(&self.api_url, "data/v1/depth"),
            market,
            size
        );
        let body: serde_json::Value = self
            .http
            .get(&url)
            .send()
            .await
            .context("Failed to fetch depth")?
            .json()
            .await
            .context("Failed to parse depth response")?;

        let mut prices = Vec::new();
        for book in ["asks", "bids"] {
            let levels = body
                .get(book)
                .and_then(|v| v.as_array())
                .with_context(|| format!("Depth response is missing {}", book))?;
            for level in levels {
                let price = level
                    .get(0)
                    .and_then(decimal_from_json)
                    .context("Depth level has no price")?;
                prices.push(price);
            }
        }

        Ok(prices)
    }

    #[instrument(skip(self, account), fields(account = %account.name))]
    async fn place_order(&self, account: &Account, intent: &OrderIntent) -> Result<OrderAck> {
        let params = vec![
            ("currency".to_string(), intent.market.clone()),
            ("price".to_string(), intent.price.to_string()),
            ("amount".to_string(), intent.quantity.to_string()),
            ("tradeType".to_string(), intent.side.code().to_string()),
        ];
        let url = self.signed_url(account, "order", params);

        debug!(market = %intent.market, side = %intent.side, "Placing order");

        self.http
            .get(&url)
            .send()
            .await
            .context("Failed to place order")?
            .json()
            .await
            .context("Failed to parse order response")
    }

    #[instrument(skip(self, account, levels), fields(account = %account.name))]
    async fn batch_order(
        &self,
        account: &Account,
        market: &str,
        side: Side,
        levels: &[(Decimal, Decimal)],
    ) -> Result<OrderAck> {
        let trade_params = serde_json::to_string(
            &levels
                .iter()
                .map(|(price, qty)| vec![price.to_string(), qty.to_string()])
                .collect::<Vec<_>>(),
        )
        .context("Failed to encode batch levels")?;

        let params = vec![
            ("currency".to_string(), market.to_string()),
            ("tradeType".to_string(), side.code().to_string()),
            ("tradeParams".to_string(), trade_params),
        ];
        let url = self.signed_url(account, "orderMoreV2", params);

        self.http
            .get(&url)
            .send()
            .await
            .context("Failed to place batch order")?
            .json()
            .await
            .context("Failed to parse batch order response")
    }

    #[instrument(skip(self, account), fields(account = %account.name))]
    async fn cancel_all_orders(&self, account: &Account, market: &str) -> Result<OrderAck> {
        let params = vec![("currency".to_string(), market.to_string())];
        let url = self.signed_url(account, "cancelAllOrders", params);

        self.http
            .get(&url)
            .send()
            .await
            .context("Failed to cancel orders")?
            .json()
            .await
            .context("Failed to parse cancel response")
    }
}
