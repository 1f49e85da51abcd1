//! Websocket event pipeline.
//!
//! One signed connection per account carries fill notifications; a shared
//! set of unsigned connections (deduplicated by endpoint) carries quick
//! depth updates. Every inbound frame is decoded through a tagged
//! `dataType` dispatch before any type-specific field is touched.

use crate::exchange::client::RestClient;
use crate::exchange::types::{decimal_from_json, Account, FillRecord, Side};
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

pub const EVENT_ADD_CHANNEL: &str = "addChannel";
pub const CHANNEL_INCR_RECORD: &str = "push_user_incr_record";

/// Bound on each account's fill queue; a full queue stalls frame dispatch
/// on that connection until the coordinator drains it.
pub const FILL_QUEUE_CAPACITY: usize = 10;

const PING_INTERVAL: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Last-write-wins current price written by the quick-depth frame path.
///
/// Readers may observe zero before the first depth frame arrives; reads and
/// writes are atomic at value granularity, with no freshness bound.
#[derive(Clone, Default)]
pub struct CurrentPrice {
    inner: Arc<RwLock<Decimal>>,
}

impl CurrentPrice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Decimal {
        *self.inner.read().expect("price lock poisoned")
    }

    pub fn set(&self, price: Decimal) {
        *self.inner.write().expect("price lock poisoned") = price;
    }
}

/// Channel subscription request frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeRequest {
    pub event: &'static str,
    pub channel: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign: Option<String>,
}

impl SubscribeRequest {
    /// Unsigned subscription to a market-wide channel.
    pub fn market_channel(channel: String) -> Self {
        Self {
            event: EVENT_ADD_CHANNEL,
            channel,
            access_key: None,
            market: None,
            sign: None,
        }
    }

    /// Account-scoped subscription, to be signed before sending.
    pub fn account_channel(channel: &str, access_key: &str, market: &str) -> Self {
        Self {
            event: EVENT_ADD_CHANNEL,
            channel: channel.to_string(),
            access_key: Some(access_key.to_string()),
            market: Some(market.to_string()),
            sign: None,
        }
    }

    /// Attach the HMAC signature over the canonical unsigned payload.
    pub fn signed(mut self, secret_key: &str) -> Self {
        let canonical = serde_json::to_string(&self).expect("subscribe request serializes");
        self.sign = Some(RestClient::sign(secret_key, &canonical));
        self
    }
}

/// Decode failure for an inbound event frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("frame is not a JSON object")]
    NotObject,
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame has no dataType discriminator")]
    MissingDataType,
    #[error("malformed {data_type} frame: missing or invalid {field}")]
    Field {
        data_type: &'static str,
        field: &'static str,
    },
}

/// A decoded inbound event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFrame {
    /// Lightweight market price update.
    QuickDepth { current_price: Decimal },
    /// Incremental fill notification for one of the account's orders.
    UserRecord(FillRecord),
    /// Recognized shape, unrecognized message class; dropped by the caller.
    Unknown { data_type: String },
}

/// Decode one frame payload, validating the discriminator before any
/// type-specific field is interpreted.
pub fn decode_frame(payload: &str) -> Result<EventFrame, FrameError> {
    let trimmed = payload.trim();
    if !trimmed.starts_with('{') || !trimmed.ends_with('}') {
        return Err(FrameError::NotObject);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed)?;
    let object = value.as_object().ok_or(FrameError::NotObject)?;
    let data_type = object
        .get("dataType")
        .and_then(|v| v.as_str())
        .ok_or(FrameError::MissingDataType)?;

    match data_type {
        "quickDepth" => {
            let current_price = object
                .get("currentPrice")
                .and_then(decimal_from_json)
                .ok_or(FrameError::Field {
                    data_type: "quickDepth",
                    field: "currentPrice",
                })?;
            Ok(EventFrame::QuickDepth { current_price })
        }
        "userIncrRecord" => Ok(EventFrame::UserRecord(decode_fill_record(object)?)),
        other => Ok(EventFrame::Unknown {
            data_type: other.to_string(),
        }),
    }
}

/// Decode the positional `record` tuple of a `userIncrRecord` frame:
/// `[entrustId, unitPrice, totalQty, filledQty, _, sideCode]`.
fn decode_fill_record(
    object: &serde_json::Map<String, serde_json::Value>,
) -> Result<FillRecord, FrameError> {
    let field = |field: &'static str| FrameError::Field {
        data_type: "userIncrRecord",
        field,
    };

    let record = object
        .get("record")
        .and_then(|v| v.as_array())
        .ok_or_else(|| field("record"))?;

    let entrust_id = record
        .get(0)
        .and_then(|v| v.as_str())
        .ok_or_else(|| field("entrustId"))?
        .to_string();
    let unit_price = record
        .get(1)
        .and_then(decimal_from_json)
        .ok_or_else(|| field("unitPrice"))?;
    let total_qty = record
        .get(2)
        .and_then(decimal_from_json)
        .ok_or_else(|| field("totalQty"))?;
    let filled_qty = record
        .get(3)
        .and_then(decimal_from_json)
        .ok_or_else(|| field("filledQty"))?;

    let side_code = record
        .get(5)
        .and_then(|v| v.as_i64().or_else(|| v.as_str()?.parse().ok()))
        .ok_or_else(|| field("sideCode"))?;
    let side = Side::from_code(side_code).ok_or_else(|| field("sideCode"))?;

    let market = object
        .get("market")
        .and_then(|v| v.as_str())
        .ok_or_else(|| field("market"))?;
    // The gateway appends an internal "default" suffix to the market name.
    let market = market.strip_suffix("default").unwrap_or(market).to_string();

    Ok(FillRecord {
        entrust_id,
        unit_price,
        total_qty,
        filled_qty,
        side,
        market,
    })
}

/// Strip the market's zone suffix, if it carries one.
pub fn strip_zone_suffix<'a>(market: &'a str, zones: &[String]) -> &'a str {
    let mut sorted: Vec<&String> = zones.iter().collect();
    sorted.sort_by_key(|z| std::cmp::Reverse(z.len()));
    for zone in sorted {
        if zone.is_empty() {
            continue;
        }
        if let Some(stripped) = market.strip_suffix(zone.as_str()) {
            return stripped;
        }
    }
    market
}

/// Map each configured market to its quick-depth endpoint, deduplicated so
/// markets sharing an endpoint reuse one connection.
pub fn quick_depth_endpoints(
    wsapi_url: &str,
    markets: &[String],
    zones: &[String],
) -> HashMap<String, Vec<String>> {
    let base = if wsapi_url.ends_with('/') {
        wsapi_url.to_string()
    } else {
        format!("{}/", wsapi_url)
    };

    let mut endpoints: HashMap<String, Vec<String>> = HashMap::new();
    for market in markets {
        let url = format!("{}{}", base, strip_zone_suffix(market, zones));
        endpoints.entry(url).or_default().push(market.clone());
    }
    endpoints
}

/// Where decoded frames go: price cache writes plus, on account streams,
/// the account's bounded fill queue.
struct FrameSink {
    endpoint: String,
    cache: CurrentPrice,
    fills: Option<mpsc::Sender<FillRecord>>,
}

impl FrameSink {
    /// Dispatch one payload. Returns false when the connection should stop
    /// (the fill consumer is gone).
    async fn dispatch(&self, payload: &str) -> bool {
        match decode_frame(payload) {
            Ok(EventFrame::QuickDepth { current_price }) => {
                trace!(endpoint = %self.endpoint, price = %current_price, "quick depth update");
                self.cache.set(current_price);
            }
            Ok(EventFrame::UserRecord(record)) => match &self.fills {
                Some(fills) => {
                    // Blocks when the queue is full; this intentionally
                    // stalls all further frames on this connection until
                    // the coordinator drains.
                    if fills.send(record).await.is_err() {
                        warn!(endpoint = %self.endpoint, "fill consumer gone, closing stream");
                        return false;
                    }
                }
                None => {
                    warn!(endpoint = %self.endpoint, "fill record on market-wide stream, dropping")
                }
            },
            Ok(EventFrame::Unknown { data_type }) => {
                warn!(endpoint = %self.endpoint, %data_type, "unhandled message type");
            }
            Err(e) => {
                warn!(endpoint = %self.endpoint, error = %e, "dropping malformed frame");
            }
        }
        true
    }
}

/// Read loop for one established connection: keepalive pings, frame
/// dispatch, cooperative shutdown.
async fn run_connection(mut stream: WsStream, sink: FrameSink, mut shutdown: watch::Receiver<bool>) {
    let mut keepalive = tokio::time::interval(PING_INTERVAL);
    keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    keepalive.reset();

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                info!(endpoint = %sink.endpoint, "event stream stopping");
                let _ = stream.close(None).await;
                return;
            }
            _ = keepalive.tick() => {
                if let Err(e) = stream.send(Message::Text("ping".into())).await {
                    error!(endpoint = %sink.endpoint, error = %e, "keepalive failed, closing stream");
                    return;
                }
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if !sink.dispatch(text.as_str()).await {
                        return;
                    }
                }
                Some(Ok(Message::Ping(_))) => {
                    debug!(endpoint = %sink.endpoint, "ping received");
                }
                Some(Ok(Message::Close(_))) => {
                    info!(endpoint = %sink.endpoint, "stream closed by server");
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(endpoint = %sink.endpoint, error = %e, "stream error");
                    return;
                }
                None => {
                    info!(endpoint = %sink.endpoint, "stream ended");
                    return;
                }
            }
        }
    }
}

/// Maintains the bot's websocket subscriptions and demultiplexes inbound
/// frames into the price cache and per-account fill queues.
pub struct TradeEventListener {
    wsapi_url: String,
    cache: CurrentPrice,
}

impl TradeEventListener {
    pub fn new(wsapi_url: String, cache: CurrentPrice) -> Self {
        Self { wsapi_url, cache }
    }

    /// Open one signed fill-notification stream for `account` covering all
    /// configured markets. Connection or subscription failure here is fatal
    /// to startup; the returned task only logs per-frame failures.
    pub async fn spawn_account_stream(
        &self,
        account: &Account,
        markets: &[String],
        fills: mpsc::Sender<FillRecord>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<JoinHandle<()>> {
        let (mut stream, _) = connect_async(self.wsapi_url.as_str())
            .await
            .with_context(|| format!("Failed to connect event stream for {}", account.name))?;

        for market in markets {
            let request =
                SubscribeRequest::account_channel(CHANNEL_INCR_RECORD, &account.access_key, market)
                    .signed(&account.secret_key);
            let payload = serde_json::to_string(&request).expect("subscribe request serializes");
            stream
                .send(Message::Text(payload.into()))
                .await
                .with_context(|| {
                    format!("Failed to subscribe {} records for {}", market, account.name)
                })?;
        }

        info!(account = %account.name, markets = markets.len(), "subscribed to fill notifications");

        let sink = FrameSink {
            endpoint: format!("{}*{}", account.name, self.wsapi_url),
            cache: self.cache.clone(),
            fills: Some(fills),
        };
        Ok(tokio::spawn(run_connection(stream, sink, shutdown)))
    }

    /// Open the quick-depth streams for the configured markets, reusing one
    /// connection per distinct endpoint. Fatal on any connection or
    /// subscription failure.
    pub async fn spawn_quick_depth(
        &self,
        markets: &[String],
        zones: &[String],
        shutdown: watch::Receiver<bool>,
    ) -> Result<Vec<JoinHandle<()>>> {
        let endpoints = quick_depth_endpoints(&self.wsapi_url, markets, zones);
        let mut handles = Vec::with_capacity(endpoints.len());

        for (url, endpoint_markets) in endpoints {
            let (mut stream, _) = connect_async(url.as_str())
                .await
                .with_context(|| format!("Failed to connect quick depth stream {}", url))?;

            for market in &endpoint_markets {
                let request = SubscribeRequest::market_channel(format!("{}_quick_depth", market));
                let payload =
                    serde_json::to_string(&request).expect("subscribe request serializes");
                stream
                    .send(Message::Text(payload.into()))
                    .await
                    .with_context(|| format!("Failed to subscribe quick depth for {}", market))?;
            }

            debug!(endpoint = %url, markets = endpoint_markets.len(), "quick depth subscribed");

            let sink = FrameSink {
                endpoint: url,
                cache: self.cache.clone(),
                fills: None,
            };
            handles.push(tokio::spawn(run_connection(stream, sink, shutdown.clone())));
        }

        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use tokio_test::{assert_pending, assert_ready};

    fn record() -> FillRecord {
        FillRecord {
            entrust_id: "20240101".into(),
            unit_price: dec!(100.2),
            total_qty: dec!(5),
            filled_qty: dec!(5),
            side: Side::Buy,
            market: "ethusdt".into(),
        }
    }

    #[test]
    fn test_decode_quick_depth() {
        let frame = decode_frame(r#"{"dataType":"quickDepth","currentPrice":100.25}"#).unwrap();
        assert_eq!(
            frame,
            EventFrame::QuickDepth {
                current_price: dec!(100.25)
            }
        );
    }

    #[test]
    fn test_decode_user_record_strips_default_suffix() {
        let payload = r#"{
            "dataType": "userIncrRecord",
            "market": "ethusdtdefault",
            "record": ["20240101", 100.2, 5, 2, 0, 1]
        }"#;
        let frame = decode_frame(payload).unwrap();
        let EventFrame::UserRecord(record) = frame else {
            panic!("expected a fill record");
        };
        assert_eq!(record.entrust_id, "20240101");
        assert_eq!(record.unit_price, dec!(100.2));
        assert_eq!(record.total_qty, dec!(5));
        assert_eq!(record.filled_qty, dec!(2));
        assert_eq!(record.side, Side::Buy);
        assert_eq!(record.market, "ethusdt");
    }

    #[test]
    fn test_decode_unknown_data_type_is_not_an_error() {
        let frame = decode_frame(r#"{"dataType":"marketStatus","open":true}"#).unwrap();
        assert_eq!(
            frame,
            EventFrame::Unknown {
                data_type: "marketStatus".into()
            }
        );
    }

    #[test]
    fn test_decode_rejects_non_object_payloads() {
        assert!(matches!(
            decode_frame("[1,2,3]"),
            Err(FrameError::NotObject)
        ));
        assert!(matches!(decode_frame("pong"), Err(FrameError::NotObject)));
        assert!(matches!(
            decode_frame("{not json}"),
            Err(FrameError::Json(_))
        ));
    }

    #[test]
    fn test_decode_rejects_missing_discriminator() {
        assert!(matches!(
            decode_frame(r#"{"currentPrice":100.25}"#),
            Err(FrameError::MissingDataType)
        ));
    }

    #[test]
    fn test_decode_rejects_malformed_record_tuple() {
        let payload = r#"{"dataType":"userIncrRecord","market":"ethusdt","record":["id",100.2]}"#;
        assert!(matches!(
            decode_frame(payload),
            Err(FrameError::Field {
                data_type: "userIncrRecord",
                ..
            })
        ));
    }

    #[test]
    fn test_current_price_cache_last_write_wins() {
        let cache = CurrentPrice::new();
        assert_eq!(cache.get(), Decimal::ZERO);
        cache.set(dec!(100.1));
        cache.set(dec!(100.3));
        assert_eq!(cache.get(), dec!(100.3));
    }

    #[test]
    fn test_signed_subscribe_request_carries_signature() {
        let request = SubscribeRequest::account_channel(CHANNEL_INCR_RECORD, "ak", "ethusdt")
            .signed("secret");
        assert!(request.sign.is_some());
        let payload = serde_json::to_string(&request).unwrap();
        assert!(payload.contains(r#""accessKey":"ak""#));
        assert!(payload.contains(r#""sign":"#));
    }

    #[test]
    fn test_quick_depth_endpoints_dedup_by_url() {
        let zones = vec!["usdt".to_string(), "zb".to_string()];
        let markets = vec![
            "ethusdt".to_string(),
            "ethzb".to_string(),
            "btcusdt".to_string(),
        ];
        let endpoints = quick_depth_endpoints("wss://ws.example.com/websocket", &markets, &zones);

        // Both eth markets strip to the same endpoint and share a connection.
        assert_eq!(endpoints.len(), 2);
        assert_eq!(
            endpoints["wss://ws.example.com/websocket/eth"],
            vec!["ethusdt".to_string(), "ethzb".to_string()]
        );
        assert_eq!(
            endpoints["wss://ws.example.com/websocket/btc"],
            vec!["btcusdt".to_string()]
        );
    }

    #[test]
    fn test_strip_zone_suffix_without_match_is_identity() {
        let zones = vec!["usdt".to_string()];
        assert_eq!(strip_zone_suffix("ethbtc", &zones), "ethbtc");
        assert_eq!(strip_zone_suffix("ethusdt", &zones), "eth");
    }

    #[tokio::test]
    async fn test_full_fill_queue_blocks_producer_until_drained() {
        let (tx, mut rx) = mpsc::channel(FILL_QUEUE_CAPACITY);
        for _ in 0..FILL_QUEUE_CAPACITY {
            tx.try_send(record()).unwrap();
        }

        let mut blocked = tokio_test::task::spawn(tx.send(record()));
        assert_pending!(blocked.poll());

        // One slot frees up; the producer is woken and completes.
        rx.try_recv().unwrap();
        assert!(blocked.is_woken());
        assert_ready!(blocked.poll()).unwrap();
    }
}
