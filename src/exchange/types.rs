//! Wire types shared between the gateway client and the event pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A trading account and the gateway endpoints it operates against.
///
/// Immutable after construction; shared as `Arc<Account>` by the scheduler
/// and coordinator acting on its behalf.
#[derive(Debug, Clone)]
pub struct Account {
    pub name: String,
    pub access_key: String,
    pub secret_key: String,
    pub api_url: String,
    pub trade_url: String,
    pub kline_url: String,
    pub wsapi_url: String,
}

/// Order side. The gateway encodes buy as 1 and sell as 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Decode the gateway's numeric side code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Side::Buy),
            0 => Some(Side::Sell),
            _ => None,
        }
    }

    /// Numeric side code used by the order endpoints.
    pub fn code(self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => 0,
        }
    }

    /// The side that closes out this one.
    pub fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "buy"),
            Side::Sell => write!(f, "sell"),
        }
    }
}

/// Ticker endpoint response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerResponse {
    #[serde(default)]
    pub date: String,
    pub ticker: TickerSnapshot,
}

/// One market's ticker at a point in time.
///
/// The gateway reports every figure as a decimal string; parsing through
/// `Decimal` keeps the exact reported precision for spread arithmetic.
#[derive(Debug, Clone, Deserialize)]
pub struct TickerSnapshot {
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub last: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub buy: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub sell: Decimal,
    #[serde(rename = "vol", with = "rust_decimal::serde::str")]
    pub volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub turnover: Decimal,
}

/// Per-market trading constraints reported by the markets catalog endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketConstraint {
    pub min_amount: Decimal,
    pub min_size: Decimal,
    pub amount_scale: Decimal,
    pub price_scale: Decimal,
}

/// A single order to be submitted, consumed exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderIntent {
    pub market: String,
    pub price: Decimal,
    pub quantity: Decimal,
    pub side: Side,
}

/// Gateway acknowledgement for order operations.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderAck {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    /// Entrust id assigned on acceptance.
    #[serde(default)]
    pub id: Option<String>,
}

impl OrderAck {
    pub const SUCCESS: i64 = 1000;

    pub fn is_success(&self) -> bool {
        self.code == Self::SUCCESS
    }
}

/// One fill notification for an entrusted order.
///
/// Decoded from the `userIncrRecord` event frame; `filled_qty` grows until
/// it reaches `total_qty`, at which point the record is complete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRecord {
    pub entrust_id: String,
    pub unit_price: Decimal,
    pub total_qty: Decimal,
    pub filled_qty: Decimal,
    pub side: Side,
    pub market: String,
}

impl FillRecord {
    pub fn is_complete(&self) -> bool {
        self.filled_qty == self.total_qty
    }
}

/// Parse a JSON number through its literal text.
///
/// Going through the literal instead of `f64` keeps the exchange-reported
/// precision intact.
pub(crate) fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            let text = n.to_string();
            text.parse::<Decimal>()
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        serde_json::Value::String(s) => s.parse::<Decimal>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_codes_round_trip() {
        assert_eq!(Side::from_code(1), Some(Side::Buy));
        assert_eq!(Side::from_code(0), Some(Side::Sell));
        assert_eq!(Side::from_code(7), None);
        assert_eq!(Side::Buy.code(), 1);
        assert_eq!(Side::Sell.code(), 0);
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_ticker_parses_string_decimals() {
        let body = r#"{
            "date": "1754600000000",
            "ticker": {
                "high": "101.5", "low": "99.1", "last": "100.2",
                "buy": "100.00", "sell": "100.10",
                "vol": "1234.5", "turnover": "123450.0"
            }
        }"#;
        let response: TickerResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.ticker.buy, dec!(100.00));
        assert_eq!(response.ticker.sell, dec!(100.10));
        assert_eq!(response.ticker.sell - response.ticker.buy, dec!(0.10));
    }

    #[test]
    fn test_decimal_from_json_preserves_literal() {
        let value: serde_json::Value = serde_json::from_str("0.0001").unwrap();
        assert_eq!(decimal_from_json(&value), Some(dec!(0.0001)));

        let value: serde_json::Value = serde_json::from_str(r#""42.5""#).unwrap();
        assert_eq!(decimal_from_json(&value), Some(dec!(42.5)));

        let value: serde_json::Value = serde_json::from_str("true").unwrap();
        assert_eq!(decimal_from_json(&value), None);
    }

    #[test]
    fn test_fill_record_completion() {
        let mut record = FillRecord {
            entrust_id: "20240101".into(),
            unit_price: dec!(100.2),
            total_qty: dec!(5),
            filled_qty: dec!(2),
            side: Side::Buy,
            market: "ethusdt".into(),
        };
        assert!(!record.is_complete());
        record.filled_qty = dec!(5);
        assert!(record.is_complete());
    }
}
