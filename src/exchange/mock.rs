//! In-memory gateway used by the strategy tests.

use crate::exchange::traits::AccountGateway;
use crate::exchange::types::{Account, OrderAck, OrderIntent, Side, TickerSnapshot};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;

/// One order captured by the mock, tagged with the submitting account.
#[derive(Debug, Clone)]
pub struct RecordedOrder {
    pub account: String,
    pub intent: OrderIntent,
}

/// Scripted gateway: serves a fixed ticker and depth snapshot, records
/// every order, and acknowledges with a configurable code.
pub struct MockGateway {
    ticker: RwLock<Option<TickerSnapshot>>,
    depth: RwLock<Vec<Decimal>>,
    ack_code: RwLock<i64>,
    orders: Arc<RwLock<Vec<RecordedOrder>>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            ticker: RwLock::new(None),
            depth: RwLock::new(Vec::new()),
            ack_code: RwLock::new(OrderAck::SUCCESS),
            orders: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_ticker(&self, ticker: TickerSnapshot) {
        *self.ticker.write().await = Some(ticker);
    }

    pub async fn set_depth(&self, prices: Vec<Decimal>) {
        *self.depth.write().await = prices;
    }

    pub async fn set_ack_code(&self, code: i64) {
        *self.ack_code.write().await = code;
    }

    pub async fn placed_orders(&self) -> Vec<RecordedOrder> {
        self.orders.read().await.clone()
    }

    async fn ack(&self) -> OrderAck {
        let code = *self.ack_code.read().await;
        OrderAck {
            code,
            message: if code == OrderAck::SUCCESS {
                "success".into()
            } else {
                "rejected".into()
            },
            id: Some("1".into()),
        }
    }
}

#[async_trait]
impl AccountGateway for MockGateway {
    async fn ticker(&self, market: &str) -> Result<TickerSnapshot> {
        self.ticker
            .read()
            .await
            .clone()
            .ok_or_else(|| anyhow!("no ticker scripted for {}", market))
    }

    async fn depth_prices(&self, _market: &str, _size: u32) -> Result<Vec<Decimal>> {
        Ok(self.depth.read().await.clone())
    }

    async fn place_order(&self, account: &Account, intent: &OrderIntent) -> Result<OrderAck> {
        self.orders.write().await.push(RecordedOrder {
            account: account.name.clone(),
            intent: intent.clone(),
        });
        Ok(self.ack().await)
    }

    async fn batch_order(
        &self,
        account: &Account,
        market: &str,
        side: Side,
        levels: &[(Decimal, Decimal)],
    ) -> Result<OrderAck> {
        let mut orders = self.orders.write().await;
        for (price, quantity) in levels {
            orders.push(RecordedOrder {
                account: account.name.clone(),
                intent: OrderIntent {
                    market: market.to_string(),
                    price: *price,
                    quantity: *quantity,
                    side,
                },
            });
        }
        drop(orders);
        Ok(self.ack().await)
    }

    async fn cancel_all_orders(&self, _account: &Account, _market: &str) -> Result<OrderAck> {
        Ok(self.ack().await)
    }
}
