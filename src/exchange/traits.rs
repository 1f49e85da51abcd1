//! Gateway trait the trading loops depend on.
//!
//! Keeping the surface behind a trait lets the scheduler and coordinator be
//! exercised against [`crate::exchange::MockGateway`] in tests.

use crate::exchange::types::{Account, OrderAck, OrderIntent, Side, TickerSnapshot};
use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Order placement and market-data operations of the exchange gateway.
///
/// All calls are synchronous request/response; any non-success ack code is
/// reported to the caller, never retried here.
#[async_trait]
pub trait AccountGateway: Send + Sync {
    /// Fetch a fresh ticker snapshot for one market.
    async fn ticker(&self, market: &str) -> Result<TickerSnapshot>;

    /// Flattened ask + bid price levels from a shallow depth snapshot.
    async fn depth_prices(&self, market: &str, size: u32) -> Result<Vec<Decimal>>;

    /// Submit one order on behalf of `account`.
    async fn place_order(&self, account: &Account, intent: &OrderIntent) -> Result<OrderAck>;

    /// Submit several price/quantity levels on one side in a single call.
    async fn batch_order(
        &self,
        account: &Account,
        market: &str,
        side: Side,
        levels: &[(Decimal, Decimal)],
    ) -> Result<OrderAck>;

    /// Cancel every open order for `account` on `market`.
    async fn cancel_all_orders(&self, account: &Account, market: &str) -> Result<OrderAck>;
}
