//! Periodic order placement, one loop per (account, market) pair.

use crate::exchange::{
    Account, AccountGateway, MarketConstraint, OrderIntent, Side, TickerSnapshot,
};
use crate::strategy::sampler::{order_quantity, PriceSampler};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Fixed backoff after a failed ticker fetch; order submission failures
/// take no backoff at all.
const TICKER_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Depth levels per book fetched for the override draw.
const DEPTH_SAMPLE_SIZE: u32 = 3;

/// Places one randomly-sided order per tick on behalf of one account.
pub struct OrderScheduler<G> {
    gateway: Arc<G>,
    account: Arc<Account>,
    market: String,
    sampler: PriceSampler,
    constraint: Option<MarketConstraint>,
    interval: Duration,
}

impl<G: AccountGateway> OrderScheduler<G> {
    pub fn new(
        gateway: Arc<G>,
        account: Arc<Account>,
        market: String,
        sampler: PriceSampler,
        constraint: Option<MarketConstraint>,
        interval: Duration,
    ) -> Self {
        Self {
            gateway,
            account,
            market,
            sampler,
            constraint,
            interval,
        }
    }

    /// Tick until the cancellation signal fires; there is no other terminal
    /// state.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(market = %self.market, account = %self.account.name, "order scheduler started");

        let start = tokio::time::Instant::now() + self.interval;
        let mut tick = tokio::time::interval_at(start, self.interval);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(market = %self.market, account = %self.account.name, "order scheduler stopping");
                    return;
                }
                _ = tick.tick() => {
                    let snapshot = match self.gateway.ticker(&self.market).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            error!(
                                market = %self.market,
                                account = %self.account.name,
                                error = %e,
                                "ticker fetch failed, backing off",
                            );
                            tokio::select! {
                                _ = shutdown.changed() => return,
                                _ = tokio::time::sleep(TICKER_RETRY_BACKOFF) => {}
                            }
                            continue;
                        }
                    };

                    self.place_once(&snapshot).await;
                }
            }
        }
    }

    async fn place_once(&self, snapshot: &TickerSnapshot) {
        let side = if rand::thread_rng().gen_range(0..2) == 1 {
            Side::Buy
        } else {
            Side::Sell
        };

        let depth_override = self.depth_override().await;
        let price = self.sampler.sample(snapshot, side, depth_override);
        let quantity = order_quantity(price, self.constraint.as_ref());

        let intent = OrderIntent {
            market: self.market.clone(),
            price,
            quantity,
            side,
        };

        match self.gateway.place_order(&self.account, &intent).await {
            Ok(ack) if ack.is_success() => {
                info!(
                    market = %self.market,
                    account = %self.account.name,
                    %price,
                    %quantity,
                    %side,
                    "order placed",
                );
            }
            Ok(ack) => {
                error!(
                    market = %self.market,
                    account = %self.account.name,
                    code = ack.code,
                    reason = %ack.message,
                    %price,
                    %quantity,
                    %side,
                    "order rejected",
                );
            }
            Err(e) => {
                error!(
                    market = %self.market,
                    account = %self.account.name,
                    error = %e,
                    "order submission failed",
                );
            }
        }
    }

    /// One price drawn uniformly among the current ask and bid levels;
    /// zero when the depth snapshot is unavailable or empty.
    async fn depth_override(&self) -> Decimal {
        match self
            .gateway
            .depth_prices(&self.market, DEPTH_SAMPLE_SIZE)
            .await
        {
            Ok(prices) if !prices.is_empty() => {
                prices[rand::thread_rng().gen_range(0..prices.len())]
            }
            Ok(_) => Decimal::ZERO,
            Err(e) => {
                debug!(
                    market = %self.market,
                    error = %e,
                    "depth fetch failed, falling back to spread sampling",
                );
                Decimal::ZERO
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{CurrentPrice, MockGateway};
    use rust_decimal_macros::dec;

    fn account(name: &str) -> Arc<Account> {
        Arc::new(Account {
            name: name.into(),
            access_key: "ak".into(),
            secret_key: "sk".into(),
            api_url: "http://gateway.test/".into(),
            trade_url: "http://gateway.test/".into(),
            kline_url: "http://gateway.test/".into(),
            wsapi_url: "ws://gateway.test/websocket".into(),
        })
    }

    fn snapshot() -> TickerSnapshot {
        TickerSnapshot {
            high: dec!(101),
            low: dec!(99),
            last: dec!(100.05),
            buy: dec!(100.00),
            sell: dec!(100.10),
            volume: dec!(1000),
            turnover: dec!(100000),
        }
    }

    fn constraint() -> MarketConstraint {
        MarketConstraint {
            min_amount: dec!(0.01),
            min_size: dec!(5),
            amount_scale: dec!(4),
            price_scale: dec!(2),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_place_orders_inside_the_band() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_ticker(snapshot()).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = OrderScheduler::new(
            Arc::clone(&gateway),
            account("maker1"),
            "ethusdt".into(),
            PriceSampler::new(CurrentPrice::new()),
            Some(constraint()),
            Duration::from_secs(1),
        );
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(3500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let orders = gateway.placed_orders().await;
        assert!(!orders.is_empty(), "expected at least one tick to order");
        for order in &orders {
            assert_eq!(order.account, "maker1");
            assert_eq!(order.intent.market, "ethusdt");
            assert_eq!(order.intent.quantity, dec!(0.01));
            assert!(order.intent.price >= dec!(100.00));
            assert!(order.intent.price <= dec!(100.10));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_override_price_is_used_verbatim() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_ticker(snapshot()).await;
        gateway.set_depth(vec![dec!(100.07)]).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = OrderScheduler::new(
            Arc::clone(&gateway),
            account("maker1"),
            "ethusdt".into(),
            PriceSampler::new(CurrentPrice::new()),
            None,
            Duration::from_secs(1),
        );
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(1500)).await;
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();

        let orders = gateway.placed_orders().await;
        assert!(!orders.is_empty());
        for order in &orders {
            assert_eq!(order.intent.price, dec!(100.07));
            assert_eq!(order.intent.quantity, Decimal::ONE);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_loop_without_orders() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_ticker(snapshot()).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let scheduler = OrderScheduler::new(
            Arc::clone(&gateway),
            account("maker1"),
            "ethusdt".into(),
            PriceSampler::new(CurrentPrice::new()),
            None,
            Duration::from_secs(60),
        );
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        // Cancel before the first tick ever fires.
        shutdown_tx.send(true).unwrap();
        handle.await.unwrap();
        assert!(gateway.placed_orders().await.is_empty());
    }
}
