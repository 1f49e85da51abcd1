//! Self-trade close-out: consumes an account's fill notifications and
//! counters the first completed fill from another account.

use crate::exchange::{Account, AccountGateway, FillRecord, OrderIntent};
use rand::Rng;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Per-account fill consumer.
///
/// Partial fills are observed and skipped; the first fully-filled record
/// ends the loop, optionally after submitting the opposing order from a
/// random counterparty account (one close-out per subscription).
pub struct SelfTradeCoordinator<G> {
    gateway: Arc<G>,
    account: Arc<Account>,
    accounts: Vec<Arc<Account>>,
    taker: bool,
}

impl<G: AccountGateway> SelfTradeCoordinator<G> {
    pub fn new(
        gateway: Arc<G>,
        account: Arc<Account>,
        accounts: Vec<Arc<Account>>,
        taker: bool,
    ) -> Self {
        Self {
            gateway,
            account,
            accounts,
            taker,
        }
    }

    pub async fn run(
        self,
        mut fills: mpsc::Receiver<FillRecord>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    info!(account = %self.account.name, "fill coordinator stopping");
                    return;
                }
                record = fills.recv() => {
                    let Some(record) = record else {
                        info!(account = %self.account.name, "fill stream closed");
                        return;
                    };

                    if !record.is_complete() {
                        debug!(
                            account = %self.account.name,
                            entrust_id = %record.entrust_id,
                            filled = %record.filled_qty,
                            total = %record.total_qty,
                            "partial fill",
                        );
                        continue;
                    }

                    info!(
                        account = %self.account.name,
                        entrust_id = %record.entrust_id,
                        side = %record.side,
                        price = %record.unit_price,
                        quantity = %record.total_qty,
                        "order fully filled",
                    );

                    if self.taker {
                        self.close_out(&record).await;
                    }
                    // One close-out per subscription; this loop is done.
                    return;
                }
            }
        }
    }

    async fn close_out(&self, record: &FillRecord) {
        let counterparty = self.pick_counterparty();
        let intent = OrderIntent {
            market: record.market.clone(),
            price: record.unit_price,
            quantity: record.total_qty,
            side: record.side.opposite(),
        };

        match self.gateway.place_order(&counterparty, &intent).await {
            Ok(ack) if ack.is_success() => {
                info!(
                    account = %counterparty.name,
                    market = %intent.market,
                    side = %intent.side,
                    price = %intent.price,
                    quantity = %intent.quantity,
                    "close-out order placed",
                );
            }
            Ok(ack) => {
                error!(
                    account = %counterparty.name,
                    code = ack.code,
                    reason = %ack.message,
                    "close-out order rejected",
                );
            }
            Err(e) => {
                error!(
                    account = %counterparty.name,
                    error = %e,
                    "close-out submission failed",
                );
            }
        }
    }

    /// A uniformly random account other than the initiator; the initiator
    /// itself when no other account is configured.
    fn pick_counterparty(&self) -> Arc<Account> {
        let others: Vec<&Arc<Account>> = self
            .accounts
            .iter()
            .filter(|candidate| candidate.name != self.account.name)
            .collect();

        if others.is_empty() {
            warn!(account = %self.account.name, "no counterpart account, using self-trade mode");
            Arc::clone(&self.account)
        } else {
            Arc::clone(others[rand::thread_rng().gen_range(0..others.len())])
        }
    }
}
