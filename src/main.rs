//! Autotrader - Main Entry Point

use anyhow::{Context, Result};
use autotrader::catalog::MarketCatalog;
use autotrader::config::Config;
use autotrader::exchange::{
    Account, AccountGateway, CurrentPrice, RestClient, TradeEventListener, FILL_QUEUE_CAPACITY,
};
use autotrader::strategy::{OrderScheduler, PriceSampler, SelfTradeCoordinator};
use clap::Parser;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Autotrader CLI
#[derive(Parser)]
#[command(name = "autotrader")]
#[command(version, about = "Randomized spread trading bot with self-trade close-out")]
struct Cli {
    /// Submit the opposite-side taker order after a self-detected fill
    #[arg(long)]
    taker: bool,

    /// Enable the websocket event pipeline (fills + quick depth)
    #[arg(long)]
    wss: bool,

    /// Cancel all open orders on the given market for every account, then exit
    #[arg(long, value_name = "MARKET")]
    cancel_all: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging()?;

    let config = Config::load()?;
    config.validate()?;

    let client = Arc::new(RestClient::new(&config)?);
    let accounts: Vec<Arc<Account>> = config
        .accounts
        .iter()
        .map(|credentials| {
            Arc::new(Account {
                name: credentials.name.clone(),
                access_key: credentials.access_key.clone(),
                secret_key: credentials.secret_key.clone(),
                api_url: config.api_url.clone(),
                trade_url: config.trade_url.clone(),
                kline_url: config.kline_url.clone(),
                wsapi_url: config.wsapi_url.clone(),
            })
        })
        .collect();

    if let Some(market) = cli.cancel_all {
        return cancel_all(&client, &accounts, &market).await;
    }

    // No trading decision can be made without size limits.
    let catalog = MarketCatalog::load(&client)
        .await
        .context("cannot trade without market constraints")?;

    let cache = CurrentPrice::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut handles = Vec::new();

    if cli.wss {
        let listener = TradeEventListener::new(config.wsapi_url.clone(), cache.clone());

        let groups = client
            .group_markets()
            .await
            .context("cannot derive quick depth endpoints")?;
        let zones = groups.get("zone").cloned().unwrap_or_default();
        handles.extend(
            listener
                .spawn_quick_depth(&config.markets, &zones, shutdown_rx.clone())
                .await?,
        );

        for account in &accounts {
            let (fill_tx, fill_rx) = mpsc::channel(FILL_QUEUE_CAPACITY);
            handles.push(
                listener
                    .spawn_account_stream(account, &config.markets, fill_tx, shutdown_rx.clone())
                    .await?,
            );

            let coordinator = SelfTradeCoordinator::new(
                Arc::clone(&client),
                Arc::clone(account),
                accounts.clone(),
                cli.taker,
            );
            handles.push(tokio::spawn(coordinator.run(fill_rx, shutdown_rx.clone())));
        }
    } else {
        info!("websocket pipeline disabled, running in price-only polling mode");
    }

    for account in &accounts {
        for market in &config.markets {
            let scheduler = OrderScheduler::new(
                Arc::clone(&client),
                Arc::clone(account),
                market.clone(),
                PriceSampler::new(cache.clone()),
                catalog.constraint(market).cloned(),
                config.interval(),
            );
            handles.push(tokio::spawn(scheduler.run(shutdown_rx.clone())));
        }
    }

    info!(
        accounts = accounts.len(),
        markets = config.markets.len(),
        "🚀 autotrader running",
    );
    join_all(handles).await;
    info!("all loops stopped");

    Ok(())
}

/// Escape hatch: clear every account's open orders on one market.
async fn cancel_all(client: &RestClient, accounts: &[Arc<Account>], market: &str) -> Result<()> {
    for account in accounts {
        match client.cancel_all_orders(account, market).await {
            Ok(ack) if ack.is_success() => {
                info!(account = %account.name, market, "open orders cancelled");
            }
            Ok(ack) => {
                warn!(
                    account = %account.name,
                    code = ack.code,
                    reason = %ack.message,
                    "cancel rejected",
                );
            }
            Err(e) => {
                error!(account = %account.name, error = %e, "cancel failed");
            }
        }
    }
    Ok(())
}

fn init_logging() -> Result<()> {
    use tracing_subscriber::fmt::writer::MakeWriterExt;

    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // File appender for detailed logs
    let file_appender = tracing_appender::rolling::hourly("logs", "autotrader.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Leak the guard to keep it alive for the program duration
    Box::leak(Box::new(guard));

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("autotrader=debug".parse()?)
                .add_directive(Level::INFO.into()),
        )
        .with_writer(std::io::stdout.and(file_writer))
        .init();

    Ok(())
}
