//! # Autotrader
//!
//! A randomized spread trading bot for a single exchange. Each configured
//! account places orders at a bounded-random price inside the current
//! bid/ask spread on a fixed interval, and a coordinator closes out
//! self-initiated fills from a counterparty account.
//!
//! ## Architecture
//!
//! - `config`: Configuration loading and validation
//! - `exchange`: REST gateway client, websocket event pipeline, wire types
//! - `catalog`: Per-market trading constraints fetched at startup
//! - `strategy`: Price sampling, order scheduling, self-trade close-out

pub mod catalog;
pub mod config;
pub mod exchange;
pub mod strategy;

pub use config::Config;
