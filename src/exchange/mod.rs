//! Exchange gateway integration.
//!
//! REST client for order placement and market-data queries, websocket
//! pipeline for fill and quick-depth notifications, and the wire types
//! both share. Tests run against the in-memory [`MockGateway`].

mod client;
pub mod events;
pub mod mock;
mod traits;
mod types;

pub use client::RestClient;
pub use events::{CurrentPrice, TradeEventListener, FILL_QUEUE_CAPACITY};
pub use mock::MockGateway;
pub use traits::AccountGateway;
pub use types::*;
