//! Paper-trading engine over the MOEX ISS market-data feed
//!
//! Accounts receive simulated cash and trade board instruments at prices
//! derived from cached daily candles. Market data is pulled from the ISS
//! HTTP API through a TTL-keyed candle cache backed by SQLite; buys and
//! sells settle against a transactional ledger with average-cost
//! positions, and equity is ranked on a leaderboard.

pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod services;
pub mod state;

pub use config::AppConfig;
pub use error::{AppError, ErrorResponse, Result};
pub use state::AppState;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for an embedding binary
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "papertrader=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
