//! Application state management

use crate::config::{AppConfig, Clock, SystemClock};
use crate::db::SqliteDb;
use crate::error::Result;
use crate::feed::{IssClient, QuoteFeed};
use std::sync::Arc;

/// Application state shared across all request handlers
///
/// Holds no per-request mutable data; everything durable lives in the
/// storage collaborator. The feed and clock sit behind trait objects so
/// tests can swap in fakes.
pub struct AppState {
    /// SQLite database connection
    pub db: Arc<SqliteDb>,

    /// Upstream market-data feed
    pub feed: Arc<dyn QuoteFeed>,

    /// Time source for freshness checks
    pub clock: Arc<dyn Clock>,

    /// Runtime configuration
    pub config: AppConfig,
}

impl AppState {
    /// Create new application state from configuration
    pub fn new(config: AppConfig) -> Result<Self> {
        if let Some(dir) = config.db_path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }

        tracing::info!("Database file: {:?}", config.db_path);

        let db = Arc::new(SqliteDb::new(&config.db_path)?);
        let feed = Arc::new(IssClient::new(&config)?);

        Ok(Self {
            db,
            feed,
            clock: Arc::new(SystemClock),
            config,
        })
    }

    /// Build a state around explicit collaborators.
    pub fn with_parts(
        db: Arc<SqliteDb>,
        feed: Arc<dyn QuoteFeed>,
        clock: Arc<dyn Clock>,
        config: AppConfig,
    ) -> Self {
        Self {
            db,
            feed,
            clock,
            config,
        }
    }
}
