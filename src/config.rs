//! Runtime configuration and time source

use chrono::{DateTime, Utc};
use std::env;
use std::path::PathBuf;

/// Board every instrument and candle is scoped to by default.
pub const DEFAULT_BOARD: &str = "TQBR";

/// ISS interval code for daily candles.
pub const DAILY_INTERVAL: u32 = 24;

/// Application configuration
///
/// `Default` gives the production values; `from_env` layers
/// `PAPERTRADER_*` environment overrides on top.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database file
    pub db_path: PathBuf,
    /// Base URL of the ISS feed
    pub feed_base_url: String,
    /// Trading board
    pub board: String,
    /// HTTP client timeout in seconds
    pub http_timeout_secs: u64,
    /// Candle rows the feed serves per page
    pub candle_page_size: usize,
    /// Hard cap on candle pages fetched per range
    pub candle_max_pages: usize,
    /// Quote snapshot rows requested per page
    pub marketdata_page_size: usize,
    /// Hard cap on quote snapshot pages per sweep
    pub marketdata_max_pages: usize,
    /// How long a backfilled candle range stays fresh
    pub candle_ttl_minutes: i64,
    /// How long the instrument directory stays fresh
    pub directory_max_age_hours: i64,
    /// Cash granted to a newly created account
    pub starting_cash: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("papertrader.db"),
            feed_base_url: "https://iss.moex.com/iss".to_string(),
            board: DEFAULT_BOARD.to_string(),
            http_timeout_secs: 20,
            candle_page_size: 500,
            candle_max_pages: 200,
            marketdata_page_size: 200,
            marketdata_max_pages: 30,
            candle_ttl_minutes: 60,
            directory_max_age_hours: 24,
            starting_cash: 10_000.0,
        }
    }
}

impl AppConfig {
    /// Defaults with `PAPERTRADER_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("PAPERTRADER_DB") {
            cfg.db_path = PathBuf::from(v);
        }
        if let Ok(v) = env::var("PAPERTRADER_FEED_URL") {
            cfg.feed_base_url = v;
        }
        if let Ok(v) = env::var("PAPERTRADER_BOARD") {
            cfg.board = v;
        }
        if let Some(v) = env_parse("PAPERTRADER_HTTP_TIMEOUT_SECS") {
            cfg.http_timeout_secs = v;
        }
        if let Some(v) = env_parse("PAPERTRADER_CANDLE_TTL_MINUTES") {
            cfg.candle_ttl_minutes = v;
        }
        if let Some(v) = env_parse("PAPERTRADER_DIRECTORY_MAX_AGE_HOURS") {
            cfg.directory_max_age_hours = v;
        }
        if let Some(v) = env_parse("PAPERTRADER_STARTING_CASH") {
            cfg.starting_cash = v;
        }

        cfg
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Time source for freshness checks.
///
/// Injected through `AppState` so tests can pin the clock instead of
/// sleeping through TTL windows.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_production_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.board, "TQBR");
        assert_eq!(cfg.candle_ttl_minutes, 60);
        assert_eq!(cfg.directory_max_age_hours, 24);
        assert_eq!(cfg.starting_cash, 10_000.0);
    }
}
