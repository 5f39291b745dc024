//! MOEX ISS feed client
//!
//! Speaks the ISS JSON table protocol: every response carries named
//! sections (`securities`, `marketdata`, `candles`), each a columns/data
//! pair. Pagination runs on `limit`/`start` offsets. The client performs
//! no caching of its own; staleness decisions belong to the services.

pub mod popular;
pub mod table;

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use table::{FeedRow, FeedTable};
use tracing::debug;
use url::Url;

/// Reference columns requested from the securities section.
const SECURITY_COLUMNS: &str = "SECID,SHORTNAME,NAME,ISIN,LOTSIZE";

/// Quote snapshot columns requested from the marketdata section.
const MARKETDATA_COLUMNS: &str = "SECID,BOARDID,LAST,VALTODAY,VOLTODAY,UPDATETIME,SYSTIME";

/// Upstream quote/candle feed.
///
/// Single-page calls mirror the wire protocol; `candle_history` drives
/// candle pagination to exhaustion. Implementations must not cache.
#[async_trait]
pub trait QuoteFeed: Send + Sync {
    /// One page of the board's security listing (reference columns).
    async fn board_securities(&self, limit: usize, start: usize) -> Result<Vec<FeedRow>>;

    /// Reference data for an explicit symbol list, non-paginated.
    async fn security_info(&self, secids: &[String]) -> Result<Vec<FeedRow>>;

    /// One page of quote snapshots across the board.
    async fn marketdata_page(&self, limit: usize, start: usize) -> Result<Vec<FeedRow>>;

    /// One page of candles for a symbol.
    async fn candle_page(
        &self,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
        start: usize,
    ) -> Result<Vec<FeedRow>>;

    /// All candle pages for the range, in upstream order.
    async fn candle_history(
        &self,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
    ) -> Result<Vec<FeedRow>>;
}

/// HTTP client for the ISS feed
pub struct IssClient {
    http: Client,
    base: String,
    board: String,
    page_size: usize,
    max_pages: usize,
}

impl IssClient {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Url::parse(&config.feed_base_url)
            .map_err(|e| AppError::Config(format!("bad feed base url: {}", e)))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Ok(Self {
            http,
            base: config.feed_base_url.trim_end_matches('/').to_string(),
            board: config.board.clone(),
            page_size: config.candle_page_size,
            max_pages: config.candle_max_pages,
        })
    }

    fn securities_url(&self) -> String {
        format!(
            "{}/engines/stock/markets/shares/boards/{}/securities.json",
            self.base, self.board
        )
    }

    fn candles_url(&self, secid: &str) -> String {
        format!(
            "{}/engines/stock/markets/shares/boards/{}/securities/{}/candles.json",
            self.base, self.board, secid
        )
    }

    /// GET the URL and decode the named section out of the payload.
    async fn fetch_section(
        &self,
        url: &str,
        params: &[(&str, String)],
        section: &str,
    ) -> Result<Vec<FeedRow>> {
        debug!("GET {} ({})", url, section);

        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AppError::UpstreamUnavailable(format!(
                "{} returned {}",
                url, status
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::MalformedResponse(format!("invalid JSON: {}", e)))?;

        let block = payload.get(section).ok_or_else(|| {
            AppError::MalformedResponse(format!("response has no '{}' section", section))
        })?;

        let feedtable: FeedTable = serde_json::from_value(block.clone())
            .map_err(|e| AppError::MalformedResponse(format!("bad '{}' table: {}", section, e)))?;

        Ok(feedtable.rows())
    }
}

#[async_trait]
impl QuoteFeed for IssClient {
    async fn board_securities(&self, limit: usize, start: usize) -> Result<Vec<FeedRow>> {
        let params = [
            ("iss.meta", "off".to_string()),
            ("iss.only", "securities".to_string()),
            ("securities.columns", SECURITY_COLUMNS.to_string()),
            ("limit", limit.to_string()),
            ("start", start.to_string()),
        ];
        self.fetch_section(&self.securities_url(), &params, "securities")
            .await
    }

    async fn security_info(&self, secids: &[String]) -> Result<Vec<FeedRow>> {
        let list = secids
            .iter()
            .map(|s| s.trim().to_uppercase())
            .collect::<Vec<_>>()
            .join(",");
        let params = [
            ("iss.meta", "off".to_string()),
            ("iss.only", "securities".to_string()),
            ("securities", list),
            ("securities.columns", SECURITY_COLUMNS.to_string()),
        ];
        self.fetch_section(&self.securities_url(), &params, "securities")
            .await
    }

    async fn marketdata_page(&self, limit: usize, start: usize) -> Result<Vec<FeedRow>> {
        let params = [
            ("iss.meta", "off".to_string()),
            ("iss.only", "marketdata".to_string()),
            ("marketdata.columns", MARKETDATA_COLUMNS.to_string()),
            ("limit", limit.to_string()),
            ("start", start.to_string()),
        ];
        self.fetch_section(&self.securities_url(), &params, "marketdata")
            .await
    }

    async fn candle_page(
        &self,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
        start: usize,
    ) -> Result<Vec<FeedRow>> {
        let params = [
            ("iss.meta", "off".to_string()),
            ("from", date_from.to_string()),
            ("till", date_to.to_string()),
            ("interval", interval.to_string()),
            ("start", start.to_string()),
        ];
        self.fetch_section(&self.candles_url(secid), &params, "candles")
            .await
    }

    /// The feed serves candle pages of a fixed size; a short or empty
    /// page means the range is exhausted.
    async fn candle_history(
        &self,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
    ) -> Result<Vec<FeedRow>> {
        let mut all = Vec::new();

        for page in 0..self.max_pages {
            let start = page * self.page_size;
            let chunk = self
                .candle_page(secid, date_from, date_to, interval, start)
                .await?;
            if chunk.is_empty() {
                break;
            }
            let short = chunk.len() < self.page_size;
            all.extend(chunk);
            if short {
                break;
            }
        }

        debug!("fetched {} candle rows for {}", all.len(), secid);
        Ok(all)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// How a stubbed call should fail.
    #[derive(Debug, Clone, Copy)]
    pub enum FailMode {
        Unavailable,
        Malformed,
    }

    fn fail(mode: FailMode) -> AppError {
        match mode {
            FailMode::Unavailable => AppError::UpstreamUnavailable("stub offline".to_string()),
            FailMode::Malformed => AppError::MalformedResponse("stub garbage".to_string()),
        }
    }

    /// Canned feed; counts calls so cache tests can assert zero fetches.
    #[derive(Default)]
    pub struct StubFeed {
        pub candles: Mutex<Vec<FeedRow>>,
        pub marketdata_pages: Mutex<Vec<Vec<FeedRow>>>,
        pub securities: Mutex<Vec<FeedRow>>,
        pub candle_calls: AtomicUsize,
        pub marketdata_calls: AtomicUsize,
        pub security_info_calls: AtomicUsize,
        pub fail_candles: Mutex<Option<FailMode>>,
    }

    impl StubFeed {
        pub fn with_candles(rows: Vec<FeedRow>) -> Self {
            let stub = Self::default();
            *stub.candles.lock() = rows;
            stub
        }

        pub fn candle_fetches(&self) -> usize {
            self.candle_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl QuoteFeed for StubFeed {
        async fn board_securities(&self, _limit: usize, start: usize) -> Result<Vec<FeedRow>> {
            if start == 0 {
                Ok(self.securities.lock().clone())
            } else {
                Ok(vec![])
            }
        }

        async fn security_info(&self, _secids: &[String]) -> Result<Vec<FeedRow>> {
            self.security_info_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.securities.lock().clone())
        }

        async fn marketdata_page(&self, limit: usize, start: usize) -> Result<Vec<FeedRow>> {
            self.marketdata_calls.fetch_add(1, Ordering::SeqCst);
            let page = start / limit.max(1);
            Ok(self
                .marketdata_pages
                .lock()
                .get(page)
                .cloned()
                .unwrap_or_default())
        }

        async fn candle_page(
            &self,
            _secid: &str,
            _date_from: NaiveDate,
            _date_to: NaiveDate,
            _interval: u32,
            start: usize,
        ) -> Result<Vec<FeedRow>> {
            if start == 0 {
                Ok(self.candles.lock().clone())
            } else {
                Ok(vec![])
            }
        }

        async fn candle_history(
            &self,
            _secid: &str,
            _date_from: NaiveDate,
            _date_to: NaiveDate,
            _interval: u32,
        ) -> Result<Vec<FeedRow>> {
            self.candle_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(mode) = *self.fail_candles.lock() {
                return Err(fail(mode));
            }
            Ok(self.candles.lock().clone())
        }
    }

    /// Candle feed row in the lower-case `begin` shape.
    pub fn candle_row(ts: &str, open: f64, high: f64, low: f64, close: f64, volume: f64) -> FeedRow {
        json!({
            "begin": ts,
            "open": open,
            "high": high,
            "low": low,
            "close": close,
            "volume": volume,
        })
        .as_object()
        .unwrap()
        .clone()
    }

    /// Security reference row as the securities section serves it.
    pub fn security_row(secid: &str, shortname: &str, name: &str) -> FeedRow {
        json!({
            "SECID": secid,
            "SHORTNAME": shortname,
            "NAME": name,
            "ISIN": format!("RU000{}", secid),
            "LOTSIZE": 10,
        })
        .as_object()
        .unwrap()
        .clone()
    }
}
