//! Market data service
//!
//! Candle reads go through a range-keyed freshness cache: a live mark
//! serves straight from storage, a miss drives the feed to exhaustion,
//! persists every row, re-marks the range, then re-reads — the served
//! shape always matches the stored shape. Failures on the miss path
//! propagate unchanged; whatever rows were upserted before the failure
//! stay behind without a mark and are overwritten on the next miss.

use crate::config::DAILY_INTERVAL;
use crate::db::models::Candle;
use crate::error::{AppError, Result};
use crate::feed::table;
use crate::state::AppState;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Source tag written on every bar stored from the feed.
const CANDLE_SOURCE: &str = "moex";

/// Where a candle response was satisfied from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleSource {
    Cache,
    Upstream,
}

/// Candle series for a symbol and range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandleSeries {
    pub secid: String,
    pub candles: Vec<Candle>,
    pub source: CandleSource,
}

/// Close-only point for line charts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinePoint {
    pub t: NaiveDate,
    pub close: Option<f64>,
}

/// Close-only series for a symbol and range
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub secid: String,
    pub points: Vec<LinePoint>,
    pub source: CandleSource,
}

/// Latest stored close for a symbol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastClose {
    pub secid: String,
    pub last: f64,
    pub date: NaiveDate,
}

/// Market data service for business logic
pub struct MarketDataService;

impl MarketDataService {
    /// Get candles for a symbol and date range.
    ///
    /// Serves from storage when the range was backfilled within the TTL,
    /// otherwise refetches the whole range from the feed first.
    pub async fn get_candles(
        state: &AppState,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
        max_points: usize,
    ) -> Result<CandleSeries> {
        let secid = secid.trim().to_uppercase();
        let board = state.config.board.clone();
        let now = state.clock.now();

        if Self::range_is_fresh(state, &secid, &board, interval, date_from, date_to, now)? {
            let data = state
                .db
                .read_candles(&secid, &board, interval, date_from, date_to)?;
            return Ok(CandleSeries {
                secid,
                candles: downsample(data, max_points),
                source: CandleSource::Cache,
            });
        }

        info!(
            "Candle cache miss: {} {} interval={} {}..{}",
            secid, board, interval, date_from, date_to
        );

        let raw = state
            .feed
            .candle_history(&secid, date_from, date_to, interval)
            .await?;
        let rows = table::normalize_candles(&raw);

        state
            .db
            .upsert_candles(&secid, &board, interval, &rows, CANDLE_SOURCE, now)?;
        state
            .db
            .mark_range(&secid, &board, interval, date_from, date_to, now)?;

        let data = state
            .db
            .read_candles(&secid, &board, interval, date_from, date_to)?;
        Ok(CandleSeries {
            secid,
            candles: downsample(data, max_points),
            source: CandleSource::Upstream,
        })
    }

    /// Close-only series over the same cached path.
    pub async fn get_line(
        state: &AppState,
        secid: &str,
        date_from: NaiveDate,
        date_to: NaiveDate,
        interval: u32,
        max_points: usize,
    ) -> Result<LineSeries> {
        let series =
            Self::get_candles(state, secid, date_from, date_to, interval, max_points).await?;

        let points = series
            .candles
            .into_iter()
            .map(|c| LinePoint {
                t: c.t,
                close: c.close,
            })
            .collect();

        Ok(LineSeries {
            secid: series.secid,
            points,
            source: series.source,
        })
    }

    /// Latest stored daily close for a symbol.
    pub fn last_close(state: &AppState, secid: &str) -> Result<LastClose> {
        let secid = secid.trim().to_uppercase();

        state
            .db
            .latest_close(&secid, &state.config.board, DAILY_INTERVAL)?
            .map(|(date, last)| LastClose {
                secid: secid.clone(),
                last,
                date,
            })
            .ok_or_else(|| {
                AppError::PriceUnavailable(format!(
                    "no candles stored for {}; load candles first",
                    secid
                ))
            })
    }

    fn range_is_fresh(
        state: &AppState,
        secid: &str,
        board: &str,
        interval: u32,
        date_from: NaiveDate,
        date_to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mark = state
            .db
            .covering_mark(secid, board, interval, date_from, date_to)?;

        Ok(match mark {
            Some(ts) => now - ts <= Duration::minutes(state.config.candle_ttl_minutes),
            None => false,
        })
    }
}

/// Fixed-stride subsample for display size control.
///
/// Takes every `step`-th bar with `step = n / max_points`; the remainder
/// of the final partial stride is dropped, not aggregated. Output is a
/// subsequence of the input in the original order.
pub fn downsample(items: Vec<Candle>, max_points: usize) -> Vec<Candle> {
    let n = items.len();
    if max_points == 0 || n <= max_points {
        return items;
    }
    let step = (n / max_points).max(1);
    items.into_iter().step_by(step).collect()
}
