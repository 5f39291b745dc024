//! Storage row models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Instrument reference data, one row per (secid, board)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instrument {
    pub id: i64,
    pub secid: String,
    pub board: String,
    pub name: String,
    pub shortname: String,
    pub isin: String,
    pub lotsize: i64,
    pub refreshed_at: DateTime<Utc>,
}

/// Reference attributes written by a directory refresh.
///
/// Identity (secid, board) is the upsert key; everything else is
/// overwritten last-write-wins.
#[derive(Debug, Clone)]
pub struct InstrumentUpsert {
    pub secid: String,
    pub name: String,
    pub shortname: String,
    pub isin: String,
    pub lotsize: i64,
}

/// Candle bar as served to readers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub t: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Trading account, one per external owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub owner_id: i64,
    pub cash: f64,
    pub created_at: DateTime<Utc>,
}

/// Position joined with its instrument identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub secid: String,
    pub name: String,
    pub qty: f64,
    pub avg_price: f64,
}

/// Immutable trade record, joined with its instrument identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub account_id: i64,
    pub secid: String,
    pub side: String,
    pub qty: f64,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

/// Result of a settled buy or sell
#[derive(Debug, Clone, Serialize)]
pub struct Fill {
    pub account_id: i64,
    pub secid: String,
    pub side: String,
    pub qty: f64,
    pub price: f64,
    pub cash_after: f64,
    pub position_qty: f64,
    pub position_avg_price: f64,
}
