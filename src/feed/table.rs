//! ISS table decoding
//!
//! Every ISS section is a `{"columns": [...], "data": [[...], ...]}` pair.
//! Field names vary between payload shapes (lower vs upper case, `begin`
//! vs `end`), so extraction goes through ordered candidate-key lists
//! instead of hardcoding one spelling per call site.

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};

/// Candidate keys for the candle timestamp, checked in priority order.
pub const TIMESTAMP_KEYS: [&str; 4] = ["begin", "BEGIN", "end", "END"];

pub const OPEN_KEYS: [&str; 2] = ["open", "OPEN"];
pub const HIGH_KEYS: [&str; 2] = ["high", "HIGH"];
pub const LOW_KEYS: [&str; 2] = ["low", "LOW"];
pub const CLOSE_KEYS: [&str; 2] = ["close", "CLOSE"];
pub const VOLUME_KEYS: [&str; 2] = ["volume", "VOLUME"];

/// One row of a decoded section, keyed by column name.
pub type FeedRow = Map<String, Value>;

/// One named section of an ISS response.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedTable {
    pub columns: Vec<String>,
    pub data: Vec<Vec<Value>>,
}

impl FeedTable {
    /// Zip column names with every data row.
    pub fn rows(&self) -> Vec<FeedRow> {
        self.data
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }
}

/// First present, non-null, non-empty string among the candidate keys.
pub fn pick_str(row: &FeedRow, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(Value::String(s)) = row.get(*key) {
            if !s.is_empty() {
                return Some(s.clone());
            }
        }
    }
    None
}

/// First present, non-null numeric among the candidate keys.
///
/// Null and absence both yield `None`; an explicit zero stays `Some(0.0)`.
pub fn pick_f64(row: &FeedRow, keys: &[&str]) -> Option<f64> {
    for key in keys {
        match row.get(*key) {
            Some(Value::Number(n)) => return n.as_f64(),
            Some(Value::String(s)) => {
                if let Ok(v) = s.parse() {
                    return Some(v);
                }
            }
            _ => {}
        }
    }
    None
}

/// Candle row with canonical field names, ready for storage.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleRow {
    pub d: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
}

/// Normalize raw candle rows. Rows without a usable timestamp are dropped.
pub fn normalize_candles(rows: &[FeedRow]) -> Vec<CandleRow> {
    rows.iter().filter_map(normalize_candle).collect()
}

fn normalize_candle(row: &FeedRow) -> Option<CandleRow> {
    let ts = pick_str(row, &TIMESTAMP_KEYS)?;
    let d = parse_feed_date(&ts)?;

    Some(CandleRow {
        d,
        open: pick_f64(row, &OPEN_KEYS),
        high: pick_f64(row, &HIGH_KEYS),
        low: pick_f64(row, &LOW_KEYS),
        close: pick_f64(row, &CLOSE_KEYS),
        volume: pick_f64(row, &VOLUME_KEYS),
    })
}

/// `"YYYY-MM-DD"` or `"YYYY-MM-DD HH:MM:SS"` to a calendar date.
fn parse_feed_date(ts: &str) -> Option<NaiveDate> {
    let head = ts.get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: Value) -> FeedRow {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn rows_zip_columns_with_data() {
        let table: FeedTable = serde_json::from_value(json!({
            "columns": ["SECID", "LAST"],
            "data": [["SBER", 280.5], ["GAZP", null]],
        }))
        .unwrap();

        let rows = table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["SECID"], json!("SBER"));
        assert_eq!(rows[1]["LAST"], Value::Null);
    }

    #[test]
    fn pick_f64_prefers_earlier_keys() {
        let r = row(json!({"open": 101.0, "OPEN": 999.0}));
        assert_eq!(pick_f64(&r, &OPEN_KEYS), Some(101.0));
    }

    #[test]
    fn pick_f64_falls_through_null_to_next_key() {
        let r = row(json!({"open": null, "OPEN": 99.5}));
        assert_eq!(pick_f64(&r, &OPEN_KEYS), Some(99.5));
    }

    #[test]
    fn pick_f64_keeps_null_distinct_from_zero() {
        let absent = row(json!({"close": null}));
        let zero = row(json!({"close": 0.0}));

        assert_eq!(pick_f64(&absent, &CLOSE_KEYS), None);
        assert_eq!(pick_f64(&zero, &CLOSE_KEYS), Some(0.0));
    }

    #[test]
    fn timestamp_prefers_begin_over_end() {
        let r = row(json!({
            "begin": "2024-03-01 00:00:00",
            "end": "2024-03-02 00:00:00",
            "open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0,
        }));

        let candles = normalize_candles(&[r]);
        assert_eq!(candles[0].d, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
    }

    #[test]
    fn rows_without_timestamp_are_dropped() {
        let good = row(json!({"begin": "2024-03-01", "close": 10.0}));
        let bad = row(json!({"close": 11.0}));
        let garbage = row(json!({"begin": "not-a-date", "close": 12.0}));

        let candles = normalize_candles(&[good, bad, garbage]);
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, Some(10.0));
    }

    #[test]
    fn uppercase_shape_normalizes_too() {
        let r = row(json!({
            "BEGIN": "2024-03-05 00:00:00",
            "OPEN": 10.0, "HIGH": 12.0, "LOW": 9.0, "CLOSE": 11.0, "VOLUME": null,
        }));

        let candles = normalize_candles(&[r]);
        assert_eq!(candles[0].open, Some(10.0));
        assert_eq!(candles[0].volume, None);
    }
}
