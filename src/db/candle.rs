//! Candle storage and range freshness marks
//!
//! Bars are keyed by (secid, board, interval, date); re-fetching a range
//! overwrites OHLCV but never the date. A separate `candle_ranges` table
//! records which queried ranges were fully backfilled and when.

use crate::db::models::Candle;
use crate::db::{fmt_ts, parse_ts};
use crate::error::Result;
use crate::feed::table::CandleRow;
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;

fn date_from_sql(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

/// Upsert normalized bars, last-write-wins on OHLCV.
pub fn upsert_candles(
    conn: &mut Connection,
    secid: &str,
    board: &str,
    interval: u32,
    rows: &[CandleRow],
    source: &str,
    now: DateTime<Utc>,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO candles
                 (secid, board, interval, d, open, high, low, close, volume, source, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT (secid, board, interval, d) DO UPDATE SET
                 open = excluded.open,
                 high = excluded.high,
                 low = excluded.low,
                 close = excluded.close,
                 volume = excluded.volume,
                 source = excluded.source,
                 refreshed_at = excluded.refreshed_at",
        )?;

        for row in rows {
            stmt.execute(params![
                secid,
                board,
                interval,
                row.d.to_string(),
                row.open,
                row.high,
                row.low,
                row.close,
                row.volume,
                source,
                fmt_ts(now),
            ])?;
        }
    }
    tx.commit()?;

    Ok(rows.len())
}

/// Bars for the range, ascending by date.
pub fn read_candles(
    conn: &Connection,
    secid: &str,
    board: &str,
    interval: u32,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<Vec<Candle>> {
    let mut stmt = conn.prepare(
        "SELECT d, open, high, low, close, volume FROM candles
         WHERE secid = ?1 AND board = ?2 AND interval = ?3 AND d >= ?4 AND d <= ?5
         ORDER BY d ASC",
    )?;

    let candles = stmt
        .query_map(
            params![
                secid,
                board,
                interval,
                date_from.to_string(),
                date_to.to_string()
            ],
            |row| {
                Ok(Candle {
                    t: date_from_sql(0, row.get(0)?)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                })
            },
        )?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(candles)
}

/// Newest stored close for a symbol, with its date.
pub fn latest_close(
    conn: &Connection,
    secid: &str,
    board: &str,
    interval: u32,
) -> Result<Option<(NaiveDate, f64)>> {
    let row = conn
        .query_row(
            "SELECT d, close FROM candles
             WHERE secid = ?1 AND board = ?2 AND interval = ?3 AND close IS NOT NULL
             ORDER BY d DESC LIMIT 1",
            params![secid, board, interval],
            |row| Ok((date_from_sql(0, row.get(0)?)?, row.get::<_, f64>(1)?)),
        )
        .optional()?;

    Ok(row)
}

/// Newest stored close per symbol across the whole board, one query.
pub fn latest_closes(conn: &Connection, board: &str, interval: u32) -> Result<HashMap<String, f64>> {
    let mut stmt = conn.prepare(
        "SELECT c.secid, c.close
         FROM candles c
         JOIN (SELECT secid, MAX(d) AS max_d FROM candles
               WHERE board = ?1 AND interval = ?2 AND close IS NOT NULL
               GROUP BY secid) m
           ON c.secid = m.secid AND c.d = m.max_d
         WHERE c.board = ?1 AND c.interval = ?2",
    )?;

    let closes = stmt
        .query_map(params![board, interval], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Option<f64>>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(closes
        .into_iter()
        .filter_map(|(secid, close)| close.map(|c| (secid, c)))
        .collect())
}

/// Record that the exact range was fully backfilled as of `now`.
pub fn mark_range(
    conn: &Connection,
    secid: &str,
    board: &str,
    interval: u32,
    date_from: NaiveDate,
    date_to: NaiveDate,
    now: DateTime<Utc>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO candle_ranges (secid, board, interval, date_from, date_to, refreshed_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (secid, board, interval, date_from, date_to) DO UPDATE SET
             refreshed_at = excluded.refreshed_at",
        params![
            secid,
            board,
            interval,
            date_from.to_string(),
            date_to.to_string(),
            fmt_ts(now),
        ],
    )?;

    Ok(())
}

/// Newest mark whose range contains the queried one.
///
/// A narrower query fully inside a previously backfilled range is served
/// by that range's mark; the exact key is the containment's degenerate
/// case.
pub fn covering_mark(
    conn: &Connection,
    secid: &str,
    board: &str,
    interval: u32,
    date_from: NaiveDate,
    date_to: NaiveDate,
) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT refreshed_at FROM candle_ranges
             WHERE secid = ?1 AND board = ?2 AND interval = ?3
               AND date_from <= ?4 AND date_to >= ?5
             ORDER BY refreshed_at DESC LIMIT 1",
            params![
                secid,
                board,
                interval,
                date_from.to_string(),
                date_to.to_string()
            ],
            |row| row.get(0),
        )
        .optional()?;

    Ok(raw.as_deref().and_then(parse_ts))
}
