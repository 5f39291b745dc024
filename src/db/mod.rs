//! SQLite storage module
//!
//! All durable state lives here: market reference data, cached candles
//! with their range freshness marks, and the trading ledger. The wrapper
//! serializes access through one connection; ledger operations run as
//! transactions on top of that.

pub mod models;
mod account;
mod candle;
mod instrument;
mod ledger;
mod migrations;

use crate::error::Result;
use crate::feed::table::CandleRow;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use models::{Account, Candle, Fill, Instrument, InstrumentUpsert, PositionView, Trade};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::Path;

/// Timestamps are stored as fixed-width RFC 3339 text so that SQL
/// ordering matches chronological ordering.
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// SQLite database wrapper
pub struct SqliteDb {
    conn: Mutex<Connection>,
}

impl SqliteDb {
    /// Open (or create) the database file and run migrations.
    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    // ========== Instrument Methods ==========

    /// Upsert reference data by (secid, board).
    pub fn upsert_instruments(
        &self,
        board: &str,
        rows: &[InstrumentUpsert],
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        instrument::upsert_instruments(&mut conn, board, rows, now)
    }

    /// Look up one instrument.
    pub fn get_instrument(&self, secid: &str, board: &str) -> Result<Option<Instrument>> {
        let conn = self.conn.lock();
        instrument::get_instrument(&conn, secid, board)
    }

    /// Newest refresh timestamp across the directory.
    pub fn directory_refreshed_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        instrument::directory_refreshed_at(&conn)
    }

    // ========== Candle Methods ==========

    /// Upsert normalized bars by (secid, board, interval, date).
    pub fn upsert_candles(
        &self,
        secid: &str,
        board: &str,
        interval: u32,
        rows: &[CandleRow],
        source: &str,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        let mut conn = self.conn.lock();
        candle::upsert_candles(&mut conn, secid, board, interval, rows, source, now)
    }

    /// Stored bars for the range, ascending by date.
    pub fn read_candles(
        &self,
        secid: &str,
        board: &str,
        interval: u32,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Vec<Candle>> {
        let conn = self.conn.lock();
        candle::read_candles(&conn, secid, board, interval, date_from, date_to)
    }

    /// Newest stored close for a symbol.
    pub fn latest_close(
        &self,
        secid: &str,
        board: &str,
        interval: u32,
    ) -> Result<Option<(NaiveDate, f64)>> {
        let conn = self.conn.lock();
        candle::latest_close(&conn, secid, board, interval)
    }

    /// Newest stored close per symbol, one query.
    pub fn latest_closes(&self, board: &str, interval: u32) -> Result<HashMap<String, f64>> {
        let conn = self.conn.lock();
        candle::latest_closes(&conn, board, interval)
    }

    /// Mark a queried range as fully backfilled.
    pub fn mark_range(
        &self,
        secid: &str,
        board: &str,
        interval: u32,
        date_from: NaiveDate,
        date_to: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.conn.lock();
        candle::mark_range(&conn, secid, board, interval, date_from, date_to, now)
    }

    /// Newest mark covering the queried range.
    pub fn covering_mark(
        &self,
        secid: &str,
        board: &str,
        interval: u32,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock();
        candle::covering_mark(&conn, secid, board, interval, date_from, date_to)
    }

    // ========== Account Methods ==========

    /// Create the owner's account with starting cash if missing.
    pub fn ensure_account(
        &self,
        owner_id: i64,
        starting_cash: f64,
        now: DateTime<Utc>,
    ) -> Result<Account> {
        let conn = self.conn.lock();
        account::ensure_account(&conn, owner_id, starting_cash, now)
    }

    pub fn get_account(&self, account_id: i64) -> Result<Option<Account>> {
        let conn = self.conn.lock();
        account::get_account(&conn, account_id)
    }

    pub fn get_account_by_owner(&self, owner_id: i64) -> Result<Option<Account>> {
        let conn = self.conn.lock();
        account::get_account_by_owner(&conn, owner_id)
    }

    pub fn all_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.conn.lock();
        account::all_accounts(&conn)
    }

    /// (qty, avg_price) for one held symbol.
    pub fn position_for(
        &self,
        account_id: i64,
        secid: &str,
        board: &str,
    ) -> Result<Option<(f64, f64)>> {
        let conn = self.conn.lock();
        account::position_for(&conn, account_id, secid, board)
    }

    /// All positions for the account with instrument identity.
    pub fn list_positions(&self, account_id: i64, board: &str) -> Result<Vec<PositionView>> {
        let conn = self.conn.lock();
        account::list_positions(&conn, account_id, board)
    }

    /// Every position on the board across all accounts.
    pub fn positions_by_board(&self, board: &str) -> Result<Vec<(i64, String, f64)>> {
        let conn = self.conn.lock();
        account::positions_by_board(&conn, board)
    }

    /// Most recent trades first.
    pub fn list_trades(&self, account_id: i64, limit: usize) -> Result<Vec<Trade>> {
        let conn = self.conn.lock();
        account::list_trades(&conn, account_id, limit)
    }

    // ========== Ledger Methods ==========

    /// Atomically settle a buy.
    pub fn buy(
        &self,
        account_id: i64,
        secid: &str,
        board: &str,
        qty: f64,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Fill> {
        let mut conn = self.conn.lock();
        ledger::buy(&mut conn, account_id, secid, board, qty, price, now)
    }

    /// Atomically settle a sell.
    pub fn sell(
        &self,
        account_id: i64,
        secid: &str,
        board: &str,
        qty: f64,
        price: f64,
        now: DateTime<Utc>,
    ) -> Result<Fill> {
        let mut conn = self.conn.lock();
        ledger::sell(&mut conn, account_id, secid, board, qty, price, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_and_migrates_an_on_disk_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papertrader.db");

        // Opening twice must not re-run applied migrations.
        drop(SqliteDb::new(&path).unwrap());
        let db = SqliteDb::new(&path).unwrap();

        assert!(db.get_instrument("SBER", "TQBR").unwrap().is_none());
    }

    #[test]
    fn timestamp_round_trips_through_text() {
        use chrono::TimeZone;

        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 45).unwrap();
        assert_eq!(parse_ts(&fmt_ts(ts)), Some(ts));
    }
}
