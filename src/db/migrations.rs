//! SQLite database migrations

use crate::error::Result;
use rusqlite::Connection;

/// Run all database migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    // Create migrations table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    run_migration(conn, "001_instruments", CREATE_INSTRUMENTS_TABLE)?;
    run_migration(conn, "002_candles", CREATE_CANDLES_TABLE)?;
    run_migration(conn, "003_candle_ranges", CREATE_CANDLE_RANGES_TABLE)?;
    run_migration(conn, "004_accounts", CREATE_ACCOUNTS_TABLE)?;
    run_migration(conn, "005_positions", CREATE_POSITIONS_TABLE)?;
    run_migration(conn, "006_trades", CREATE_TRADES_TABLE)?;

    tracing::info!("Database migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    // Check if migration already applied
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM migrations WHERE name = ?)",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_INSTRUMENTS_TABLE: &str = r#"
CREATE TABLE instruments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    secid TEXT NOT NULL,
    board TEXT NOT NULL DEFAULT 'TQBR',
    name TEXT NOT NULL,
    shortname TEXT NOT NULL DEFAULT '',
    isin TEXT NOT NULL DEFAULT '',
    lotsize INTEGER NOT NULL DEFAULT 1,
    refreshed_at TEXT NOT NULL,
    UNIQUE (secid, board)
);
CREATE INDEX ix_instruments_refreshed ON instruments(refreshed_at);
"#;

const CREATE_CANDLES_TABLE: &str = r#"
CREATE TABLE candles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    secid TEXT NOT NULL,
    board TEXT NOT NULL,
    interval INTEGER NOT NULL,
    d TEXT NOT NULL,
    open REAL,
    high REAL,
    low REAL,
    close REAL,
    volume REAL,
    source TEXT NOT NULL DEFAULT 'moex',
    refreshed_at TEXT NOT NULL,
    UNIQUE (secid, board, interval, d)
);
CREATE INDEX ix_candles_lookup ON candles(secid, board, interval, d);
"#;

const CREATE_CANDLE_RANGES_TABLE: &str = r#"
CREATE TABLE candle_ranges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    secid TEXT NOT NULL,
    board TEXT NOT NULL,
    interval INTEGER NOT NULL,
    date_from TEXT NOT NULL,
    date_to TEXT NOT NULL,
    refreshed_at TEXT NOT NULL,
    UNIQUE (secid, board, interval, date_from, date_to)
);
"#;

const CREATE_ACCOUNTS_TABLE: &str = r#"
CREATE TABLE accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL UNIQUE,
    cash REAL NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const CREATE_POSITIONS_TABLE: &str = r#"
CREATE TABLE positions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    instrument_id INTEGER NOT NULL REFERENCES instruments(id),
    qty REAL NOT NULL DEFAULT 0,
    avg_price REAL NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE (account_id, instrument_id)
);
"#;

const CREATE_TRADES_TABLE: &str = r#"
CREATE TABLE trades (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL REFERENCES accounts(id),
    instrument_id INTEGER NOT NULL REFERENCES instruments(id),
    side TEXT NOT NULL CHECK (side IN ('BUY','SELL')),
    qty REAL NOT NULL,
    price REAL NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX ix_trades_account_time ON trades(account_id, created_at);
"#;
