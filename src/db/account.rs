//! Accounts, positions, and trade history reads

use crate::db::models::{Account, PositionView, Trade};
use crate::db::{fmt_ts, parse_ts};
use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, i64, f64, String)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn build_account(raw: (i64, i64, f64, String)) -> Option<Account> {
    let (id, owner_id, cash, created) = raw;
    Some(Account {
        id,
        owner_id,
        cash,
        created_at: parse_ts(&created)?,
    })
}

/// Create the owner's account with starting cash if it does not exist.
pub fn ensure_account(
    conn: &Connection,
    owner_id: i64,
    starting_cash: f64,
    now: DateTime<Utc>,
) -> Result<Account> {
    let inserted = conn.execute(
        "INSERT INTO accounts (owner_id, cash, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (owner_id) DO NOTHING",
        params![owner_id, starting_cash, fmt_ts(now)],
    )?;
    if inserted > 0 {
        tracing::info!("Created account for owner {}", owner_id);
    }

    get_account_by_owner(conn, owner_id)?
        .ok_or_else(|| AppError::NotFound(format!("account for owner {}", owner_id)))
}

pub fn get_account(conn: &Connection, account_id: i64) -> Result<Option<Account>> {
    let raw = conn
        .query_row(
            "SELECT id, owner_id, cash, created_at FROM accounts WHERE id = ?1",
            params![account_id],
            account_from_row,
        )
        .optional()?;

    Ok(raw.and_then(build_account))
}

pub fn get_account_by_owner(conn: &Connection, owner_id: i64) -> Result<Option<Account>> {
    let raw = conn
        .query_row(
            "SELECT id, owner_id, cash, created_at FROM accounts WHERE owner_id = ?1",
            params![owner_id],
            account_from_row,
        )
        .optional()?;

    Ok(raw.and_then(build_account))
}

pub fn all_accounts(conn: &Connection) -> Result<Vec<Account>> {
    let mut stmt = conn.prepare("SELECT id, owner_id, cash, created_at FROM accounts ORDER BY id")?;

    let raw = stmt
        .query_map([], account_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(raw.into_iter().filter_map(build_account).collect())
}

/// (qty, avg_price) for one symbol, if the account ever held it.
pub fn position_for(
    conn: &Connection,
    account_id: i64,
    secid: &str,
    board: &str,
) -> Result<Option<(f64, f64)>> {
    let row = conn
        .query_row(
            "SELECT p.qty, p.avg_price
             FROM positions p
             JOIN instruments i ON i.id = p.instrument_id
             WHERE p.account_id = ?1 AND i.secid = ?2 AND i.board = ?3",
            params![account_id, secid.trim().to_uppercase(), board],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    Ok(row)
}

/// All positions for the account, with instrument identity joined in.
pub fn list_positions(conn: &Connection, account_id: i64, board: &str) -> Result<Vec<PositionView>> {
    let mut stmt = conn.prepare(
        "SELECT i.secid, i.name, p.qty, p.avg_price
         FROM positions p
         JOIN instruments i ON i.id = p.instrument_id
         WHERE p.account_id = ?1 AND i.board = ?2
         ORDER BY i.secid ASC",
    )?;

    let positions = stmt
        .query_map(params![account_id, board], |row| {
            Ok(PositionView {
                secid: row.get(0)?,
                name: row.get(1)?,
                qty: row.get(2)?,
                avg_price: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(positions)
}

/// Every position on the board across all accounts, for ranking.
pub fn positions_by_board(conn: &Connection, board: &str) -> Result<Vec<(i64, String, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT p.account_id, i.secid, p.qty
         FROM positions p
         JOIN instruments i ON i.id = p.instrument_id
         WHERE i.board = ?1",
    )?;

    let rows = stmt
        .query_map(params![board], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Most recent trades first.
pub fn list_trades(conn: &Connection, account_id: i64, limit: usize) -> Result<Vec<Trade>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.account_id, i.secid, t.side, t.qty, t.price, t.created_at
         FROM trades t
         JOIN instruments i ON i.id = t.instrument_id
         WHERE t.account_id = ?1
         ORDER BY t.created_at DESC, t.id DESC
         LIMIT ?2",
    )?;

    let raw = stmt
        .query_map(params![account_id, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, f64>(5)?,
                row.get::<_, String>(6)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(raw
        .into_iter()
        .filter_map(|(id, account_id, secid, side, qty, price, created)| {
            Some(Trade {
                id,
                account_id,
                secid,
                side,
                qty,
                price,
                created_at: parse_ts(&created)?,
            })
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use chrono::TimeZone;

    #[test]
    fn ensure_account_creates_once_with_starting_cash() {
        let db = SqliteDb::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();

        let first = db.ensure_account(42, 10_000.0, now).unwrap();
        assert_eq!(first.cash, 10_000.0);
        assert_eq!(first.owner_id, 42);

        // Second authentication must not reset the balance.
        let again = db.ensure_account(42, 99_999.0, now).unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.cash, 10_000.0);
    }

    #[test]
    fn position_for_unknown_symbol_is_none() {
        let db = SqliteDb::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let acc = db.ensure_account(1, 10_000.0, now).unwrap();

        assert!(db.position_for(acc.id, "SBER", "TQBR").unwrap().is_none());
    }
}
