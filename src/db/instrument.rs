//! Instrument reference data
//!
//! One row per (secid, board). Refreshes overwrite the descriptive
//! attributes, never the identity.

use crate::db::models::{Instrument, InstrumentUpsert};
use crate::db::{fmt_ts, parse_ts};
use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Bulk-upsert reference rows by (secid, board).
pub fn upsert_instruments(
    conn: &mut Connection,
    board: &str,
    rows: &[InstrumentUpsert],
    now: DateTime<Utc>,
) -> Result<usize> {
    if rows.is_empty() {
        return Ok(0);
    }

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO instruments (secid, board, name, shortname, isin, lotsize, refreshed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (secid, board) DO UPDATE SET
                 name = excluded.name,
                 shortname = excluded.shortname,
                 isin = excluded.isin,
                 lotsize = excluded.lotsize,
                 refreshed_at = excluded.refreshed_at",
        )?;

        for row in rows {
            stmt.execute(params![
                row.secid.trim().to_uppercase(),
                board,
                row.name,
                row.shortname,
                row.isin,
                row.lotsize,
                fmt_ts(now),
            ])?;
        }
    }
    tx.commit()?;

    tracing::info!("Upserted {} instruments on {}", rows.len(), board);
    Ok(rows.len())
}

/// Point read by (secid, board).
pub fn get_instrument(conn: &Connection, secid: &str, board: &str) -> Result<Option<Instrument>> {
    let row = conn
        .query_row(
            "SELECT id, secid, board, name, shortname, isin, lotsize, refreshed_at
             FROM instruments WHERE secid = ?1 AND board = ?2",
            params![secid.trim().to_uppercase(), board],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, i64>(6)?,
                    row.get::<_, String>(7)?,
                ))
            },
        )
        .optional()?;

    Ok(row.and_then(
        |(id, secid, board, name, shortname, isin, lotsize, refreshed)| {
            Some(Instrument {
                id,
                secid,
                board,
                name,
                shortname,
                isin,
                lotsize,
                refreshed_at: parse_ts(&refreshed)?,
            })
        },
    ))
}

/// Newest refresh timestamp across the whole directory.
pub fn directory_refreshed_at(conn: &Connection) -> Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT refreshed_at FROM instruments ORDER BY refreshed_at DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .optional()?;

    Ok(raw.as_deref().and_then(parse_ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteDb;
    use chrono::TimeZone;

    fn upsert(secid: &str, name: &str, lotsize: i64) -> InstrumentUpsert {
        InstrumentUpsert {
            secid: secid.to_string(),
            name: name.to_string(),
            shortname: name.to_string(),
            isin: format!("RU000{}", secid),
            lotsize,
        }
    }

    #[test]
    fn refetch_overwrites_attributes_not_identity() {
        let db = SqliteDb::open_in_memory().unwrap();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(1);

        db.upsert_instruments("TQBR", &[upsert("SBER", "Sberbank", 10)], t0)
            .unwrap();
        db.upsert_instruments("TQBR", &[upsert("SBER", "Sberbank PAO", 100)], t1)
            .unwrap();

        let inst = db.get_instrument("sber", "TQBR").unwrap().unwrap();
        assert_eq!(inst.secid, "SBER");
        assert_eq!(inst.name, "Sberbank PAO");
        assert_eq!(inst.lotsize, 100);
        assert_eq!(inst.refreshed_at, t1);
    }

    #[test]
    fn same_secid_on_two_boards_stays_two_rows() {
        let db = SqliteDb::open_in_memory().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();

        db.upsert_instruments("TQBR", &[upsert("SBER", "Sberbank", 10)], now)
            .unwrap();
        db.upsert_instruments("SMAL", &[upsert("SBER", "Sberbank lots", 1)], now)
            .unwrap();

        assert_eq!(
            db.get_instrument("SBER", "TQBR").unwrap().unwrap().lotsize,
            10
        );
        assert_eq!(
            db.get_instrument("SBER", "SMAL").unwrap().unwrap().lotsize,
            1
        );
    }

    #[test]
    fn directory_refreshed_at_tracks_newest_row() {
        let db = SqliteDb::open_in_memory().unwrap();
        assert!(db.directory_refreshed_at().unwrap().is_none());

        let t0 = Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap();
        let t1 = t0 + chrono::Duration::hours(3);

        db.upsert_instruments("TQBR", &[upsert("SBER", "Sberbank", 10)], t0)
            .unwrap();
        db.upsert_instruments("TQBR", &[upsert("GAZP", "Gazprom", 10)], t1)
            .unwrap();

        assert_eq!(db.directory_refreshed_at().unwrap(), Some(t1));
    }
}
