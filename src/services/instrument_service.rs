//! Instrument directory service
//!
//! Reference data has a single whole-table freshness notion: the newest
//! refresh timestamp across all instruments. A stale directory is
//! refetched in bulk and upserted by (secid, board).

use crate::db::models::{Instrument, InstrumentUpsert};
use crate::error::Result;
use crate::feed::table::{self, FeedRow};
use crate::state::AppState;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

/// Instrument directory service for business logic
pub struct InstrumentService;

impl InstrumentService {
    /// Refetch reference data for `secids` when the directory is stale.
    ///
    /// Returns whether a refresh actually happened.
    pub async fn refresh_if_stale(state: &AppState, secids: &[String]) -> Result<bool> {
        if secids.is_empty() {
            return Ok(false);
        }

        let now = state.clock.now();
        if Self::directory_is_fresh(state, now)? {
            return Ok(false);
        }

        let rows = state.feed.security_info(secids).await?;
        let upserts: Vec<InstrumentUpsert> = rows.iter().filter_map(instrument_from_row).collect();
        let count = state
            .db
            .upsert_instruments(&state.config.board, &upserts, now)?;

        info!("Instrument directory refreshed: {} rows", count);
        Ok(true)
    }

    /// Warm the directory from the board's full listing, page by page.
    pub async fn load_board(state: &AppState) -> Result<usize> {
        let now = state.clock.now();
        let page_size = state.config.marketdata_page_size;
        let mut total = 0;

        for page in 0..state.config.marketdata_max_pages {
            let start = page * page_size;
            let rows = state.feed.board_securities(page_size, start).await?;
            if rows.is_empty() {
                break;
            }

            let short = rows.len() < page_size;
            let upserts: Vec<InstrumentUpsert> =
                rows.iter().filter_map(instrument_from_row).collect();
            total += state
                .db
                .upsert_instruments(&state.config.board, &upserts, now)?;
            if short {
                break;
            }
        }

        info!("Loaded {} instruments from board listing", total);
        Ok(total)
    }

    /// Point read of one instrument's reference data.
    pub fn get_instrument(state: &AppState, secid: &str) -> Result<Option<Instrument>> {
        state.db.get_instrument(secid, &state.config.board)
    }

    fn directory_is_fresh(state: &AppState, now: DateTime<Utc>) -> Result<bool> {
        let refreshed = state.db.directory_refreshed_at()?;

        Ok(match refreshed {
            Some(ts) => now - ts <= Duration::hours(state.config.directory_max_age_hours),
            None => false,
        })
    }
}

/// Reference row with the directory's name fallbacks applied:
/// NAME, then SHORTNAME, then the SECID itself.
fn instrument_from_row(row: &FeedRow) -> Option<InstrumentUpsert> {
    let secid = table::pick_str(row, &["SECID"])?.trim().to_uppercase();
    if secid.is_empty() {
        return None;
    }

    let shortname = table::pick_str(row, &["SHORTNAME"]).unwrap_or_default();
    let name = table::pick_str(row, &["NAME"])
        .or_else(|| (!shortname.is_empty()).then(|| shortname.clone()))
        .unwrap_or_else(|| secid.clone());

    Some(InstrumentUpsert {
        secid,
        name,
        shortname,
        isin: table::pick_str(row, &["ISIN"]).unwrap_or_default(),
        lotsize: table::pick_f64(row, &["LOTSIZE"])
            .map(|v| v as i64)
            .filter(|v| *v > 0)
            .unwrap_or(1),
    })
}
