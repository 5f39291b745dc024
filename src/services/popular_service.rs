//! Most-traded instruments of the day
//!
//! Sweeps the board's quote snapshots page by page, keeps the best row
//! per instrument, and joins display names from the (possibly just
//! refreshed) instrument directory.

use crate::error::Result;
use crate::feed::popular;
use crate::feed::table::FeedRow;
use crate::services::InstrumentService;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One leaderboard row of the popular-today view
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PopularItem {
    pub secid: String,
    pub name: String,
    pub last: f64,
    pub valtoday: f64,
    pub time: Option<String>,
}

/// Popular instruments service for business logic
pub struct PopularService;

impl PopularService {
    /// Top instruments by traded turnover, with display names.
    pub async fn popular_today(state: &AppState, top: usize) -> Result<Vec<PopularItem>> {
        let rows = Self::sweep_marketdata(state).await?;
        let quotes = popular::rank_by_turnover(&rows, top);

        let secids: Vec<String> = quotes.iter().map(|q| q.secid.clone()).collect();
        InstrumentService::refresh_if_stale(state, &secids).await?;

        let mut items = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let name = state
                .db
                .get_instrument(&quote.secid, &state.config.board)?
                .map(|i| i.name)
                .unwrap_or_else(|| quote.secid.clone());

            items.push(PopularItem {
                secid: quote.secid,
                name,
                last: quote.last,
                valtoday: quote.valtoday,
                time: quote.time,
            });
        }

        info!("Popular-today ranked {} instruments", items.len());
        Ok(items)
    }

    /// All quote snapshot pages for the board, in upstream order.
    async fn sweep_marketdata(state: &AppState) -> Result<Vec<FeedRow>> {
        let page_size = state.config.marketdata_page_size;
        let mut rows = Vec::new();

        for page in 0..state.config.marketdata_max_pages {
            let start = page * page_size;
            let chunk = state.feed.marketdata_page(page_size, start).await?;
            if chunk.is_empty() {
                break;
            }
            let short = chunk.len() < page_size;
            rows.extend(chunk);
            if short {
                break;
            }
        }

        Ok(rows)
    }
}
