//! Equity leaderboard
//!
//! Ranks every account by cash plus mark-to-market position value.
//! Latest closes are resolved once for the whole board, not per account.
//! Unlike the strict portfolio valuation, a missing price contributes
//! zero here: ranking stays best-effort.

use crate::config::DAILY_INTERVAL;
use crate::error::Result;
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Largest leaderboard a caller can request.
pub const MAX_LEADERBOARD: usize = 100;

/// One ranked account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub account_id: i64,
    pub owner_id: i64,
    pub cash: f64,
    pub equity: f64,
}

/// Leaderboard service for business logic
pub struct LeaderboardService;

impl LeaderboardService {
    /// Top accounts by equity, rank 1 first.
    pub fn top(state: &AppState, top: usize) -> Result<Vec<LeaderboardEntry>> {
        let top = top.clamp(1, MAX_LEADERBOARD);
        let board = &state.config.board;

        let last_by_secid = state.db.latest_closes(board, DAILY_INTERVAL)?;

        let mut value_by_account: HashMap<i64, f64> = HashMap::new();
        for (account_id, secid, qty) in state.db.positions_by_board(board)? {
            if qty <= 0.0 {
                continue;
            }
            let last = last_by_secid.get(&secid).copied().unwrap_or(0.0);
            *value_by_account.entry(account_id).or_insert(0.0) += qty * last;
        }

        let mut entries: Vec<LeaderboardEntry> = state
            .db
            .all_accounts()?
            .into_iter()
            .map(|acc| {
                let value = value_by_account.get(&acc.id).copied().unwrap_or(0.0);
                LeaderboardEntry {
                    rank: 0,
                    account_id: acc.id,
                    owner_id: acc.owner_id,
                    cash: acc.cash,
                    equity: acc.cash + value,
                }
            })
            .collect();

        entries.sort_by(|a, b| {
            b.equity
                .partial_cmp(&a.equity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries.truncate(top);
        for (i, entry) in entries.iter_mut().enumerate() {
            entry.rank = (i + 1) as u32;
        }

        Ok(entries)
    }
}
