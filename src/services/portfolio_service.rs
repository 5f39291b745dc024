//! Portfolio valuation
//!
//! Marks every open position to its latest stored close. Equity feeds
//! the leaderboard ranking, so a single missing price fails the whole
//! valuation rather than producing a partial number.

use crate::config::DAILY_INTERVAL;
use crate::error::{AppError, Result};
use crate::state::AppState;
use serde::{Deserialize, Serialize};

/// One open position marked to market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioPosition {
    pub secid: String,
    pub name: String,
    pub qty: f64,
    pub avg_price: f64,
    pub last: f64,
    pub cost: f64,
    pub value: f64,
    pub pnl_abs: f64,
    pub pnl_pct: f64,
}

/// Aggregates across all open positions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub total_cost: f64,
    pub positions_value: f64,
    pub pnl_abs: f64,
    pub pnl_pct: f64,
    pub equity: f64,
}

/// Full account valuation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioView {
    pub account_id: i64,
    pub cash: f64,
    pub summary: PortfolioSummary,
    pub positions: Vec<PortfolioPosition>,
}

/// Portfolio service for business logic
pub struct PortfolioService;

impl PortfolioService {
    /// Value all open positions at their latest stored closes.
    pub fn get_portfolio(state: &AppState, account_id: i64) -> Result<PortfolioView> {
        let board = &state.config.board;

        let account = state
            .db
            .get_account(account_id)?
            .ok_or_else(|| AppError::NotFound(format!("account {}", account_id)))?;

        let mut positions = Vec::new();
        let mut total_cost = 0.0;
        let mut positions_value = 0.0;

        for held in state.db.list_positions(account_id, board)? {
            if held.qty <= 0.0 {
                continue;
            }

            let (_, last) = state
                .db
                .latest_close(&held.secid, board, DAILY_INTERVAL)?
                .ok_or_else(|| {
                    AppError::PriceUnavailable(format!(
                        "no candles stored for held instrument {}",
                        held.secid
                    ))
                })?;

            let cost = held.qty * held.avg_price;
            let value = held.qty * last;
            let pnl_abs = value - cost;
            let pnl_pct = if cost > 0.0 { pnl_abs / cost * 100.0 } else { 0.0 };

            total_cost += cost;
            positions_value += value;

            positions.push(PortfolioPosition {
                secid: held.secid,
                name: held.name,
                qty: held.qty,
                avg_price: held.avg_price,
                last,
                cost,
                value,
                pnl_abs,
                pnl_pct,
            });
        }

        let pnl_abs = positions_value - total_cost;
        let pnl_pct = if total_cost > 0.0 {
            pnl_abs / total_cost * 100.0
        } else {
            0.0
        };

        Ok(PortfolioView {
            account_id: account.id,
            cash: account.cash,
            summary: PortfolioSummary {
                total_cost,
                positions_value,
                pnl_abs,
                pnl_pct,
                equity: account.cash + positions_value,
            },
            positions,
        })
    }
}
