//! Trading service
//!
//! Validates order parameters, resolves the execution price, and hands
//! the order to the transactional ledger. Orders are rejected before any
//! state is touched; an accepted order settles cash, position, and the
//! trade record in one unit.

use crate::config::DAILY_INTERVAL;
use crate::db::models::{Account, Trade};
use crate::error::{AppError, Result};
use crate::state::AppState;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Order direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

/// Accepted order, with resulting balances
#[derive(Debug, Clone, Serialize)]
pub struct OrderReceipt {
    pub side: OrderSide,
    pub secid: String,
    pub qty: f64,
    pub price: f64,
    pub cash_after: f64,
    pub position_qty: f64,
    pub position_avg_price: f64,
}

/// Current holding for one symbol; zeroes when the account never held it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSnapshot {
    pub secid: String,
    pub qty: f64,
    pub avg_price: f64,
}

/// Trading service for business logic
pub struct TradingService;

impl TradingService {
    /// Buy at the given price, or at the latest stored close.
    pub fn buy(
        state: &AppState,
        account_id: i64,
        secid: &str,
        qty: f64,
        price: Option<f64>,
    ) -> Result<OrderReceipt> {
        Self::place(state, account_id, secid, OrderSide::Buy, qty, price)
    }

    /// Sell at the given price, or at the latest stored close.
    pub fn sell(
        state: &AppState,
        account_id: i64,
        secid: &str,
        qty: f64,
        price: Option<f64>,
    ) -> Result<OrderReceipt> {
        Self::place(state, account_id, secid, OrderSide::Sell, qty, price)
    }

    fn place(
        state: &AppState,
        account_id: i64,
        secid: &str,
        side: OrderSide,
        qty: f64,
        price: Option<f64>,
    ) -> Result<OrderReceipt> {
        if !(qty > 0.0) {
            return Err(AppError::InvalidOrder(format!("qty must be > 0, got {}", qty)));
        }

        let secid = secid.trim().to_uppercase();
        let board = &state.config.board;

        state
            .db
            .get_instrument(&secid, board)?
            .ok_or_else(|| AppError::NotFound(format!("instrument {} ({})", secid, board)))?;

        let px = match price {
            Some(p) => p,
            None => state
                .db
                .latest_close(&secid, board, DAILY_INTERVAL)?
                .map(|(_, close)| close)
                .ok_or_else(|| {
                    AppError::PriceUnavailable(format!(
                        "no candles stored for {}; load candles first",
                        secid
                    ))
                })?,
        };
        if !(px > 0.0) {
            return Err(AppError::InvalidOrder(format!("price must be > 0, got {}", px)));
        }

        let now = state.clock.now();
        let fill = match side {
            OrderSide::Buy => state.db.buy(account_id, &secid, board, qty, px, now)?,
            OrderSide::Sell => state.db.sell(account_id, &secid, board, qty, px, now)?,
        };

        info!(
            "Order settled: {} {} x{} @ {} account={}",
            side.as_str(),
            fill.secid,
            qty,
            px,
            account_id
        );

        Ok(OrderReceipt {
            side,
            secid: fill.secid,
            qty: fill.qty,
            price: fill.price,
            cash_after: fill.cash_after,
            position_qty: fill.position_qty,
            position_avg_price: fill.position_avg_price,
        })
    }

    /// Account bootstrap at first authentication.
    pub fn ensure_account(state: &AppState, owner_id: i64) -> Result<Account> {
        state
            .db
            .ensure_account(owner_id, state.config.starting_cash, state.clock.now())
    }

    /// Holding for one symbol; an absent position reads as flat.
    pub fn position(state: &AppState, account_id: i64, secid: &str) -> Result<PositionSnapshot> {
        let secid = secid.trim().to_uppercase();
        let held = state
            .db
            .position_for(account_id, &secid, &state.config.board)?;

        let (qty, avg_price) = held.unwrap_or((0.0, 0.0));
        Ok(PositionSnapshot {
            secid,
            qty,
            avg_price,
        })
    }

    /// Trade history, most recent first.
    pub fn trades(state: &AppState, account_id: i64, limit: usize) -> Result<Vec<Trade>> {
        state.db.list_trades(account_id, limit)
    }
}
