//! Services Layer
//!
//! Business logic between the route handlers and the storage/feed
//! collaborators. Route handlers stay thin; staleness decisions, order
//! validation, and valuation all live here.
//!
//! # Services
//!
//! - `MarketDataService` - candle cache, line series, last close
//! - `InstrumentService` - reference-data directory refresh
//! - `PopularService` - most-traded instruments of the day
//! - `TradingService` - buy/sell orders against the ledger
//! - `PortfolioService` - mark-to-market valuation
//! - `LeaderboardService` - equity ranking across accounts

pub mod instrument_service;
pub mod leaderboard_service;
pub mod market_service;
pub mod popular_service;
pub mod portfolio_service;
pub mod trading_service;

// Re-export commonly used types and services
pub use instrument_service::InstrumentService;
pub use leaderboard_service::{LeaderboardEntry, LeaderboardService};
pub use market_service::{CandleSeries, CandleSource, LastClose, LinePoint, LineSeries, MarketDataService};
pub use popular_service::{PopularItem, PopularService};
pub use portfolio_service::{PortfolioPosition, PortfolioService, PortfolioSummary, PortfolioView};
pub use trading_service::{OrderReceipt, OrderSide, PositionSnapshot, TradingService};
