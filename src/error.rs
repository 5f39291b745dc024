//! Application error types

use serde::Serialize;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Upstream feed unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed feed response: {0}")]
    MalformedResponse(String),

    #[error("Price unavailable: {0}")]
    PriceUnavailable(String),

    #[error("Insufficient funds: need {need:.2}, have {have:.2}")]
    InsufficientFunds { need: f64, have: f64 },

    #[error("Insufficient position: want {want}, have {have}")]
    InsufficientPosition { want: f64, have: f64 },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::UpstreamUnavailable(err.to_string())
    }
}

/// Serializable error response for the embedding layer
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(err: AppError) -> Self {
        let code = match &err {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            AppError::PriceUnavailable(_) => "PRICE_UNAVAILABLE",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::InsufficientPosition { .. } => "INSUFFICIENT_POSITION",
            AppError::InvalidOrder(_) => "INVALID_ORDER",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_code_and_message() {
        let err = AppError::InsufficientFunds {
            need: 1500.0,
            have: 1000.0,
        };
        let resp = ErrorResponse::from(err);

        assert_eq!(resp.code, "INSUFFICIENT_FUNDS");
        assert!(resp.message.contains("1500"));
    }

    #[test]
    fn not_found_maps_to_not_found_code() {
        let resp = ErrorResponse::from(AppError::NotFound("instrument SBER".to_string()));
        assert_eq!(resp.code, "NOT_FOUND");
    }
}
