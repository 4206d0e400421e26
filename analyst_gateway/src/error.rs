//! Error types for the analyst gateway

use std::time::Duration;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[derive(Error, Debug)]
pub enum GatewayError {

    // =============================
    // Contract Violations
    // =============================

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // Collaborator Failures
    // =============================

    #[error("Upstream call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Market data error: {0}")]
    MarketData(String),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl GatewayError {
    /// True for errors the caller caused by sending a malformed request.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, GatewayError::InvalidRequest(_))
    }
}
