//! Error types shared by the activation engine, the HTTP layer and the client.

use thiserror::Error;

/// Result alias used across the crate.
pub type LicenseResult<T> = Result<T, LicenseError>;

#[derive(Debug, Error)]
pub enum LicenseError {
    /// A license, customer, product, machine or registration is absent.
    #[error("{0} not found")]
    NotFound(String),

    /// Activating a new machine would exceed the license's seat count.
    #[error("license count exceeded: {in_use} of {seat_count} licenses in use")]
    SeatLimitExceeded { in_use: usize, seat_count: i64 },

    /// Malformed license fields or request input. Raised before any write.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Repository or transaction failure. The message is for logs only.
    #[error("storage error: {0}")]
    StorageError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Non-success response from the license server.
    #[error("server error: {0}")]
    ServerError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl LicenseError {
    /// Shorthand for a `NotFound` naming the missing entity.
    pub fn not_found(what: impl Into<String>) -> Self {
        LicenseError::NotFound(what.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        LicenseError::ValidationError(msg.into())
    }

    /// True for the results a caller can act on (missing license, full seats, bad input).
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            LicenseError::NotFound(_)
                | LicenseError::SeatLimitExceeded { .. }
                | LicenseError::ValidationError(_)
        )
    }
}

#[cfg(feature = "server")]
impl From<sqlx::Error> for LicenseError {
    fn from(err: sqlx::Error) -> Self {
        LicenseError::StorageError(err.to_string())
    }
}
