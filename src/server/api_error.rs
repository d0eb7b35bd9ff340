//! Standardized API error responses.
//!
//! All error responses follow this JSON structure:
//!
//! ```json
//! {
//!   "error": {
//!     "code": "SEAT_LIMIT_EXCEEDED",
//!     "message": "license count exceeded: 2 of 2 licenses in use",
//!     "details": { "in_use": 2, "seat_count": 2 }
//!   }
//! }
//! ```
//!
//! The `details` field is optional and may contain additional context.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::LicenseError;

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === License Errors (4xx) ===
    /// License key was not found in the database
    LicenseNotFound,
    /// Every seat of the license is held by another machine
    SeatLimitExceeded,

    // === Validation Errors (400) ===
    /// Request payload is invalid or malformed
    InvalidRequest,
    /// A field value is invalid
    InvalidField,

    // === Authentication Errors (401) ===
    /// No `X-License-Key` header was sent
    MissingLicenseKey,
    /// The `X-License-Key` header names no license
    InvalidLicenseKey,

    // === Resource Errors (404) ===
    /// Requested resource was not found
    NotFound,

    // === Server Errors (5xx) ===
    /// Database operation failed
    DatabaseError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest | ErrorCode::InvalidField => StatusCode::BAD_REQUEST,

            ErrorCode::MissingLicenseKey | ErrorCode::InvalidLicenseKey => {
                StatusCode::UNAUTHORIZED
            }

            ErrorCode::LicenseNotFound | ErrorCode::NotFound => StatusCode::NOT_FOUND,

            ErrorCode::SeatLimitExceeded => StatusCode::CONFLICT,

            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::LicenseNotFound => "The requested license does not exist",
            ErrorCode::SeatLimitExceeded => "All license seats are in use",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::InvalidField => "A field value is invalid",
            ErrorCode::MissingLicenseKey => "X-License-Key header is required",
            ErrorCode::InvalidLicenseKey => "License key is not valid",
            ErrorCode::NotFound => "The requested resource was not found",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Top-level error response returned by all API endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the code's default message.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: code.default_message().to_string(),
                details: None,
            },
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: ErrorCode,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ErrorBody {
                code,
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    pub fn license_not_found() -> Self {
        Self::new(ErrorCode::LicenseNotFound)
    }

    pub fn missing_license_key() -> Self {
        Self::new(ErrorCode::MissingLicenseKey)
    }

    pub fn invalid_license_key() -> Self {
        Self::new(ErrorCode::InvalidLicenseKey)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::with_message(ErrorCode::InvalidRequest, message)
    }

    /// Database error (internal details hidden from client).
    pub fn database_error() -> Self {
        Self::new(ErrorCode::DatabaseError)
    }

    pub fn internal_error() -> Self {
        Self::new(ErrorCode::InternalError)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.error.code.default_message(),
            self.error.message
        )
    }
}

impl std::error::Error for ApiError {}

/// Unreadable or mistyped JSON bodies answer with the standard envelope.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_request(rejection.body_text())
    }
}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        let message = err.to_string();
        match err {
            LicenseError::NotFound(what) if what == "license" => ApiError::license_not_found(),
            LicenseError::NotFound(_) => ApiError::with_message(ErrorCode::NotFound, message),
            LicenseError::SeatLimitExceeded { in_use, seat_count } => ApiError::with_details(
                ErrorCode::SeatLimitExceeded,
                message,
                serde_json::json!({ "in_use": in_use, "seat_count": seat_count }),
            ),
            LicenseError::ValidationError(msg) => ApiError::with_message(ErrorCode::InvalidField, msg),
            LicenseError::StorageError(_) => ApiError::database_error(),
            LicenseError::ConfigError(_) => ApiError::new(ErrorCode::ConfigError),
            LicenseError::NetworkError(_)
            | LicenseError::ServerError(_)
            | LicenseError::IoError(_)
            | LicenseError::SerializationError(_) => ApiError::internal_error(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(
            ErrorCode::LicenseNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ErrorCode::SeatLimitExceeded.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ErrorCode::InvalidField.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ErrorCode::MissingLicenseKey.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn seat_limit_carries_usage_details() {
        let api_err: ApiError = LicenseError::SeatLimitExceeded {
            in_use: 2,
            seat_count: 2,
        }
        .into();
        assert_eq!(api_err.error.code, ErrorCode::SeatLimitExceeded);
        assert!(api_err.error.message.contains("2 of 2"));
        let details = api_err.error.details.unwrap();
        assert_eq!(details["in_use"], 2);
        assert_eq!(details["seat_count"], 2);
    }

    #[test]
    fn storage_details_are_hidden() {
        let api_err: ApiError =
            LicenseError::StorageError("no such table: license".to_string()).into();
        assert_eq!(api_err.error.code, ErrorCode::DatabaseError);
        let json = serde_json::to_string(&api_err).unwrap();
        assert!(!json.contains("no such table"));
    }

    #[test]
    fn not_found_distinguishes_license() {
        let api_err: ApiError = LicenseError::not_found("license").into();
        assert_eq!(api_err.error.code, ErrorCode::LicenseNotFound);
        let api_err: ApiError = LicenseError::not_found("machine").into();
        assert_eq!(api_err.error.code, ErrorCode::NotFound);
        assert_eq!(api_err.error.message, "machine not found");
    }
}
