//! Request logging middleware and activation audit events.
//!
//! Every request gets a UUID that is attached to its tracing span and echoed
//! back in the `X-Request-Id` response header.
//!
//! ```rust,ignore
//! use axum::middleware;
//! use regserver::server::logging::request_logging;
//!
//! let app = Router::new()
//!     .route("/livez", get(livez_handler))
//!     .layer(middleware::from_fn(request_logging));
//! ```

use axum::{
    body::Body,
    extract::Request,
    http::{HeaderValue, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

/// Activation outcomes recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEvent {
    /// A new machine took a seat
    Activated,
    /// A machine already holding a seat activated again
    Reactivated,
    /// A new machine was turned away because every seat is taken
    SeatLimitRejected,
    /// A machine reported its installed product version
    VersionReported,
}

impl std::fmt::Display for ActivationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActivationEvent::Activated => "activated",
            ActivationEvent::Reactivated => "reactivated",
            ActivationEvent::SeatLimitRejected => "seat_limit_rejected",
            ActivationEvent::VersionReported => "version_reported",
        };
        write!(f, "{}", s)
    }
}

/// Log an activation event against a license key.
///
/// Rejections are logged at `warn`, everything else at `info`.
pub fn log_license_event(event: ActivationEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %license_key,
    );
    let _enter = span.enter();

    match event {
        ActivationEvent::SeatLimitRejected => {
            if let Some(d) = details {
                warn!(reason = %d, "License event occurred");
            } else {
                warn!("License event occurred");
            }
        }
        _ => {
            if let Some(d) = details {
                info!(details = %d, "License event occurred");
            } else {
                info!("License event occurred");
            }
        }
    }
}

/// Header name for the request ID.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Middleware that wraps each request in a span carrying a fresh request ID,
/// logs its status and latency, and returns the ID in `X-Request-Id`.
pub async fn request_logging(request: Request, next: Next) -> Response<Body> {
    let request_id = generate_request_id();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let start = Instant::now();
    let response = next.run(request).instrument(span.clone()).await;
    let duration = start.elapsed();

    let _enter = span.enter();
    info!(
        status = %response.status().as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    let (mut parts, body) = response.into_parts();
    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, header_value);
    }

    Response::from_parts(parts, body)
}

/// Body of `/readyz`.
#[derive(Debug, Clone, serde::Serialize)]
pub struct HealthResponse {
    /// "ready" or "unavailable"
    pub status: String,
    pub service: String,
    pub version: String,
    pub database_connected: bool,
}

impl HealthResponse {
    pub fn new(db_connected: bool) -> Self {
        Self {
            status: if db_connected { "ready" } else { "unavailable" }.to_string(),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database_connected: db_connected,
        }
    }
}
