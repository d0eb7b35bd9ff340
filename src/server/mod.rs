//! Server-side components.
//!
//! - `database`      → DB abstraction over SQLite/Postgres
//! - `schema`        → table bootstrap for a fresh database
//! - `machines`      → machine registry (get-or-create inside a transaction)
//! - `registrations` → registration upsert keyed by (machine, product)
//! - `activation`    → activation orchestrator
//! - `handlers`      → Axum HTTP handlers for the client API
//! - `api_error`     → JSON error bodies and status mapping
//! - `routes`        → router builder
//! - `logging`       → request logging middleware and activation audit events

pub mod activation;
pub mod api_error;
pub mod database;
pub mod handlers;
pub mod logging;
pub mod machines;
pub mod registrations;
pub mod routes;
pub mod schema;

pub use activation::ActivationService;
pub use api_error::{ApiError, ErrorCode};
pub use database::{Database, DbTransaction};
pub use handlers::{AppState, LICENSE_KEY_HEADER};
pub use routes::build_router;
pub use schema::ensure_schema;
