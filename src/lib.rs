//! regserver - per-seat license activation with offline-verifiable entitlements
//!
//! A customer's license grants a number of seats for a product. Each machine
//! that activates takes a seat until its registration expires, and receives an
//! entitlement (dates, version limit, feature values) bound to its machine code
//! by a keyed registration hash that the client can re-check offline.
//!
//! # Features
//!
//! - `server` - Activation engine persistence and HTTP API. Enabled by default.
//! - `sqlite` - SQLite database backend. Enabled by default.
//! - `postgres` - PostgreSQL database backend.
//!
//! # Example
//!
//! ```toml
//! # Use defaults (server + sqlite)
//! regserver = { path = "../regserver" }
//!
//! # Client-only (no server components)
//! regserver = { path = "../regserver", default-features = false }
//!
//! # Server with PostgreSQL
//! regserver = { path = "../regserver", features = ["server", "postgres"] }
//! ```

// Core modules (always available)
pub mod config;
pub mod errors;
pub mod features;
pub mod models;
pub mod registration_hash;
pub mod responses;
pub mod seats;
pub mod version;

// Client-related modules (always available)
pub mod client {
    pub mod api;
    pub mod entitlement;
    pub mod store;
}

// Server-related modules (requires "server" feature)
#[cfg(feature = "server")]
#[path = "server/mod.rs"]
pub mod server;
