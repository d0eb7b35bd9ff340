//! Table bootstrap for a fresh database.
//!
//! Creates the tables the activation engine reads and writes when they are
//! absent. This is not a migration engine: existing tables are left untouched.
//!
//! `license_feature.feature_id` deliberately has no foreign key: deleting a
//! feature definition leaves its overrides behind, and feature merge skips them.

use sqlx::query;
use tracing::info;

use crate::errors::LicenseResult;
use crate::server::database::{db_err, Database};

#[cfg(feature = "sqlite")]
const SQLITE_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customer (
        customer_id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_name TEXT NOT NULL UNIQUE COLLATE NOCASE
    )",
    "CREATE TABLE IF NOT EXISTS product (
        product_id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_name TEXT NOT NULL UNIQUE COLLATE NOCASE,
        product_guid TEXT NOT NULL UNIQUE COLLATE NOCASE,
        latest_version TEXT NOT NULL DEFAULT '',
        download_url TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS machine (
        machine_id INTEGER PRIMARY KEY AUTOINCREMENT,
        customer_id INTEGER NOT NULL,
        machine_code TEXT NOT NULL,
        user_name TEXT NOT NULL DEFAULT '',
        UNIQUE (customer_id, machine_code),
        FOREIGN KEY (customer_id) REFERENCES customer (customer_id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS license (
        customer_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        license_key TEXT NOT NULL COLLATE NOCASE,
        license_count INTEGER NOT NULL,
        is_subscription INTEGER NOT NULL DEFAULT 0,
        license_term INTEGER NOT NULL DEFAULT 0,
        start_date TEXT NOT NULL,
        expiration_date TEXT NOT NULL,
        maint_expiration_date TEXT NOT NULL DEFAULT '9999-12-31',
        max_product_version TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (customer_id, product_id),
        FOREIGN KEY (customer_id) REFERENCES customer (customer_id) ON DELETE CASCADE,
        FOREIGN KEY (product_id) REFERENCES product (product_id) ON DELETE CASCADE
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_license_key ON license (license_key)",
    "CREATE TABLE IF NOT EXISTS registration (
        machine_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        expiration_date TEXT NOT NULL,
        registration_hash TEXT NOT NULL,
        first_registration_date TEXT NOT NULL,
        last_registration_date TEXT NOT NULL,
        installed_version TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (machine_id, product_id),
        FOREIGN KEY (machine_id) REFERENCES machine (machine_id) ON DELETE CASCADE,
        FOREIGN KEY (product_id) REFERENCES product (product_id) ON DELETE CASCADE
    )",
    "CREATE INDEX IF NOT EXISTS idx_registration_product_id ON registration (product_id)",
    "CREATE TABLE IF NOT EXISTS feature (
        feature_id INTEGER PRIMARY KEY AUTOINCREMENT,
        product_id INTEGER NOT NULL,
        feature_name TEXT NOT NULL,
        feature_type INTEGER NOT NULL DEFAULT 0 CHECK (feature_type IN (0, 1, 2)),
        allowed_values TEXT NOT NULL DEFAULT '',
        default_value TEXT NOT NULL DEFAULT '',
        UNIQUE (product_id, feature_name),
        FOREIGN KEY (product_id) REFERENCES product (product_id) ON DELETE CASCADE
    )",
    "CREATE TABLE IF NOT EXISTS license_feature (
        customer_id INTEGER NOT NULL,
        product_id INTEGER NOT NULL,
        feature_id INTEGER NOT NULL,
        feature_value TEXT NOT NULL,
        PRIMARY KEY (customer_id, product_id, feature_id),
        FOREIGN KEY (customer_id, product_id) REFERENCES license (customer_id, product_id) ON DELETE CASCADE
    )",
];

#[cfg(feature = "postgres")]
const POSTGRES_SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS customer (
        customer_id BIGSERIAL PRIMARY KEY,
        customer_name TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE IF NOT EXISTS product (
        product_id BIGSERIAL PRIMARY KEY,
        product_name TEXT NOT NULL UNIQUE,
        product_guid TEXT NOT NULL UNIQUE,
        latest_version TEXT NOT NULL DEFAULT '',
        download_url TEXT NOT NULL DEFAULT ''
    )",
    "CREATE TABLE IF NOT EXISTS machine (
        machine_id BIGSERIAL PRIMARY KEY,
        customer_id BIGINT NOT NULL REFERENCES customer (customer_id) ON DELETE CASCADE,
        machine_code TEXT NOT NULL,
        user_name TEXT NOT NULL DEFAULT '',
        UNIQUE (customer_id, machine_code)
    )",
    "CREATE TABLE IF NOT EXISTS license (
        customer_id BIGINT NOT NULL REFERENCES customer (customer_id) ON DELETE CASCADE,
        product_id BIGINT NOT NULL REFERENCES product (product_id) ON DELETE CASCADE,
        license_key TEXT NOT NULL,
        license_count BIGINT NOT NULL,
        is_subscription BOOLEAN NOT NULL DEFAULT FALSE,
        license_term BIGINT NOT NULL DEFAULT 0,
        start_date TEXT NOT NULL,
        expiration_date TEXT NOT NULL,
        maint_expiration_date TEXT NOT NULL DEFAULT '9999-12-31',
        max_product_version TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (customer_id, product_id)
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_license_key ON license (LOWER(license_key))",
    "CREATE TABLE IF NOT EXISTS registration (
        machine_id BIGINT NOT NULL REFERENCES machine (machine_id) ON DELETE CASCADE,
        product_id BIGINT NOT NULL REFERENCES product (product_id) ON DELETE CASCADE,
        expiration_date TEXT NOT NULL,
        registration_hash TEXT NOT NULL,
        first_registration_date TEXT NOT NULL,
        last_registration_date TEXT NOT NULL,
        installed_version TEXT NOT NULL DEFAULT '',
        PRIMARY KEY (machine_id, product_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_registration_product_id ON registration (product_id)",
    "CREATE TABLE IF NOT EXISTS feature (
        feature_id BIGSERIAL PRIMARY KEY,
        product_id BIGINT NOT NULL REFERENCES product (product_id) ON DELETE CASCADE,
        feature_name TEXT NOT NULL,
        feature_type BIGINT NOT NULL DEFAULT 0 CHECK (feature_type IN (0, 1, 2)),
        allowed_values TEXT NOT NULL DEFAULT '',
        default_value TEXT NOT NULL DEFAULT '',
        UNIQUE (product_id, feature_name)
    )",
    "CREATE TABLE IF NOT EXISTS license_feature (
        customer_id BIGINT NOT NULL,
        product_id BIGINT NOT NULL,
        feature_id BIGINT NOT NULL,
        feature_value TEXT NOT NULL,
        PRIMARY KEY (customer_id, product_id, feature_id),
        FOREIGN KEY (customer_id, product_id)
            REFERENCES license (customer_id, product_id) ON DELETE CASCADE
    )",
];

/// Create any missing tables and indexes.
pub async fn ensure_schema(db: &Database) -> LicenseResult<()> {
    match db {
        #[cfg(feature = "sqlite")]
        Database::SQLite(pool) => {
            for stmt in SQLITE_SCHEMA {
                query(stmt)
                    .execute(pool)
                    .await
                    .map_err(db_err("SQLite ensure_schema"))?;
            }
        }
        #[cfg(feature = "postgres")]
        Database::Postgres(pool) => {
            for stmt in POSTGRES_SCHEMA {
                query(stmt)
                    .execute(pool)
                    .await
                    .map_err(db_err("Postgres ensure_schema"))?;
            }
        }
    }
    info!("Database schema is in place");
    Ok(())
}
