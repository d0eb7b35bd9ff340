//! Shared fixtures for the integration tests: an in-memory SQLite database
//! seeded with one customer, one product, its features and a license.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use regserver::server::{ensure_schema, ActivationService, AppState, Database};

pub const SECRET: &str = "integration-secret";
pub const LICENSE_KEY: &str = "WIDGET-ACME-0001";
pub const PRODUCT_GUID: &str = "6F9619FF-8B86-D011-B42D-00C04FC964FF";
pub const DOWNLOAD_URL: &str = "https://downloads.example.com/widget-1.4.0.zip";
pub const LICENSE_EXPIRES: &str = "2099-12-31";
pub const MAINT_EXPIRES: &str = "2099-06-30";

#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub customer_id: i64,
    pub product_id: i64,
    pub edition_feature_id: i64,
}

pub async fn memory_db() -> Arc<Database> {
    // One connection: every `sqlite::memory:` connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("failed to open in-memory SQLite");
    let db = Arc::new(Database::SQLite(pool));
    ensure_schema(&db).await.expect("failed to create schema");
    db
}

/// A SQLite file shared by `max_connections` pooled connections, so
/// concurrent transactions really contend for the database write lock.
pub async fn file_db(dir: &Path, max_connections: u32) -> Arc<Database> {
    let url = format!("sqlite://{}?mode=rwc", dir.join("regserver.db").display());
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await
        .expect("failed to open SQLite file");
    let db = Arc::new(Database::SQLite(pool));
    ensure_schema(&db).await.expect("failed to create schema");
    db
}

pub fn pool(db: &Database) -> &SqlitePool {
    match db {
        Database::SQLite(pool) => pool,
        #[cfg(feature = "postgres")]
        _ => panic!("integration tests run against SQLite"),
    }
}

/// Seed a customer, a product with two features, an `Edition=Pro` override
/// and a license with `seats` seats.
pub async fn seed(db: &Database, seats: i64) -> Fixture {
    let pool = pool(db);

    let customer_id: i64 =
        sqlx::query_scalar("INSERT INTO customer (customer_name) VALUES ('Acme Corp') RETURNING customer_id")
            .fetch_one(pool)
            .await
            .unwrap();

    let product_id: i64 = sqlx::query_scalar(
        "INSERT INTO product (product_name, product_guid, latest_version, download_url) \
         VALUES ('Widget', ?, '1.4.0', ?) RETURNING product_id",
    )
    .bind(PRODUCT_GUID)
    .bind(DOWNLOAD_URL)
    .fetch_one(pool)
    .await
    .unwrap();

    let edition_feature_id: i64 = sqlx::query_scalar(
        "INSERT INTO feature (product_id, feature_name, feature_type, allowed_values, default_value) \
         VALUES (?, 'Edition', 2, 'Standard|Pro', 'Standard') RETURNING feature_id",
    )
    .bind(product_id)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO feature (product_id, feature_name, feature_type, allowed_values, default_value) \
         VALUES (?, 'MaxProjects', 0, '', '5')",
    )
    .bind(product_id)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO license (customer_id, product_id, license_key, license_count, \
         is_subscription, license_term, start_date, expiration_date, \
         maint_expiration_date, max_product_version) \
         VALUES (?, ?, ?, ?, 0, 0, '2024-01-01', ?, ?, '2.0.0')",
    )
    .bind(customer_id)
    .bind(product_id)
    .bind(LICENSE_KEY)
    .bind(seats)
    .bind(LICENSE_EXPIRES)
    .bind(MAINT_EXPIRES)
    .execute(pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO license_feature (customer_id, product_id, feature_id, feature_value) \
         VALUES (?, ?, ?, 'Pro')",
    )
    .bind(customer_id)
    .bind(product_id)
    .bind(edition_feature_id)
    .execute(pool)
    .await
    .unwrap();

    Fixture {
        customer_id,
        product_id,
        edition_feature_id,
    }
}

pub async fn service(seats: i64) -> (ActivationService, Fixture) {
    let db = memory_db().await;
    let fixture = seed(&db, seats).await;
    (ActivationService::new(db, SECRET), fixture)
}

pub async fn app_state(seats: i64) -> (AppState, Fixture) {
    let db = memory_db().await;
    let fixture = seed(&db, seats).await;
    (AppState::new(db, SECRET), fixture)
}

pub async fn count(db: &Database, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool(db)).await.unwrap()
}
