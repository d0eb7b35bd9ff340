use std::sync::Arc;

use sqlx::{query, query_as, query_scalar};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, Sqlite, SqlitePool};

#[cfg(feature = "postgres")]
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::features::{FeatureDefinition, FeatureOverride};
use crate::models::{Customer, License, Machine, Product};

/// Log a failed query and turn it into an opaque storage error.
pub(crate) fn db_err(op: &'static str) -> impl FnOnce(sqlx::Error) -> LicenseError {
    move |e| {
        error!("{op} failed: {e}");
        LicenseError::StorageError(format!("database error: {e}"))
    }
}

const LICENSE_COLUMNS: &str = "customer_id, product_id, license_key, license_count, \
     is_subscription, license_term, start_date, expiration_date, \
     maint_expiration_date, max_product_version";

const PRODUCT_COLUMNS: &str = "product_id, product_name, product_guid, latest_version, download_url";

const FEATURE_COLUMNS: &str =
    "feature_id, product_id, feature_name, feature_type, allowed_values, default_value";

/// Unified database abstraction over SQLite and Postgres.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

/// An open write transaction on either backend.
///
/// Dropping it without `commit` rolls back.
pub enum DbTransaction {
    #[cfg(feature = "sqlite")]
    SQLite(sqlx::Transaction<'static, Sqlite>),
    #[cfg(feature = "postgres")]
    Postgres(sqlx::Transaction<'static, Postgres>),
}

impl Database {
    /// Connect using the given database configuration.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::StorageError(format!("failed to connect to SQLite: {e}"))
                    })?;
                info!("Connected to SQLite at {}", config.sqlite_url);
                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::StorageError(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;
                info!("Connected to PostgreSQL");
                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Cheap liveness query used by `/readyz`.
    pub async fn ping(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(db_err("SQLite ping"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(db_err("Postgres ping"))?;
            }
        }
        Ok(())
    }

    /// Open a write transaction.
    pub async fn begin(&self) -> LicenseResult<DbTransaction> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => Ok(DbTransaction::SQLite(
                pool.begin().await.map_err(db_err("SQLite begin"))?,
            )),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => Ok(DbTransaction::Postgres(
                pool.begin().await.map_err(db_err("Postgres begin"))?,
            )),
        }
    }

    /// Fetch the license for a (customer, product) pair.
    pub async fn get_license(
        &self,
        customer_id: i64,
        product_id: i64,
    ) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, License>(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license WHERE customer_id = ? AND product_id = ?"
            ))
            .bind(customer_id)
            .bind(product_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite get_license")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, License>(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license WHERE customer_id = $1 AND product_id = $2"
            ))
            .bind(customer_id)
            .bind(product_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres get_license")),
        }
    }

    /// Fetch a license by its key. Keys compare case-insensitively.
    pub async fn get_license_by_key(&self, license_key: &str) -> LicenseResult<Option<License>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, License>(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license WHERE license_key = ? COLLATE NOCASE"
            ))
            .bind(license_key)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite get_license_by_key")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, License>(&format!(
                "SELECT {LICENSE_COLUMNS} FROM license WHERE LOWER(license_key) = LOWER($1)"
            ))
            .bind(license_key)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres get_license_by_key")),
        }
    }

    pub async fn get_customer(&self, customer_id: i64) -> LicenseResult<Option<Customer>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Customer>(
                "SELECT customer_id, customer_name FROM customer WHERE customer_id = ?",
            )
            .bind(customer_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite get_customer")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Customer>(
                "SELECT customer_id, customer_name FROM customer WHERE customer_id = $1",
            )
            .bind(customer_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres get_customer")),
        }
    }

    pub async fn get_product(&self, product_id: i64) -> LicenseResult<Option<Product>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE product_id = ?"
            ))
            .bind(product_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite get_product")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE product_id = $1"
            ))
            .bind(product_id)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres get_product")),
        }
    }

    /// Fetch a product by its GUID (case-insensitive).
    pub async fn get_product_by_guid(&self, guid: &str) -> LicenseResult<Option<Product>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE product_guid = ? COLLATE NOCASE"
            ))
            .bind(guid)
            .fetch_optional(pool)
            .await
            .map_err(db_err("SQLite get_product_by_guid")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, Product>(&format!(
                "SELECT {PRODUCT_COLUMNS} FROM product WHERE LOWER(product_guid) = LOWER($1)"
            ))
            .bind(guid)
            .fetch_optional(pool)
            .await
            .map_err(db_err("Postgres get_product_by_guid")),
        }
    }

    /// Feature definitions for a product, ordered by name.
    pub async fn get_features_for_product(
        &self,
        product_id: i64,
    ) -> LicenseResult<Vec<FeatureDefinition>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, FeatureDefinition>(&format!(
                "SELECT {FEATURE_COLUMNS} FROM feature WHERE product_id = ? ORDER BY feature_name"
            ))
            .bind(product_id)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite get_features_for_product")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, FeatureDefinition>(&format!(
                "SELECT {FEATURE_COLUMNS} FROM feature WHERE product_id = $1 ORDER BY feature_name"
            ))
            .bind(product_id)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres get_features_for_product")),
        }
    }

    /// Sparse per-customer feature values for a licensed product.
    pub async fn get_feature_overrides(
        &self,
        customer_id: i64,
        product_id: i64,
    ) -> LicenseResult<Vec<FeatureOverride>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, FeatureOverride>(
                "SELECT customer_id, product_id, feature_id, feature_value \
                 FROM license_feature WHERE customer_id = ? AND product_id = ? \
                 ORDER BY feature_id",
            )
            .bind(customer_id)
            .bind(product_id)
            .fetch_all(pool)
            .await
            .map_err(db_err("SQLite get_feature_overrides")),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, FeatureOverride>(
                "SELECT customer_id, product_id, feature_id, feature_value \
                 FROM license_feature WHERE customer_id = $1 AND product_id = $2 \
                 ORDER BY feature_id",
            )
            .bind(customer_id)
            .bind(product_id)
            .fetch_all(pool)
            .await
            .map_err(db_err("Postgres get_feature_overrides")),
        }
    }

    /// Machines holding a non-expired registration (`expiration_date >= today`)
    /// for the product under this customer's license.
    pub async fn get_active_machines(
        &self,
        customer_id: i64,
        product_id: i64,
        today: &str,
    ) -> LicenseResult<Vec<Machine>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut conn = pool.acquire().await.map_err(db_err("SQLite acquire"))?;
                crate::server::machines::sqlite::active_for_license(
                    &mut conn,
                    customer_id,
                    product_id,
                    today,
                )
                .await
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut conn = pool.acquire().await.map_err(db_err("Postgres acquire"))?;
                crate::server::machines::postgres::active_for_license(
                    &mut conn,
                    customer_id,
                    product_id,
                    today,
                )
                .await
            }
        }
    }

    pub async fn get_machine_by_code(
        &self,
        customer_id: i64,
        machine_code: &str,
    ) -> LicenseResult<Option<Machine>> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                let mut conn = pool.acquire().await.map_err(db_err("SQLite acquire"))?;
                crate::server::machines::sqlite::by_code(&mut conn, customer_id, machine_code)
                    .await
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                let mut conn = pool.acquire().await.map_err(db_err("Postgres acquire"))?;
                crate::server::machines::postgres::by_code(&mut conn, customer_id, machine_code)
                    .await
            }
        }
    }

    /// Record the product version installed on a machine.
    ///
    /// Returns `Ok(false)` when no registration exists for the pair.
    pub async fn update_installed_version(
        &self,
        machine_id: i64,
        product_id: i64,
        installed_version: &str,
    ) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query(
                "UPDATE registration SET installed_version = ? \
                 WHERE machine_id = ? AND product_id = ?",
            )
            .bind(installed_version)
            .bind(machine_id)
            .bind(product_id)
            .execute(pool)
            .await
            .map_err(db_err("SQLite update_installed_version"))?
            .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query(
                "UPDATE registration SET installed_version = $1 \
                 WHERE machine_id = $2 AND product_id = $3",
            )
            .bind(installed_version)
            .bind(machine_id)
            .bind(product_id)
            .execute(pool)
            .await
            .map_err(db_err("Postgres update_installed_version"))?
            .rows_affected(),
        };

        Ok(rows_affected > 0)
    }
}

impl DbTransaction {
    /// Take the license-row write lock and return the current seat count.
    ///
    /// Concurrent activations for the same license serialize here, so the
    /// seat count read afterwards inside this transaction is authoritative.
    /// Returns `Ok(None)` if the license no longer exists.
    pub async fn lock_license(
        &mut self,
        customer_id: i64,
        product_id: i64,
    ) -> LicenseResult<Option<i64>> {
        match self {
            #[cfg(feature = "sqlite")]
            DbTransaction::SQLite(tx) => {
                // A no-op write takes SQLite's RESERVED lock before any read.
                let touched = query(
                    "UPDATE license SET license_count = license_count \
                     WHERE customer_id = ? AND product_id = ?",
                )
                .bind(customer_id)
                .bind(product_id)
                .execute(&mut **tx)
                .await
                .map_err(db_err("SQLite lock_license"))?
                .rows_affected();
                if touched == 0 {
                    return Ok(None);
                }
                query_scalar::<_, i64>(
                    "SELECT license_count FROM license WHERE customer_id = ? AND product_id = ?",
                )
                .bind(customer_id)
                .bind(product_id)
                .fetch_optional(&mut **tx)
                .await
                .map_err(db_err("SQLite lock_license"))
            }
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => query_scalar::<_, i64>(
                "SELECT license_count FROM license \
                 WHERE customer_id = $1 AND product_id = $2 FOR UPDATE",
            )
            .bind(customer_id)
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err("Postgres lock_license")),
        }
    }

    /// Active machines for the license, read inside this transaction.
    pub async fn get_active_machines(
        &mut self,
        customer_id: i64,
        product_id: i64,
        today: &str,
    ) -> LicenseResult<Vec<Machine>> {
        match self {
            #[cfg(feature = "sqlite")]
            DbTransaction::SQLite(tx) => {
                crate::server::machines::sqlite::active_for_license(
                    tx,
                    customer_id,
                    product_id,
                    today,
                )
                .await
            }
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => {
                crate::server::machines::postgres::active_for_license(
                    tx,
                    customer_id,
                    product_id,
                    today,
                )
                .await
            }
        }
    }

    pub async fn commit(self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(db_err("SQLite commit")),
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(db_err("Postgres commit")),
        }
    }

    pub async fn rollback(self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(db_err("SQLite rollback")),
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => {
                tx.rollback().await.map_err(db_err("Postgres rollback"))
            }
        }
    }
}
