//! Registration upsert keyed by (machine, product).
//!
//! - `first_registration_date` is only set on insert
//! - `last_registration_date` is always refreshed
//! - `expiration_date` is re-mirrored from the license
//! - `registration_hash` is replaced with the freshly computed one

use sqlx::query_as;

use crate::errors::LicenseResult;
use crate::models::Registration;
use crate::server::database::{db_err, DbTransaction};

/// Values written on every activation.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationWrite<'a> {
    pub machine_id: i64,
    pub product_id: i64,
    pub expiration_date: &'a str,
    pub registration_hash: &'a str,
    /// Activation date; becomes the first date on insert, the last date always.
    pub today: &'a str,
}

const RETURNING: &str = "RETURNING machine_id, product_id, expiration_date, registration_hash, \
     first_registration_date, last_registration_date, installed_version";

/// Insert or refresh the registration and return the stored row.
pub async fn upsert(
    tx: &mut DbTransaction,
    reg: &RegistrationWrite<'_>,
) -> LicenseResult<Registration> {
    match tx {
        #[cfg(feature = "sqlite")]
        DbTransaction::SQLite(tx) => {
            query_as::<_, Registration>(&format!(
                "INSERT INTO registration (machine_id, product_id, expiration_date, \
                 registration_hash, first_registration_date, last_registration_date) \
                 VALUES (?, ?, ?, ?, ?, ?) \
                 ON CONFLICT(machine_id, product_id) DO UPDATE SET \
                 expiration_date = excluded.expiration_date, \
                 registration_hash = excluded.registration_hash, \
                 last_registration_date = excluded.last_registration_date {RETURNING}"
            ))
            .bind(reg.machine_id)
            .bind(reg.product_id)
            .bind(reg.expiration_date)
            .bind(reg.registration_hash)
            .bind(reg.today)
            .bind(reg.today)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err("SQLite registration upsert"))
        }
        #[cfg(feature = "postgres")]
        DbTransaction::Postgres(tx) => {
            query_as::<_, Registration>(&format!(
                "INSERT INTO registration (machine_id, product_id, expiration_date, \
                 registration_hash, first_registration_date, last_registration_date) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (machine_id, product_id) DO UPDATE SET \
                 expiration_date = EXCLUDED.expiration_date, \
                 registration_hash = EXCLUDED.registration_hash, \
                 last_registration_date = EXCLUDED.last_registration_date {RETURNING}"
            ))
            .bind(reg.machine_id)
            .bind(reg.product_id)
            .bind(reg.expiration_date)
            .bind(reg.registration_hash)
            .bind(reg.today)
            .bind(reg.today)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_err("Postgres registration upsert"))
        }
    }
}
