//! Machine registry: idempotent get-or-create of a (customer, machine code) identity.
//!
//! Writes always run inside the caller's transaction so a machine is never
//! visible without the registration committed alongside it.

use tracing::debug;

use crate::errors::LicenseResult;
use crate::server::database::DbTransaction;

/// What `get_or_create` did to the machine row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineChange {
    Created,
    /// Existing machine; its user name was replaced (last activation wins).
    Renamed,
    /// Existing machine with the same user name; nothing was written.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachineUpsert {
    pub machine_id: i64,
    pub change: MachineChange,
}

/// Look up the machine by exact (customer, code); insert it when absent,
/// refresh its user name when it differs.
pub async fn get_or_create(
    tx: &mut DbTransaction,
    customer_id: i64,
    machine_code: &str,
    user_name: &str,
) -> LicenseResult<MachineUpsert> {
    let existing = match tx {
        #[cfg(feature = "sqlite")]
        DbTransaction::SQLite(tx) => sqlite::by_code(tx, customer_id, machine_code).await?,
        #[cfg(feature = "postgres")]
        DbTransaction::Postgres(tx) => postgres::by_code(tx, customer_id, machine_code).await?,
    };

    let Some(machine) = existing else {
        let machine_id = match tx {
            #[cfg(feature = "sqlite")]
            DbTransaction::SQLite(tx) => {
                sqlite::insert(tx, customer_id, machine_code, user_name).await?
            }
            #[cfg(feature = "postgres")]
            DbTransaction::Postgres(tx) => {
                postgres::insert(tx, customer_id, machine_code, user_name).await?
            }
        };
        debug!(customer_id, machine_code, machine_id, "machine created");
        return Ok(MachineUpsert {
            machine_id,
            change: MachineChange::Created,
        });
    };

    if machine.user_name == user_name {
        return Ok(MachineUpsert {
            machine_id: machine.machine_id,
            change: MachineChange::Unchanged,
        });
    }

    match tx {
        #[cfg(feature = "sqlite")]
        DbTransaction::SQLite(tx) => {
            sqlite::update_user_name(tx, machine.machine_id, user_name).await?
        }
        #[cfg(feature = "postgres")]
        DbTransaction::Postgres(tx) => {
            postgres::update_user_name(tx, machine.machine_id, user_name).await?
        }
    }
    debug!(
        machine_id = machine.machine_id,
        old = %machine.user_name,
        new = %user_name,
        "machine user name refreshed"
    );

    Ok(MachineUpsert {
        machine_id: machine.machine_id,
        change: MachineChange::Renamed,
    })
}

#[cfg(feature = "sqlite")]
pub(crate) mod sqlite {
    use sqlx::{query, query_as, query_scalar, SqliteConnection};

    use crate::errors::LicenseResult;
    use crate::models::Machine;
    use crate::server::database::db_err;

    pub async fn by_code(
        conn: &mut SqliteConnection,
        customer_id: i64,
        machine_code: &str,
    ) -> LicenseResult<Option<Machine>> {
        query_as::<_, Machine>(
            "SELECT machine_id, customer_id, machine_code, user_name \
             FROM machine WHERE customer_id = ? AND machine_code = ?",
        )
        .bind(customer_id)
        .bind(machine_code)
        .fetch_optional(conn)
        .await
        .map_err(db_err("SQLite machine by_code"))
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        customer_id: i64,
        machine_code: &str,
        user_name: &str,
    ) -> LicenseResult<i64> {
        query_scalar::<_, i64>(
            "INSERT INTO machine (customer_id, machine_code, user_name) \
             VALUES (?, ?, ?) RETURNING machine_id",
        )
        .bind(customer_id)
        .bind(machine_code)
        .bind(user_name)
        .fetch_one(conn)
        .await
        .map_err(db_err("SQLite machine insert"))
    }

    pub async fn update_user_name(
        conn: &mut SqliteConnection,
        machine_id: i64,
        user_name: &str,
    ) -> LicenseResult<()> {
        query("UPDATE machine SET user_name = ? WHERE machine_id = ?")
            .bind(user_name)
            .bind(machine_id)
            .execute(conn)
            .await
            .map_err(db_err("SQLite machine update_user_name"))?;
        Ok(())
    }

    pub async fn active_for_license(
        conn: &mut SqliteConnection,
        customer_id: i64,
        product_id: i64,
        today: &str,
    ) -> LicenseResult<Vec<Machine>> {
        query_as::<_, Machine>(
            "SELECT m.machine_id, m.customer_id, m.machine_code, m.user_name \
             FROM machine m \
             JOIN registration r ON r.machine_id = m.machine_id \
             WHERE m.customer_id = ? AND r.product_id = ? AND r.expiration_date >= ? \
             ORDER BY m.machine_code",
        )
        .bind(customer_id)
        .bind(product_id)
        .bind(today)
        .fetch_all(conn)
        .await
        .map_err(db_err("SQLite active_for_license"))
    }
}

#[cfg(feature = "postgres")]
pub(crate) mod postgres {
    use sqlx::{query, query_as, query_scalar, PgConnection};

    use crate::errors::LicenseResult;
    use crate::models::Machine;
    use crate::server::database::db_err;

    pub async fn by_code(
        conn: &mut PgConnection,
        customer_id: i64,
        machine_code: &str,
    ) -> LicenseResult<Option<Machine>> {
        query_as::<_, Machine>(
            "SELECT machine_id, customer_id, machine_code, user_name \
             FROM machine WHERE customer_id = $1 AND machine_code = $2",
        )
        .bind(customer_id)
        .bind(machine_code)
        .fetch_optional(conn)
        .await
        .map_err(db_err("Postgres machine by_code"))
    }

    pub async fn insert(
        conn: &mut PgConnection,
        customer_id: i64,
        machine_code: &str,
        user_name: &str,
    ) -> LicenseResult<i64> {
        query_scalar::<_, i64>(
            "INSERT INTO machine (customer_id, machine_code, user_name) \
             VALUES ($1, $2, $3) RETURNING machine_id",
        )
        .bind(customer_id)
        .bind(machine_code)
        .bind(user_name)
        .fetch_one(conn)
        .await
        .map_err(db_err("Postgres machine insert"))
    }

    pub async fn update_user_name(
        conn: &mut PgConnection,
        machine_id: i64,
        user_name: &str,
    ) -> LicenseResult<()> {
        query("UPDATE machine SET user_name = $1 WHERE machine_id = $2")
            .bind(user_name)
            .bind(machine_id)
            .execute(conn)
            .await
            .map_err(db_err("Postgres machine update_user_name"))?;
        Ok(())
    }

    pub async fn active_for_license(
        conn: &mut PgConnection,
        customer_id: i64,
        product_id: i64,
        today: &str,
    ) -> LicenseResult<Vec<Machine>> {
        query_as::<_, Machine>(
            "SELECT m.machine_id, m.customer_id, m.machine_code, m.user_name \
             FROM machine m \
             JOIN registration r ON r.machine_id = m.machine_id \
             WHERE m.customer_id = $1 AND r.product_id = $2 AND r.expiration_date >= $3 \
             ORDER BY m.machine_code",
        )
        .bind(customer_id)
        .bind(product_id)
        .bind(today)
        .fetch_all(conn)
        .await
        .map_err(db_err("Postgres active_for_license"))
    }
}
