//! Activation orchestrator.
//!
//! Composes license lookup, seat accounting, feature merge, registration
//! hashing, the machine registry and the registration upsert into a single
//! activation. Seats are checked twice: a fail-fast read before any write, and
//! the authoritative check inside the write transaction after the license row
//! is locked, so concurrent activations of one license cannot overshoot its
//! seat count.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::errors::{LicenseError, LicenseResult};
use crate::features::{merge_with_overrides, MergedFeatures};
use crate::models::{format_date, Customer, License, Product};
use crate::registration_hash::RegistrationData;
use crate::responses::{EntitlementResponse, LicenseInfo, ProductVersionInfo};
use crate::seats::{check_seat, SeatDecision, SeatUsage};
use crate::server::database::{Database, DbTransaction};
use crate::server::logging::{log_license_event, ActivationEvent};
use crate::server::machines::{self, MachineChange};
use crate::server::registrations::{self, RegistrationWrite};
use crate::version::Version;

/// Issues entitlements against the license store.
///
/// Cheap to clone; holds the shared pool and the registration secret.
#[derive(Clone)]
pub struct ActivationService {
    db: Arc<Database>,
    secret: Arc<str>,
}

impl std::fmt::Debug for ActivationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivationService")
            .field("db", &self.db)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Roll back a rejected activation. A failed rollback is logged and never
/// replaces the rejection returned to the caller.
async fn abandon(tx: DbTransaction) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback of rejected activation failed: {e}");
    }
}

fn validate_request(machine_code: &str, user_name: &str) -> LicenseResult<()> {
    if machine_code.trim().is_empty() {
        return Err(LicenseError::validation("machine code is required"));
    }
    if user_name.trim().is_empty() {
        return Err(LicenseError::validation("user name is required"));
    }
    Ok(())
}

impl ActivationService {
    pub fn new(db: Arc<Database>, secret: impl Into<String>) -> Self {
        Self {
            db,
            secret: Arc::from(secret.into()),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Activate `machine_code` under the license for (customer, product), dated today (UTC).
    pub async fn activate(
        &self,
        customer_id: i64,
        product_id: i64,
        machine_code: &str,
        user_name: &str,
    ) -> LicenseResult<EntitlementResponse> {
        self.activate_on(
            customer_id,
            product_id,
            machine_code,
            user_name,
            Utc::now().date_naive(),
        )
        .await
    }

    /// Activate as of `today`. Registrations expiring before `today` hold no seat.
    pub async fn activate_on(
        &self,
        customer_id: i64,
        product_id: i64,
        machine_code: &str,
        user_name: &str,
        today: NaiveDate,
    ) -> LicenseResult<EntitlementResponse> {
        validate_request(machine_code, user_name)?;
        let today = format_date(today);

        let license = self
            .db
            .get_license(customer_id, product_id)
            .await?
            .ok_or_else(|| LicenseError::not_found("license"))?;
        license.validate()?;

        // Fail fast before any write; re-checked under the lock below.
        let active = self
            .db
            .get_active_machines(customer_id, product_id, &today)
            .await?;
        if let Err(e) = check_seat(&active, machine_code, license.license_count) {
            self.reject(&license, machine_code, &e);
            return Err(e);
        }

        let customer = self.customer(customer_id).await?;
        let product = self.product(product_id).await?;
        let features = self.merged_features(customer_id, product_id).await?;

        let registration_hash = RegistrationData {
            machine_code,
            expiration_date: &license.expiration_date,
            maint_expiration_date: &license.maint_expiration_date,
            max_product_version: &license.max_product_version,
            features: &features,
        }
        .hash(&self.secret);

        let mut tx = self.db.begin().await?;

        let seat_count = match tx.lock_license(customer_id, product_id).await? {
            Some(count) => count,
            None => {
                abandon(tx).await;
                return Err(LicenseError::not_found("license"));
            }
        };
        let active = tx
            .get_active_machines(customer_id, product_id, &today)
            .await?;
        let decision = match check_seat(&active, machine_code, seat_count) {
            Ok(decision) => decision,
            Err(e) => {
                abandon(tx).await;
                self.reject(&license, machine_code, &e);
                return Err(e);
            }
        };

        let machine = machines::get_or_create(&mut tx, customer_id, machine_code, user_name).await?;
        let registration = registrations::upsert(
            &mut tx,
            &RegistrationWrite {
                machine_id: machine.machine_id,
                product_id,
                expiration_date: &license.expiration_date,
                registration_hash: &registration_hash,
                today: &today,
            },
        )
        .await?;
        tx.commit().await?;

        let in_use = match decision {
            SeatDecision::AlreadyActive => active.len(),
            SeatDecision::Available => active.len() + 1,
        };
        let event = match decision {
            SeatDecision::AlreadyActive => ActivationEvent::Reactivated,
            SeatDecision::Available => ActivationEvent::Activated,
        };
        let details = format!(
            "machine_code={machine_code} seats={in_use}/{seat_count} first_registered={}",
            registration.first_registration_date
        );
        log_license_event(event, &license.license_key, Some(&details));
        if machine.change == MachineChange::Renamed {
            debug!(machine_id = machine.machine_id, "user name replaced on re-activation");
        }

        Ok(EntitlementResponse {
            user_name: user_name.to_string(),
            user_company: customer.customer_name,
            machine_code: machine_code.to_string(),
            expiration_date: license.expiration_date,
            maint_expiration_date: license.maint_expiration_date,
            max_product_version: license.max_product_version,
            latest_version: product.latest_version,
            product_guid: product.product_guid,
            license_key: license.license_key,
            registration_hash,
            features,
        })
    }

    /// Resolve the license by key (case-insensitive) and activate against it.
    pub async fn activate_by_license_key(
        &self,
        license_key: &str,
        machine_code: &str,
        user_name: &str,
    ) -> LicenseResult<EntitlementResponse> {
        let license = self.license_by_key(license_key).await?;
        self.activate(
            license.customer_id,
            license.product_id,
            machine_code,
            user_name,
        )
        .await
    }

    /// Summarize a license, including current seat availability.
    pub async fn license_info(&self, license_key: &str) -> LicenseResult<LicenseInfo> {
        let license = self.license_by_key(license_key).await?;
        self.license_info_for(license, Utc::now().date_naive()).await
    }

    /// Record the product version installed on an activated machine.
    pub async fn update_installed_version(
        &self,
        license_key: &str,
        machine_code: &str,
        installed_version: &str,
    ) -> LicenseResult<LicenseInfo> {
        if machine_code.trim().is_empty() {
            return Err(LicenseError::validation("machine code is required"));
        }
        let version = Version::parse(installed_version)?;

        let license = self.license_by_key(license_key).await?;
        let machine = self
            .db
            .get_machine_by_code(license.customer_id, machine_code)
            .await?
            .ok_or_else(|| LicenseError::not_found("machine"))?;

        let updated = self
            .db
            .update_installed_version(machine.machine_id, license.product_id, &version.to_string())
            .await?;
        if !updated {
            return Err(LicenseError::not_found("registration"));
        }

        let details = format!("machine_code={machine_code} version={version}");
        log_license_event(
            ActivationEvent::VersionReported,
            &license.license_key,
            Some(&details),
        );

        self.license_info_for(license, Utc::now().date_naive()).await
    }

    /// Latest version and download location for a product GUID.
    pub async fn product_version(&self, product_guid: &str) -> LicenseResult<ProductVersionInfo> {
        let product = self
            .db
            .get_product_by_guid(product_guid)
            .await?
            .ok_or_else(|| LicenseError::not_found("product"))?;
        Ok(ProductVersionInfo {
            product_guid: product.product_guid,
            latest_version: product.latest_version,
            download_url: product.download_url,
        })
    }

    async fn license_info_for(&self, license: License, today: NaiveDate) -> LicenseResult<LicenseInfo> {
        let customer = self.customer(license.customer_id).await?;
        let product = self.product(license.product_id).await?;
        let features = self
            .merged_features(license.customer_id, license.product_id)
            .await?;
        let active = self
            .db
            .get_active_machines(license.customer_id, license.product_id, &format_date(today))
            .await?;
        let usage = SeatUsage::new(active.len(), license.license_count);

        Ok(LicenseInfo {
            customer_name: customer.customer_name,
            product_name: product.product_name,
            product_guid: product.product_guid,
            license_key: license.license_key,
            license_count: license.license_count,
            seats_available: usage.available(),
            is_subscription: license.is_subscription,
            license_term: license.license_term,
            start_date: license.start_date,
            expiration_date: license.expiration_date,
            maint_expiration_date: license.maint_expiration_date,
            max_product_version: license.max_product_version,
            latest_version: product.latest_version,
            features,
        })
    }

    async fn license_by_key(&self, license_key: &str) -> LicenseResult<License> {
        if license_key.trim().is_empty() {
            return Err(LicenseError::validation("license key is required"));
        }
        self.db
            .get_license_by_key(license_key)
            .await?
            .ok_or_else(|| LicenseError::not_found("license"))
    }

    async fn customer(&self, customer_id: i64) -> LicenseResult<Customer> {
        self.db
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| LicenseError::not_found("customer"))
    }

    async fn product(&self, product_id: i64) -> LicenseResult<Product> {
        self.db
            .get_product(product_id)
            .await?
            .ok_or_else(|| LicenseError::not_found("product"))
    }

    async fn merged_features(
        &self,
        customer_id: i64,
        product_id: i64,
    ) -> LicenseResult<MergedFeatures> {
        let definitions = self.db.get_features_for_product(product_id).await?;
        let overrides = self.db.get_feature_overrides(customer_id, product_id).await?;
        Ok(merge_with_overrides(&definitions, &overrides))
    }

    fn reject(&self, license: &License, machine_code: &str, err: &LicenseError) {
        if let LicenseError::SeatLimitExceeded { .. } = err {
            warn!(
                customer_id = license.customer_id,
                product_id = license.product_id,
                machine_code,
                "activation rejected: {err}"
            );
            log_license_event(
                ActivationEvent::SeatLimitRejected,
                &license.license_key,
                Some(&err.to_string()),
            );
        } else {
            info!(machine_code, "activation failed: {err}");
        }
    }
}
