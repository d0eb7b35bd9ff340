//! Offline checks on a cached entitlement.
//!
//! The client holds the same registration secret as the server, so it can
//! re-derive the registration hash from the fields it received and detect any
//! edit to the cached dates, version limit or feature values.

use chrono::NaiveDate;

use crate::errors::LicenseResult;
use crate::models::parse_date;
use crate::registration_hash::{hashes_match, RegistrationData};
use crate::responses::EntitlementResponse;
use crate::version;

/// Recompute the registration hash and compare it with the one the server issued.
pub fn verify_registration(entitlement: &EntitlementResponse, secret: &str) -> bool {
    let expected = RegistrationData {
        machine_code: &entitlement.machine_code,
        expiration_date: &entitlement.expiration_date,
        maint_expiration_date: &entitlement.maint_expiration_date,
        max_product_version: &entitlement.max_product_version,
        features: &entitlement.features,
    }
    .hash(secret);

    hashes_match(&expected, &entitlement.registration_hash)
}

/// Whether `installed` may run under the entitlement's maximum product version.
pub fn is_version_allowed(installed: &str, entitlement: &EntitlementResponse) -> LicenseResult<bool> {
    version::is_allowed(installed, &entitlement.max_product_version)
}

/// True once `today` is past the license expiration date.
pub fn is_expired(entitlement: &EntitlementResponse, today: NaiveDate) -> LicenseResult<bool> {
    Ok(parse_date(&entitlement.expiration_date, "expiration date")? < today)
}

/// True while `today` is on or before the maintenance expiration date.
pub fn has_maintenance(entitlement: &EntitlementResponse, today: NaiveDate) -> LicenseResult<bool> {
    Ok(parse_date(&entitlement.maint_expiration_date, "maintenance expiration date")? >= today)
}
