//! Records the activation engine reads and writes.
//!
//! Dates are carried as `YYYY-MM-DD` strings: they are stored that way, they
//! compare correctly as text and they feed the registration hash verbatim.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::errors::{LicenseError, LicenseResult};
use crate::version;

/// Date format used for every stored and hashed date.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Format a date the way it is stored.
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parse a stored date, naming the field on failure.
pub fn parse_date(value: &str, field: &str) -> LicenseResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| {
        LicenseError::validation(format!("{field} '{value}' must be a YYYY-MM-DD date"))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct Customer {
    pub customer_id: i64,
    pub customer_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct Product {
    pub product_id: i64,
    pub product_name: String,
    pub product_guid: String,
    pub latest_version: String,
    pub download_url: String,
}

impl Product {
    pub fn validate(&self) -> LicenseResult<()> {
        if !version::is_valid_version(&self.latest_version) {
            return Err(LicenseError::validation(
                "latest version must be in #.#.# format (e.g., 1.0.0)",
            ));
        }
        Ok(())
    }
}

/// A customer's entitlement to a product. Read-only to the activation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct License {
    pub customer_id: i64,
    pub product_id: i64,
    pub license_key: String,
    /// Seat count: how many machines may hold a non-expired registration.
    pub license_count: i64,
    pub is_subscription: bool,
    /// Subscription term in months; meaningful only for subscriptions.
    pub license_term: i64,
    pub start_date: String,
    pub expiration_date: String,
    pub maint_expiration_date: String,
    /// Empty means any product version may be activated.
    pub max_product_version: String,
}

impl License {
    /// Check the business rules a license must satisfy before it can be issued.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.license_count <= 0 {
            return Err(LicenseError::validation(
                "license count must be greater than 0",
            ));
        }
        if self.start_date.is_empty() {
            return Err(LicenseError::validation("start date is required"));
        }
        if self.expiration_date.is_empty() {
            return Err(LicenseError::validation("expiration date is required"));
        }
        if self.maint_expiration_date.is_empty() {
            return Err(LicenseError::validation(
                "maintenance expiration date is required",
            ));
        }
        parse_date(&self.start_date, "start date")?;
        parse_date(&self.expiration_date, "expiration date")?;
        parse_date(&self.maint_expiration_date, "maintenance expiration date")?;

        if self.is_subscription && self.license_term <= 0 {
            return Err(LicenseError::validation(
                "subscription licenses require a term greater than 0",
            ));
        }
        if !version::is_valid_version(&self.max_product_version) {
            return Err(LicenseError::validation(
                "max product version must be empty or in #.#.# format",
            ));
        }
        Ok(())
    }
}

/// An end-user installation, unique per (customer, machine code).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct Machine {
    pub machine_id: i64,
    pub customer_id: i64,
    pub machine_code: String,
    pub user_name: String,
}

/// A product activated on a machine, keyed by (machine, product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "server", derive(sqlx::FromRow))]
pub struct Registration {
    pub machine_id: i64,
    pub product_id: i64,
    /// Mirrored from the license at activation time.
    pub expiration_date: String,
    pub registration_hash: String,
    pub first_registration_date: String,
    pub last_registration_date: String,
    pub installed_version: String,
}
