//! Wire types shared by the HTTP server and the client.
//!
//! Response keys are PascalCase because deployed clients read them that way;
//! request bodies use camelCase.

use serde::{Deserialize, Serialize};

use crate::features::MergedFeatures;

/// Everything a machine receives on successful activation.
///
/// The registration hash covers `MachineCode`, both dates, `MaxProductVersion`
/// and `Features`; the other fields are informational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct EntitlementResponse {
    pub user_name: String,
    /// Customer name.
    pub user_company: String,
    pub machine_code: String,
    pub expiration_date: String,
    pub maint_expiration_date: String,
    pub max_product_version: String,
    pub latest_version: String,
    #[serde(rename = "ProductGUID")]
    pub product_guid: String,
    pub license_key: String,
    pub registration_hash: String,
    #[serde(default)]
    pub features: MergedFeatures,
}

/// License summary keyed by license key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LicenseInfo {
    pub customer_name: String,
    pub product_name: String,
    #[serde(rename = "ProductGUID")]
    pub product_guid: String,
    pub license_key: String,
    pub license_count: i64,
    /// Seats not held by a non-expired registration; never negative.
    #[serde(rename = "LicensesAvailable")]
    pub seats_available: i64,
    pub is_subscription: bool,
    pub license_term: i64,
    pub start_date: String,
    pub expiration_date: String,
    pub maint_expiration_date: String,
    pub max_product_version: String,
    pub latest_version: String,
    #[serde(default)]
    pub features: MergedFeatures,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersionInfo {
    #[serde(rename = "ProductGUID")]
    pub product_guid: String,
    #[serde(rename = "LatestVersion")]
    pub latest_version: String,
    #[serde(rename = "DownloadURL")]
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateRequest {
    pub machine_code: String,
    pub user_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLicenseRequest {
    pub machine_code: String,
    pub installed_version: String,
}

/// Result of comparing an installed version against the product's latest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateCheck {
    pub update_available: bool,
    pub current_version: String,
    pub latest_version: String,
    /// Only populated when an update is available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}
