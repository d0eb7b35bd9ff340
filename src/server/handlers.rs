use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use crate::errors::LicenseError;
use crate::responses::{
    ActivateRequest, EntitlementResponse, LicenseInfo, ProductVersionInfo, UpdateLicenseRequest,
};
use crate::server::activation::ActivationService;
use crate::server::api_error::ApiError;
use crate::server::database::Database;
use crate::server::logging::HealthResponse;

/// Header carrying the caller's license key on activation.
pub const LICENSE_KEY_HEADER: &str = "X-License-Key";

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub activation: ActivationService,
}

impl AppState {
    pub fn new(db: Arc<Database>, registration_secret: impl Into<String>) -> Self {
        let activation = ActivationService::new(db.clone(), registration_secret);
        Self { db, activation }
    }
}

fn license_key_from(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(LICENSE_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(ApiError::missing_license_key)
}

/// Activate the calling machine under the license named by `X-License-Key`.
///
/// - Unknown key → 401 `INVALID_LICENSE_KEY`
/// - Every seat taken by other machines → 409 `SEAT_LIMIT_EXCEEDED`
/// - Re-activating a machine that already holds a seat always succeeds
pub async fn activate_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<ActivateRequest>, JsonRejection>,
) -> Result<Json<EntitlementResponse>, ApiError> {
    let license_key = license_key_from(&headers)?;
    let Json(payload) = payload?;
    info!(
        "Activating machine_code={} user_name={}",
        payload.machine_code, payload.user_name
    );

    let entitlement = state
        .activation
        .activate_by_license_key(license_key, &payload.machine_code, &payload.user_name)
        .await
        .map_err(|e| match e {
            LicenseError::NotFound(ref what) if what == "license" => {
                warn!("Activation attempted with unknown license key");
                ApiError::invalid_license_key()
            }
            e => e.into(),
        })?;

    Ok(Json(entitlement))
}

/// Summary of a license: seats, dates, version limits and features.
pub async fn license_info_handler(
    State(state): State<AppState>,
    Path(license_key): Path<String>,
) -> Result<Json<LicenseInfo>, ApiError> {
    let info = state.activation.license_info(&license_key).await?;
    Ok(Json(info))
}

/// Record the installed product version for a machine and return the license summary.
pub async fn update_license_handler(
    State(state): State<AppState>,
    Path(license_key): Path<String>,
    payload: Result<Json<UpdateLicenseRequest>, JsonRejection>,
) -> Result<Json<LicenseInfo>, ApiError> {
    let Json(payload) = payload?;
    info!(
        "Updating installed version machine_code={} version={}",
        payload.machine_code, payload.installed_version
    );
    let info = state
        .activation
        .update_installed_version(
            &license_key,
            &payload.machine_code,
            &payload.installed_version,
        )
        .await?;
    Ok(Json(info))
}

pub async fn product_version_handler(
    State(state): State<AppState>,
    Path(product_guid): Path<String>,
) -> Result<Json<ProductVersionInfo>, ApiError> {
    let info = state.activation.product_version(&product_guid).await?;
    Ok(Json(info))
}

/// Liveness: the process is up and serving.
pub async fn livez_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness: the database answers a trivial query.
pub async fn readyz_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse::new(true))),
        Err(e) => {
            warn!("Readiness check failed: {e}");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse::new(false)),
            )
        }
    }
}
