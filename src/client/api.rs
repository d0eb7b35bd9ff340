//! HTTP client for the activation server.

use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::errors::{LicenseError, LicenseResult};
use crate::responses::{
    ActivateRequest, EntitlementResponse, LicenseInfo, ProductVersionInfo, UpdateCheck,
    UpdateLicenseRequest,
};
use crate::version::Version;

const LICENSE_KEY_HEADER: &str = "X-License-Key";

#[derive(Debug, Clone)]
pub struct RegClient {
    http: Client,
    base_url: String,
}

impl RegClient {
    /// `base_url` is the server root, e.g. `https://licensing.example.com`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Append path segments to the base URL, percent-encoding each one so a
    /// key containing `/`, `?` or `#` stays a single segment.
    fn endpoint(&self, segments: &[&str]) -> LicenseResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            LicenseError::ConfigError(format!("invalid server URL {}: {e}", self.base_url))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                LicenseError::ConfigError(format!("server URL {} cannot take a path", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Activate this machine under `license_key`.
    pub async fn activate(
        &self,
        license_key: &str,
        machine_code: &str,
        user_name: &str,
    ) -> LicenseResult<EntitlementResponse> {
        let payload = ActivateRequest {
            machine_code: machine_code.to_string(),
            user_name: user_name.to_string(),
        };
        let resp = self
            .http
            .post(self.endpoint(&["api", "v1", "activate"])?)
            .header(LICENSE_KEY_HEADER, license_key)
            .json(&payload)
            .send()
            .await?;
        parse("activation", resp).await
    }

    pub async fn license_info(&self, license_key: &str) -> LicenseResult<LicenseInfo> {
        let resp = self
            .http
            .get(self.endpoint(&["api", "v1", "license", license_key])?)
            .send()
            .await?;
        parse("license info", resp).await
    }

    /// Tell the server which product version is installed on this machine.
    pub async fn report_installed_version(
        &self,
        license_key: &str,
        machine_code: &str,
        installed_version: &str,
    ) -> LicenseResult<LicenseInfo> {
        let payload = UpdateLicenseRequest {
            machine_code: machine_code.to_string(),
            installed_version: installed_version.to_string(),
        };
        let resp = self
            .http
            .put(self.endpoint(&["api", "v1", "license", license_key])?)
            .json(&payload)
            .send()
            .await?;
        parse("installed version update", resp).await
    }

    pub async fn product_version(&self, product_guid: &str) -> LicenseResult<ProductVersionInfo> {
        let resp = self
            .http
            .get(self.endpoint(&["api", "v1", "productver", product_guid])?)
            .send()
            .await?;
        parse("product version", resp).await
    }

    /// Report the installed version, then compare it with the product's latest.
    ///
    /// The download URL is fetched only when an update is available.
    pub async fn check_for_update(
        &self,
        license_key: &str,
        machine_code: &str,
        installed_version: &str,
    ) -> LicenseResult<UpdateCheck> {
        let info = self
            .report_installed_version(license_key, machine_code, installed_version)
            .await?;

        let installed = Version::parse(installed_version)?;
        let update_available = match info.latest_version.trim() {
            "" => false,
            latest => Version::parse(latest)? > installed,
        };

        let download_url = if update_available {
            Some(self.product_version(&info.product_guid).await?.download_url)
        } else {
            None
        };
        debug!(
            installed = %installed,
            latest = %info.latest_version,
            update_available,
            "update check complete"
        );

        Ok(UpdateCheck {
            update_available,
            current_version: installed_version.to_string(),
            latest_version: info.latest_version,
            download_url,
        })
    }
}

async fn parse<T: DeserializeOwned>(op: &str, resp: Response) -> LicenseResult<T> {
    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<T>()
            .await
            .map_err(|e| LicenseError::ServerError(format!("failed to parse {op} response: {e}")));
    }

    // Error bodies look like {"error":{"code":..,"message":..}}.
    let message = resp
        .json::<serde_json::Value>()
        .await
        .ok()
        .and_then(|body| {
            body.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| status.to_string());

    warn!("{op} failed with HTTP status {status}: {message}");
    Err(LicenseError::ServerError(format!(
        "{op} failed with HTTP status {}: {message}",
        status.as_u16()
    )))
}
