//! Local persistence of the last issued entitlement.
//!
//! The entitlement is stored as pretty-printed JSON. By default it lives in
//! the platform data directory:
//! - Windows: `%APPDATA%\regserver\registration.json`
//! - macOS: `~/Library/Application Support/regserver/registration.json`
//! - Linux: `~/.local/share/regserver/registration.json`

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::{LicenseError, LicenseResult};
use crate::responses::EntitlementResponse;

const APP_DIR: &str = "regserver";
const REGISTRATION_FILE: &str = "registration.json";

#[derive(Debug, Clone)]
pub struct EntitlementStore {
    path: PathBuf,
}

impl EntitlementStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store in the platform data directory.
    pub fn default_location() -> LicenseResult<Self> {
        let dir = dirs::data_dir().ok_or_else(|| {
            LicenseError::ConfigError("could not determine app data directory".to_string())
        })?;
        Ok(Self::new(dir.join(APP_DIR).join(REGISTRATION_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, entitlement: &EntitlementResponse) -> LicenseResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let data = serde_json::to_vec_pretty(entitlement)?;
        fs::write(&self.path, data).await?;
        debug!(path = %self.path.display(), "entitlement saved");
        Ok(())
    }

    /// Load the saved entitlement; `Ok(None)` when nothing was saved yet.
    pub async fn load(&self) -> LicenseResult<Option<EntitlementResponse>> {
        match fs::read(&self.path).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self) -> bool {
        fs::try_exists(&self.path).await.unwrap_or(false)
    }

    /// Remove the saved entitlement. Deleting a missing file is not an error.
    pub async fn delete(&self) -> LicenseResult<()> {
        match fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
