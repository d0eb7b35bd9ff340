//! Configuration system for regserver.
//!
//! Configuration is loaded from multiple sources with the following precedence:
//! 1. Environment variables (highest priority)
//! 2. `regserver.toml` file
//! 3. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `REGSERVER_SERVER_HOST` - Server bind address
//! - `REGSERVER_SERVER_PORT` - Server port
//! - `REGSERVER_DATABASE_TYPE` - `sqlite` or `postgres`
//! - `REGSERVER_DATABASE_URL` - Database connection URL
//! - `REGSERVER_REGISTRATION_SECRET` - Shared secret for registration hashes
//! - `REGSERVER_LOGGING_ENABLED` - Enable request/event logging
//! - `REGSERVER_LOG_LEVEL` - Log level (trace, debug, info, warn, error)

use config::Config;
use serde::Deserialize;
use std::env;
use std::sync::OnceLock;

use crate::errors::{LicenseError, LicenseResult};

/// Global configuration singleton.
static CONFIG: OnceLock<RegServerConfig> = OnceLock::new();

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegServerConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registration: RegistrationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database type: "sqlite" or "postgres"
    pub db_type: String,
    pub sqlite_url: String,
    pub postgres_url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: "sqlite".to_string(),
            sqlite_url: "sqlite://registrations.db?mode=rwc".to_string(),
            postgres_url: "postgres://localhost/regserver".to_string(),
            max_connections: 5,
        }
    }
}

/// Registration hash configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Shared secret appended to every registration string before hashing.
    /// Known only to the server and the legitimate offline client.
    pub secret: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    /// Log level: trace, debug, info, warn, error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
        }
    }
}

fn config_err(e: config::ConfigError) -> LicenseError {
    LicenseError::ConfigError(e.to_string())
}

impl RegServerConfig {
    /// Load configuration from `regserver.toml` (optional) and the environment.
    pub fn load() -> LicenseResult<Self> {
        Self::load_from("regserver")
    }

    /// Load configuration using `file_stem` (without extension) as the optional file.
    pub fn load_from(file_stem: &str) -> LicenseResult<Self> {
        let defaults = RegServerConfig::default();
        let database_url = env::var("REGSERVER_DATABASE_URL").ok();

        let builder = Config::builder()
            .set_default("server.host", defaults.server.host)
            .map_err(config_err)?
            .set_default("server.port", i64::from(defaults.server.port))
            .map_err(config_err)?
            .set_default("database.db_type", defaults.database.db_type)
            .map_err(config_err)?
            .set_default("database.sqlite_url", defaults.database.sqlite_url)
            .map_err(config_err)?
            .set_default("database.postgres_url", defaults.database.postgres_url)
            .map_err(config_err)?
            .set_default(
                "database.max_connections",
                i64::from(defaults.database.max_connections),
            )
            .map_err(config_err)?
            .set_default("registration.secret", "")
            .map_err(config_err)?
            .set_default("logging.enabled", defaults.logging.enabled)
            .map_err(config_err)?
            .set_default("logging.level", defaults.logging.level)
            .map_err(config_err)?
            .add_source(config::File::with_name(file_stem).required(false))
            .set_override_option("server.host", env::var("REGSERVER_SERVER_HOST").ok())
            .map_err(config_err)?
            .set_override_option(
                "server.port",
                env::var("REGSERVER_SERVER_PORT")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("database.db_type", env::var("REGSERVER_DATABASE_TYPE").ok())
            .map_err(config_err)?
            .set_override_option(
                "database.sqlite_url",
                database_url
                    .clone()
                    .filter(|url| url.starts_with("sqlite")),
            )
            .map_err(config_err)?
            .set_override_option(
                "database.postgres_url",
                database_url.filter(|url| url.starts_with("postgres")),
            )
            .map_err(config_err)?
            .set_override_option(
                "registration.secret",
                env::var("REGSERVER_REGISTRATION_SECRET").ok(),
            )
            .map_err(config_err)?
            .set_override_option(
                "logging.enabled",
                env::var("REGSERVER_LOGGING_ENABLED")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok()),
            )
            .map_err(config_err)?
            .set_override_option("logging.level", env::var("REGSERVER_LOG_LEVEL").ok())
            .map_err(config_err)?;

        let settings = builder
            .build()
            .map_err(|e| LicenseError::ConfigError(format!("failed to build config: {e}")))?;

        settings
            .try_deserialize()
            .map_err(|e| LicenseError::ConfigError(format!("failed to deserialize config: {e}")))
    }

    /// Validate the configuration.
    pub fn validate(&self) -> LicenseResult<()> {
        if self.server.port == 0 {
            return Err(LicenseError::ConfigError(
                "server.port must be greater than 0".to_string(),
            ));
        }

        match self.database.db_type.as_str() {
            "sqlite" | "postgres" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "database.db_type must be 'sqlite' or 'postgres', got '{other}'"
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(LicenseError::ConfigError(
                "database.max_connections must be greater than 0".to_string(),
            ));
        }

        if self.registration.secret.trim().is_empty() {
            return Err(LicenseError::ConfigError(
                "registration.secret is required (set REGSERVER_REGISTRATION_SECRET)".to_string(),
            ));
        }

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(LicenseError::ConfigError(format!(
                    "logging.level must be one of: trace, debug, info, warn, error. Got '{other}'"
                )));
            }
        }

        Ok(())
    }

    /// Socket address string the server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Connection URL for the configured backend.
    pub fn database_url(&self) -> &str {
        match self.database.db_type.as_str() {
            "postgres" => &self.database.postgres_url,
            _ => &self.database.sqlite_url,
        }
    }
}

/// Get the global configuration, loading and validating it on first access.
pub fn get_config() -> LicenseResult<&'static RegServerConfig> {
    if let Some(config) = CONFIG.get() {
        return Ok(config);
    }

    let config = RegServerConfig::load()?;
    config.validate()?;

    // Another thread may have won the race; either value is equivalent.
    let _ = CONFIG.set(config);

    CONFIG
        .get()
        .ok_or_else(|| LicenseError::ConfigError("configuration not initialized".to_string()))
}
