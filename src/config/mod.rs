//! Configuration management
//!
//! This module handles loading and parsing configuration for Rollcall.
//! Configuration can be loaded from:
//! - config.yml file
//! - Environment variables (override file settings)
//!
//! Missing optional values are filled with sensible defaults.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Session configuration
    #[serde(default)]
    pub session: SessionConfig,
    /// Initial administrator account (created only when no users exist)
    #[serde(default)]
    pub bootstrap: Option<BootstrapAdmin>,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database driver (sqlite or mysql)
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// Database connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "data/rollcall.db".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// MySQL
    Mysql,
}

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Where session records live
    #[serde(default)]
    pub store: SessionStoreDriver,
    /// Inactivity timeout in seconds (default: 2 hours, at most one year)
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Name of the session cookie
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Whether the cookie carries the `Secure` attribute
    #[serde(default)]
    pub cookie_secure: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: SessionStoreDriver::default(),
            timeout_seconds: default_timeout_seconds(),
            cookie_name: default_cookie_name(),
            cookie_secure: false,
        }
    }
}

/// Upper bound for `session.timeout_seconds`
pub const MAX_SESSION_TIMEOUT_SECONDS: u64 = 365 * 24 * 60 * 60;

impl SessionConfig {
    /// Inactivity timeout as a chrono duration, clamped to one year
    pub fn timeout(&self) -> chrono::Duration {
        let seconds = self.timeout_seconds.min(MAX_SESSION_TIMEOUT_SECONDS);
        chrono::Duration::seconds(seconds as i64)
    }
}

fn default_timeout_seconds() -> u64 {
    7200
}

fn default_cookie_name() -> String {
    "rollcall_session".to_string()
}

/// Session store backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionStoreDriver {
    /// Sessions table in the configured database (default)
    #[default]
    Database,
    /// Process memory; sessions are lost on restart
    Memory,
}

/// Administrator account created on first start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapAdmin {
    pub username: String,
    pub password: String,
    #[serde(default = "default_full_name")]
    pub full_name: String,
}

fn default_full_name() -> String {
    "Administrator".to_string()
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError {
        path: String,
        message: String,
    },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// If the file doesn't exist, returns default configuration.
    /// If the file exists but is invalid YAML, returns an error with details.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::ParseError {
                path: path.display().to_string(),
                message: format_yaml_error(&e),
            }
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Environment variables follow the pattern `ROLLCALL_<SECTION>_<KEY>`:
    /// - ROLLCALL_SERVER_HOST / ROLLCALL_SERVER_PORT
    /// - ROLLCALL_DATABASE_DRIVER / ROLLCALL_DATABASE_URL
    /// - ROLLCALL_SESSION_STORE / ROLLCALL_SESSION_TIMEOUT_SECONDS
    /// - ROLLCALL_SESSION_COOKIE_NAME / ROLLCALL_SESSION_COOKIE_SECURE
    /// - ROLLCALL_BOOTSTRAP_USERNAME / ROLLCALL_BOOTSTRAP_PASSWORD / ROLLCALL_BOOTSTRAP_FULL_NAME
    pub fn load_with_env(path: &std::path::Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "session.timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.session.timeout_seconds > MAX_SESSION_TIMEOUT_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "session.timeout_seconds must be at most {}",
                MAX_SESSION_TIMEOUT_SECONDS
            )));
        }
        if self.session.cookie_name.trim().is_empty()
            || self
                .session
                .cookie_name
                .chars()
                .any(|c| c.is_whitespace() || c == ';' || c == '=' || c == ',')
        {
            return Err(ConfigError::ValidationError(format!(
                "session.cookie_name '{}' is not a valid cookie name",
                self.session.cookie_name
            )));
        }
        if let Some(bootstrap) = &self.bootstrap {
            if bootstrap.username.trim().is_empty() || bootstrap.password.is_empty() {
                return Err(ConfigError::ValidationError(
                    "bootstrap requires both username and password".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to the configuration
    fn apply_env_overrides(&mut self) {
        // Server configuration
        if let Ok(host) = std::env::var("ROLLCALL_SERVER_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("ROLLCALL_SERVER_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }

        // Database configuration
        if let Ok(driver) = std::env::var("ROLLCALL_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "mysql" => self.database.driver = DatabaseDriver::Mysql,
                _ => {} // Ignore invalid values
            }
        }
        if let Ok(url) = std::env::var("ROLLCALL_DATABASE_URL") {
            self.database.url = url;
        }

        // Session configuration
        if let Ok(store) = std::env::var("ROLLCALL_SESSION_STORE") {
            match store.to_lowercase().as_str() {
                "database" => self.session.store = SessionStoreDriver::Database,
                "memory" => self.session.store = SessionStoreDriver::Memory,
                _ => {}
            }
        }
        if let Ok(timeout) = std::env::var("ROLLCALL_SESSION_TIMEOUT_SECONDS") {
            if let Ok(timeout) = timeout.parse::<u64>() {
                self.session.timeout_seconds = timeout;
            }
        }
        if let Ok(name) = std::env::var("ROLLCALL_SESSION_COOKIE_NAME") {
            self.session.cookie_name = name;
        }
        if let Ok(secure) = std::env::var("ROLLCALL_SESSION_COOKIE_SECURE") {
            match secure.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.session.cookie_secure = true,
                "0" | "false" | "no" => self.session.cookie_secure = false,
                _ => {}
            }
        }

        // Bootstrap admin: username and password must both be present
        let username = std::env::var("ROLLCALL_BOOTSTRAP_USERNAME").ok();
        let password = std::env::var("ROLLCALL_BOOTSTRAP_PASSWORD").ok();
        if let (Some(username), Some(password)) = (username, password) {
            let full_name = std::env::var("ROLLCALL_BOOTSTRAP_FULL_NAME")
                .ok()
                .or_else(|| self.bootstrap.as_ref().map(|b| b.full_name.clone()))
                .unwrap_or_else(default_full_name);
            self.bootstrap = Some(BootstrapAdmin {
                username,
                password,
                full_name,
            });
        }
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared mutex for config tests that modify environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
