use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::models::user::AccessLevel;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controllers: Vec<ControllerConfig>,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One door controller to synchronize
#[derive(Clone, Deserialize)]
pub struct ControllerConfig {
    /// `host` or `host:port`; login and socket URLs are derived from it
    pub host: String,
    pub username: String,
    pub password: String,
    /// Label used in logs, defaults to the host
    pub name: Option<String>,
}

impl ControllerConfig {
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.host)
    }

    pub fn login_url(&self) -> String {
        format!("http://{}/login", self.host)
    }

    pub fn socket_url(&self) -> String {
        format!("ws://{}/ws", self.host)
    }
}

// Keep the password out of logs
impl std::fmt::Debug for ControllerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerConfig")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("name", &self.name)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_connect_settle_ms")]
    pub connect_settle_ms: u64,
    #[serde(default = "default_page_interval_ms")]
    pub page_interval_ms: u64,
    #[serde(default = "default_command_interval_ms")]
    pub command_interval_ms: u64,
    #[serde(default = "default_response_timeout_secs")]
    pub response_timeout_secs: u64,
    #[serde(default = "default_login_timeout_secs")]
    pub login_timeout_secs: u64,
}

impl SyncConfig {
    pub fn connect_settle(&self) -> Duration {
        Duration::from_millis(self.connect_settle_ms)
    }

    pub fn page_interval(&self) -> Duration {
        Duration::from_millis(self.page_interval_ms)
    }

    pub fn command_interval(&self) -> Duration {
        Duration::from_millis(self.command_interval_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connect_settle_ms: default_connect_settle_ms(),
            page_interval_ms: default_page_interval_ms(),
            command_interval_ms: default_command_interval_ms(),
            response_timeout_secs: default_response_timeout_secs(),
            login_timeout_secs: default_login_timeout_secs(),
        }
    }
}

/// Values applied to roster rows that do not carry their own
#[derive(Debug, Clone, Deserialize)]
pub struct RosterConfig {
    #[serde(default = "default_access_level")]
    pub access_level: u8,
    #[serde(default = "default_valid_until")]
    pub valid_until: i64,
}

impl RosterConfig {
    pub fn default_access_level(&self) -> AccessLevel {
        AccessLevel::from_code(self.access_level)
    }
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            access_level: default_access_level(),
            valid_until: default_valid_until(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_connect_settle_ms() -> u64 {
    1000
}

fn default_page_interval_ms() -> u64 {
    3000
}

fn default_command_interval_ms() -> u64 {
    1500
}

fn default_response_timeout_secs() -> u64 {
    30
}

fn default_login_timeout_secs() -> u64 {
    10
}

fn default_access_level() -> u8 {
    1 // always
}

fn default_valid_until() -> i64 {
    4_200_000_000 // year 2103
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "console".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.controllers.is_empty() {
            bail!("At least one [[controllers]] entry must be configured");
        }

        for (index, controller) in self.controllers.iter().enumerate() {
            if controller.host.trim().is_empty() {
                bail!("controllers[{}]: host must not be empty", index);
            }

            if controller.host.contains("://") || controller.host.contains('/') {
                bail!(
                    "controllers[{}]: host '{}' must be a bare host[:port] without scheme or path",
                    index,
                    controller.host
                );
            }

            if controller.username.is_empty() {
                bail!("controllers[{}]: username must not be empty", index);
            }
        }

        if self.sync.response_timeout_secs == 0 {
            bail!("response_timeout_secs must be greater than 0");
        }

        if self.sync.login_timeout_secs == 0 {
            bail!("login_timeout_secs must be greater than 0");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}
