//! Configuration system: optional TOML file + env var overrides + validation.
//!
//! The environment names match the container deployment of the monitor
//! (`BAMBU_IP`, `TG_BOT_TOKEN`, ...), so a bare `docker run -e ...` works
//! without any file on disk.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{MonitorError, Result};
use crate::daemon::notifications::NotificationConfig;
use crate::device::{DriverRegistry, simulated};
use crate::logger::jsonl::LogLevel;

/// Full monitor configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub printer: PrinterConfig,
    pub connection: ConnectionConfig,
    pub monitor: MonitorConfig,
    pub health: HealthConfig,
    pub notifications: NotificationConfig,
    pub logging: LoggingConfig,
}

/// Printer identity and credentials.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PrinterConfig {
    pub ip: String,
    pub serial: String,
    pub access_code: String,
    /// Device driver used to talk to the printer.
    pub driver: String,
}

/// Connection retry budget.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Total connection attempts before giving up.
    pub max_retries: u32,
    pub retry_delay_secs: u64,
    /// Wait after a successful connect so the printer's report stream fills in.
    pub stabilization_delay_secs: u64,
}

/// Poll loop pacing and tick-scoped artifacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
    /// Where the camera snapshot is written while a notification is sent.
    pub image_path: PathBuf,
}

/// Health endpoint binding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HealthConfig {
    pub port: u16,
}

/// Log verbosity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
}

impl Default for PrinterConfig {
    fn default() -> Self {
        Self {
            ip: String::new(),
            serial: String::new(),
            access_code: String::new(),
            driver: simulated::DRIVER_NAME.to_string(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay_secs: 10,
            stabilization_delay_secs: 5,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            image_path: PathBuf::from("bambu_status.png"),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
        }
    }
}

impl ConnectionConfig {
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    #[must_use]
    pub const fn stabilization_delay(&self) -> Duration {
        Duration::from_secs(self.stabilization_delay_secs)
    }
}

impl MonitorConfig {
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Config {
    /// Default configuration path, relative to the working directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathBuf::from("bambu-monitor.toml")
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, |name| env_var(name))
    }

    /// Same as [`Config::load`] with an explicit environment lookup.
    pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| MonitorError::Io {
                path: path_buf.clone(),
                source,
            })?;
            toml::from_str::<Self>(&raw)?
        } else if path.is_some() {
            return Err(MonitorError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.apply_env_overrides_from(lookup)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic FNV-1a hash of the effective config for the startup log line.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Copy with credentials masked, for `--print-config`.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.printer.access_code.is_empty() {
            copy.printer.access_code = "***".to_string();
        }
        if copy.notifications.bot_token.is_some() {
            copy.notifications.bot_token = Some("***".to_string());
        }
        copy
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("BAMBU_IP") {
            self.printer.ip = raw;
        }
        if let Some(raw) = lookup("BAMBU_SERIAL") {
            self.printer.serial = raw;
        }
        if let Some(raw) = lookup("BAMBU_ACCESS_CODE") {
            self.printer.access_code = raw;
        }
        if let Some(raw) = lookup("BAMBU_DEVICE_DRIVER") {
            self.printer.driver = raw;
        }

        if let Some(raw) = lookup("HEALTH_PORT") {
            self.health.port = parse_env("HEALTH_PORT", &raw)?;
        }

        if let Some(raw) = lookup("TG_BOT_TOKEN") {
            self.notifications.bot_token = Some(raw);
        }
        if let Some(raw) = lookup("TG_CHAT_ID") {
            self.notifications.chat_id = Some(raw);
        }

        if let Some(raw) = lookup("LOG_LEVEL") {
            self.logging.level = LogLevel::from_env_value(&raw);
        }

        if let Some(raw) = lookup("BAMBU_POLL_INTERVAL_SECS") {
            self.monitor.poll_interval_secs = parse_env("BAMBU_POLL_INTERVAL_SECS", &raw)?;
        }
        if let Some(raw) = lookup("BAMBU_IMAGE_PATH") {
            self.monitor.image_path = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("BAMBU_MAX_RETRIES") {
            self.connection.max_retries = parse_env("BAMBU_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("BAMBU_RETRY_DELAY_SECS") {
            self.connection.retry_delay_secs = parse_env("BAMBU_RETRY_DELAY_SECS", &raw)?;
        }
        if let Some(raw) = lookup("BAMBU_CONNECTION_WAIT_SECS") {
            self.connection.stabilization_delay_secs =
                parse_env("BAMBU_CONNECTION_WAIT_SECS", &raw)?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("BAMBU_IP", &self.printer.ip),
            ("BAMBU_SERIAL", &self.printer.serial),
            ("BAMBU_ACCESS_CODE", &self.printer.access_code),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();
        if !missing.is_empty() {
            return Err(MonitorError::InvalidConfig {
                details: format!(
                    "printer address, serial and access code are required; set {}",
                    missing.join(", ")
                ),
            });
        }

        if !DriverRegistry::DRIVERS.contains(&self.printer.driver.as_str()) {
            return Err(MonitorError::InvalidConfig {
                details: format!(
                    "unknown device driver {:?}; available: {}",
                    self.printer.driver,
                    DriverRegistry::DRIVERS.join(", ")
                ),
            });
        }

        if self.health.port == 0 {
            return Err(MonitorError::InvalidConfig {
                details: "health.port must be a non-zero TCP port".to_string(),
            });
        }

        if self.monitor.poll_interval_secs == 0 {
            return Err(MonitorError::InvalidConfig {
                details: "monitor.poll_interval_secs must be > 0".to_string(),
            });
        }

        if self.monitor.image_path.as_os_str().is_empty() {
            return Err(MonitorError::InvalidConfig {
                details: "monitor.image_path must not be empty".to_string(),
            });
        }

        if self.connection.max_retries == 0 {
            return Err(MonitorError::InvalidConfig {
                details: "connection.max_retries must be >= 1".to_string(),
            });
        }

        if self.notifications.request_timeout_secs == 0 {
            return Err(MonitorError::InvalidConfig {
                details: "notifications.request_timeout_secs must be > 0".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| MonitorError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}
