//! BMN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Top-level error type for the printer monitor.
///
/// Only the configuration family and [`MonitorError::Connection`] are fatal;
/// everything a single tick can produce lives in [`TickError`].
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("[BMN-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[BMN-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[BMN-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[BMN-2001] printer connection failed after {attempts} attempts: {details}")]
    Connection { attempts: u32, details: String },

    #[error("[BMN-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[BMN-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[BMN-3900] runtime failure: {details}")]
    Runtime { details: String },

    /// Shutdown was requested before `stage` finished.
    #[error("[BMN-3901] shutdown requested during {stage}")]
    Interrupted { stage: &'static str },
}

impl MonitorError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "BMN-1001",
            Self::MissingConfig { .. } => "BMN-1002",
            Self::ConfigParse { .. } => "BMN-1003",
            Self::Connection { .. } => "BMN-2001",
            Self::Serialization { .. } => "BMN-2101",
            Self::Io { .. } => "BMN-3002",
            Self::Runtime { .. } => "BMN-3900",
            Self::Interrupted { .. } => "BMN-3901",
        }
    }

    /// Whether the failure happened before any resource was acquired.
    #[must_use]
    pub const fn is_startup_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig { .. } | Self::MissingConfig { .. } | Self::ConfigParse { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for MonitorError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

/// Failure reported by the device driver for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{operation}: {details}")]
pub struct DeviceError {
    pub operation: &'static str,
    pub details: String,
}

impl DeviceError {
    #[must_use]
    pub fn new(operation: &'static str, details: impl Into<String>) -> Self {
        Self {
            operation,
            details: details.into(),
        }
    }
}

/// A telemetry read failed. Recoverable: the tick is abandoned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("[BMN-4001] telemetry read failed: {0}")]
pub struct SampleError(#[from] pub DeviceError);

/// Recoverable faults that end a single tick early.
#[derive(Debug, Error)]
pub enum TickError {
    #[error(transparent)]
    Sample(#[from] SampleError),

    #[error("[BMN-4002] camera capture failed: {details}")]
    ImageCapture { details: String },
}

impl TickError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Sample(_) => "BMN-4001",
            Self::ImageCapture { .. } => "BMN-4002",
        }
    }
}

/// Notifier delivery failure. Never affects health.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("[BMN-5001] notifier transport failure: {details}")]
    Transport { details: String },

    #[error("[BMN-5002] notifier rejected request ({status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("[BMN-5003] notifier disabled: {details}")]
    Disabled { details: String },
}

impl DispatchError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Transport { .. } => "BMN-5001",
            Self::Rejected { .. } => "BMN-5002",
            Self::Disabled { .. } => "BMN-5003",
        }
    }
}
