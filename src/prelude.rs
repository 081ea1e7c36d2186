//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use bambu_monitor::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{DispatchError, MonitorError, Result, TickError};
pub use crate::core::retry::{RetryPolicy, Sleeper, ThreadSleeper, retry_with_delay};

// Device
pub use crate::device::connector::{ConnectedPrinter, DeviceConnector};
pub use crate::device::sampler::{FinishTime, PrintStatus, TelemetrySnapshot, sample};
pub use crate::device::{DeviceFactory, DriverRegistry, PrinterDevice};

// Daemon
pub use crate::daemon::artifact::ImageArtifact;
pub use crate::daemon::health::{HealthRecord, HealthState};
pub use crate::daemon::health_server::HealthServer;
#[cfg(feature = "daemon")]
pub use crate::daemon::loop_main::{LoopPhase, MonitorLoop, TickOutcome, TickReport};
pub use crate::daemon::notifications::{
    DispatchOutcome, NotificationDispatcher, Notifier, TelegramNotifier,
};
#[cfg(feature = "daemon")]
pub use crate::daemon::signals::{ShutdownCoordinator, SignalHandler};
pub use crate::daemon::transition::{Decision, TransitionDetector};

// Logger
pub use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
pub use crate::logger::jsonl::LogLevel;
