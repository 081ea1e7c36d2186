//! Logger thread: the monitor loop, connector and health server all report
//! through one `ActivityLoggerHandle`.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Producers send
//! [`ActivityEvent`]s over a bounded crossbeam channel with `try_send()`, so a
//! slow stdout never stalls a poll tick.

#![allow(missing_docs)]

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use serde_json::{Map, Value};

use crate::core::errors::{MonitorError, Result};
use crate::logger::jsonl::{JsonlWriter, LOGGER_NAME, LogEntry, LogLevel};

// ──────────────────── channel capacity ────────────────────

/// Default bounded channel capacity for log events.
const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── public event type ────────────────────

/// Everything the monitor reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivityEvent {
    MonitorStarted {
        version: String,
        ip: String,
        serial: String,
        config_hash: String,
    },
    MonitorStopped {
        reason: String,
        uptime_secs: u64,
    },
    PhaseChanged {
        from: String,
        to: String,
    },
    ConnectionAttemptFailed {
        attempt: u32,
        max_attempts: u32,
        error: String,
    },
    PrinterConnected {
        attempts: u32,
    },
    /// One telemetry sample; keys are flattened into the log line.
    StatusUpdate {
        fields: Map<String, Value>,
    },
    NotificationSent {
        status: String,
        via: &'static str,
    },
    NotificationFailed {
        code: String,
        message: String,
    },
    TickFailed {
        code: String,
        message: String,
    },
    /// Free-form message at an explicit level.
    Log {
        level: LogLevel,
        message: String,
    },
    /// Sentinel to request graceful shutdown of the logger thread.
    Shutdown,
}

// ──────────────────── public handle ────────────────────

/// Thread-safe, cheaply-cloneable handle for sending log events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// A handle whose events land on the returned receiver instead of a
    /// logger thread.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, Receiver<ActivityEvent>) {
        let (tx, rx) = bounded::<ActivityEvent>(capacity);
        (
            Self {
                tx,
                dropped_events: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Send an event to the logger thread. Non-blocking.
    ///
    /// If the channel is full the event is dropped and the dropped-events
    /// counter is incremented.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
        // Disconnected is fine during shutdown.
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(ActivityEvent::Log {
            level,
            message: message.into(),
        });
    }

    pub fn debug(&self, message: impl Into<String>) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.log(LogLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(LogLevel::Error, message);
    }

    /// Number of events dropped due to channel back-pressure.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

// ──────────────────── configuration ────────────────────

/// Options for the logger thread.
pub struct LoggerConfig {
    /// Entries below this level are discarded.
    pub min_level: LogLevel,
    pub channel_capacity: usize,
    pub sink: Box<dyn Write + Send>,
}

impl LoggerConfig {
    /// Log to stdout at `min_level`.
    #[must_use]
    pub fn stdout(min_level: LogLevel) -> Self {
        Self {
            min_level,
            channel_capacity: CHANNEL_CAPACITY,
            sink: Box::new(std::io::stdout()),
        }
    }
}

// ──────────────────── spawn ────────────────────

/// Spawn the logger thread and return a handle.
///
/// The thread runs until `handle.shutdown()` is called or all senders are
/// dropped.
pub fn spawn_logger(
    config: LoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (handle, rx) = ActivityLoggerHandle::channel(config.channel_capacity);
    let dropped = Arc::clone(&handle.dropped_events);
    let writer = JsonlWriter::new(config.sink);
    let min_level = config.min_level;

    let join = thread::Builder::new()
        .name("bambu-logger".to_string())
        .spawn(move || logger_thread_main(&rx, writer, min_level, &dropped))
        .map_err(|e| MonitorError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

// ──────────────────── logger thread ────────────────────

fn logger_thread_main(
    rx: &Receiver<ActivityEvent>,
    mut writer: JsonlWriter,
    min_level: LogLevel,
    dropped: &AtomicU64,
) {
    while let Ok(event) = rx.recv() {
        let d = dropped.swap(0, Ordering::Relaxed);
        if d > 0 && LogLevel::Warning >= min_level {
            writer.write_entry(
                &LogEntry::new(LogLevel::Warning, LOGGER_NAME)
                    .with_message(format!("{d} log events dropped due to back-pressure")),
            );
        }

        let Some(entry) = event_to_log_entry(&event) else {
            break;
        };
        if entry.level >= min_level {
            writer.write_entry(&entry);
        }
    }

    writer.flush();
}

// ──────────────────── event conversion ────────────────────

/// Render an event as a log line. `None` for the shutdown sentinel.
pub fn event_to_log_entry(event: &ActivityEvent) -> Option<LogEntry> {
    let entry = match event {
        ActivityEvent::MonitorStarted {
            version,
            ip,
            serial,
            config_hash,
        } => {
            let mut fields = Map::new();
            fields.insert("IP".to_string(), Value::from(ip.as_str()));
            fields.insert("Serial".to_string(), Value::from(serial.as_str()));
            fields.insert("version".to_string(), Value::from(version.as_str()));
            fields.insert("config_hash".to_string(), Value::from(config_hash.as_str()));
            LogEntry::new(LogLevel::Info, LOGGER_NAME)
                .with_message("Starting Bambu Monitor")
                .with_fields(fields)
        }
        ActivityEvent::MonitorStopped {
            reason,
            uptime_secs,
        } => LogEntry::new(LogLevel::Info, LOGGER_NAME)
            .with_message(format!("Monitor stopped: reason={reason} uptime={uptime_secs}s")),
        ActivityEvent::PhaseChanged { from, to } => LogEntry::new(LogLevel::Debug, LOGGER_NAME)
            .with_message(format!("phase {from} -> {to}")),
        ActivityEvent::ConnectionAttemptFailed {
            attempt,
            max_attempts,
            error,
        } => LogEntry::new(LogLevel::Warning, LOGGER_NAME).with_message(format!(
            "Connection attempt {attempt}/{max_attempts} failed: {error}"
        )),
        ActivityEvent::PrinterConnected { attempts } => LogEntry::new(LogLevel::Info, LOGGER_NAME)
            .with_message(format!("Connected to printer after {attempts} attempt(s)")),
        ActivityEvent::StatusUpdate { fields } => {
            LogEntry::new(LogLevel::Info, LOGGER_NAME).with_fields(fields.clone())
        }
        ActivityEvent::NotificationSent { status, via } => {
            LogEntry::new(LogLevel::Info, LOGGER_NAME)
                .with_message(format!("Notification for {status} sent via {via}"))
        }
        ActivityEvent::NotificationFailed { code, message } => {
            LogEntry::new(LogLevel::Error, LOGGER_NAME)
                .with_message(format!("Failed to send notification [{code}]: {message}"))
        }
        ActivityEvent::TickFailed { code, message } => LogEntry::new(LogLevel::Error, LOGGER_NAME)
            .with_message(format!("Error in monitoring loop [{code}]: {message}")),
        ActivityEvent::Log { level, message } => {
            LogEntry::new(*level, LOGGER_NAME).with_message(message.clone())
        }
        ActivityEvent::Shutdown => return None,
    };
    Some(entry)
}
