//! JSONL logger: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! log shipper tailing stdout never sees interleaved partial lines.
//!
//! Degradation chain:
//! 1. Primary sink (stdout in production)
//! 2. stderr with `[BMN-JSONL]` prefix
//! 3. Silent discard (the monitor must never crash for logging failures)

#![allow(missing_docs)]

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Logger name stamped on every entry.
pub const LOGGER_NAME: &str = "bambu_monitor";

/// Severity level for log events, ordered by verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    #[serde(alias = "debug")]
    Debug,
    #[serde(alias = "info")]
    Info,
    #[serde(alias = "warning", alias = "WARN", alias = "warn")]
    Warning,
    #[serde(alias = "error")]
    Error,
}

impl LogLevel {
    /// Interpret a `LOG_LEVEL` value. Unknown values fall back to `Info`.
    #[must_use]
    pub fn from_env_value(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "WARNING" | "WARN" => Self::Warning,
            "ERROR" => Self::Error,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Debug => write!(f, "DEBUG"),
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A single JSONL log line.
///
/// `fields` are flattened into the top-level object so downstream pipelines
/// can index telemetry keys directly.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub level: LogLevel,
    pub logger: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LogEntry {
    /// Create a new entry stamped with the current local time.
    pub fn new(level: LogLevel, logger: &str) -> Self {
        Self {
            timestamp: format_local_now(),
            level,
            logger: logger.to_string(),
            message: None,
            fields: Map::new(),
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields.extend(fields);
        self
    }
}

/// Degradation state of the writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Normal,
    Stderr,
    Discard,
}

/// Line-oriented JSON writer with fallback to stderr.
pub struct JsonlWriter {
    sink: Box<dyn Write + Send>,
    state: WriterState,
    lines_written: u64,
}

impl JsonlWriter {
    /// Wrap an arbitrary sink.
    pub fn new(sink: Box<dyn Write + Send>) -> Self {
        Self {
            sink,
            state: WriterState::Normal,
            lines_written: 0,
        }
    }

    /// Write a single entry as one line.
    pub fn write_entry(&mut self, entry: &LogEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(json) => format!("{json}\n"),
            Err(e) => {
                let _ = writeln!(io::stderr(), "[BMN-JSONL] serialize error: {e}");
                return;
            }
        };
        self.write_line(&line);
    }

    pub fn flush(&mut self) {
        if self.state == WriterState::Normal {
            let _ = self.sink.flush();
        }
    }

    /// Current degradation state.
    pub fn state(&self) -> &str {
        match self.state {
            WriterState::Normal => "normal",
            WriterState::Stderr => "stderr",
            WriterState::Discard => "discard",
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn write_line(&mut self, line: &str) {
        match self.state {
            WriterState::Normal => {
                if self.sink.write_all(line.as_bytes()).is_err() || self.sink.flush().is_err() {
                    self.state = WriterState::Stderr;
                    let _ = writeln!(io::stderr(), "[BMN-JSONL] primary sink failed, using stderr");
                    self.write_line(line);
                    return;
                }
                self.lines_written += 1;
            }
            WriterState::Stderr => {
                if write!(io::stderr(), "[BMN-JSONL] {line}").is_err() {
                    self.state = WriterState::Discard;
                } else {
                    self.lines_written += 1;
                }
            }
            WriterState::Discard => {}
        }
    }
}

/// In-memory sink shared between a writer and an observer.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Local timestamp in the `2024-05-01 13:37:00,123` layout.
#[must_use]
pub fn format_local_now() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d %H:%M:%S,%3f")
        .to_string()
}
