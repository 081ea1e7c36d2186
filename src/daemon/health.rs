//! Process-wide liveness record shared by the poll loop and the HTTP responder.
//!
//! The whole record sits behind one `parking_lot::Mutex`: writers replace every
//! field in a single critical section and readers clone under the same lock, so
//! a reader can never observe `healthy` from one update paired with `error`
//! from another.

#![allow(missing_docs)]

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Terminal error text recorded during drain.
pub const SERVICE_STOPPED: &str = "Service stopped";

/// One consistent reading of the health state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthRecord {
    pub healthy: bool,
    pub printer_connected: bool,
    /// ISO-8601 local time of the last write; `None` until the first update.
    pub last_update: Option<String>,
    pub error: Option<String>,
}

/// Wire shape of `GET /health`.
#[derive(Debug, Serialize)]
struct HealthBody<'a> {
    status: &'static str,
    printer_connected: bool,
    last_update: Option<&'a str>,
    error: Option<&'a str>,
}

impl HealthRecord {
    /// 200 when healthy, 503 otherwise.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        if self.healthy { 200 } else { 503 }
    }

    /// Pretty-printed JSON body for the health endpoint.
    #[must_use]
    pub fn to_json(&self) -> String {
        let body = HealthBody {
            status: if self.healthy { "healthy" } else { "unhealthy" },
            printer_connected: self.printer_connected,
            last_update: self.last_update.as_deref(),
            error: self.error.as_deref(),
        };
        serde_json::to_string_pretty(&body).unwrap_or_else(|e| {
            format!("{{\"status\":\"unhealthy\",\"error\":\"health serialization failed: {e}\"}}")
        })
    }
}

/// Cheaply-cloneable handle to the shared record.
#[derive(Debug, Clone, Default)]
pub struct HealthState {
    inner: Arc<Mutex<HealthRecord>>,
}

impl HealthState {
    /// Unhealthy, disconnected, never updated.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole record and stamp `last_update`.
    pub fn update(&self, healthy: bool, printer_connected: bool, error: Option<String>) {
        let last_update = Some(now_iso8601());
        let mut record = self.inner.lock();
        *record = HealthRecord {
            healthy,
            printer_connected,
            last_update,
            error,
        };
    }

    /// Terminal state written during drain.
    pub fn mark_stopped(&self) {
        self.update(false, false, Some(SERVICE_STOPPED.to_string()));
    }

    /// Consistent copy of the current record.
    #[must_use]
    pub fn snapshot(&self) -> HealthRecord {
        self.inner.lock().clone()
    }
}

fn now_iso8601() -> String {
    chrono::Local::now()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}
