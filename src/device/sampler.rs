//! Per-tick telemetry snapshot.

#![allow(missing_docs)]

use std::fmt;

use chrono::{DateTime, Local, TimeDelta};
use serde_json::{Map, Value};

use crate::core::errors::SampleError;
use crate::device::PrinterDevice;

/// Layout used for the computed finish time.
pub const FINISH_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Coarse job state reported by the printer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PrintStatus {
    Idle,
    Prepare,
    Running,
    Paused,
    Finished,
    Failed,
    /// Anything the printer reports that the monitor has no name for.
    Other(String),
}

impl PrintStatus {
    /// Parse a vendor state string. `PAUSE` and `FINISH` are accepted as
    /// spellings of [`PrintStatus::Paused`] and [`PrintStatus::Finished`].
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_uppercase().as_str() {
            "IDLE" => Self::Idle,
            "PREPARE" => Self::Prepare,
            "RUNNING" => Self::Running,
            "PAUSE" | "PAUSED" => Self::Paused,
            "FINISH" | "FINISHED" => Self::Finished,
            "FAILED" => Self::Failed,
            _ => Self::Other(trimmed.to_string()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Idle => "IDLE",
            Self::Prepare => "PREPARE",
            Self::Running => "RUNNING",
            Self::Paused => "PAUSED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for PrintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Projected end of the current job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishTime {
    At(DateTime<Local>),
    Unknown,
}

impl fmt::Display for FinishTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::At(at) => write!(f, "{}", at.format(FINISH_TIME_FORMAT)),
            Self::Unknown => f.write_str("NA"),
        }
    }
}

/// `now + remaining` when the printer reports a positive remaining time.
///
/// Durations that do not fit the calendar yield [`FinishTime::Unknown`].
#[must_use]
pub fn compute_finish_time(now: DateTime<Local>, remaining_minutes: Option<i64>) -> FinishTime {
    match remaining_minutes {
        Some(minutes) if minutes > 0 => TimeDelta::try_minutes(minutes)
            .and_then(|delta| now.checked_add_signed(delta))
            .map_or(FinishTime::Unknown, FinishTime::At),
        _ => FinishTime::Unknown,
    }
}

/// Everything the monitor knows about the printer at one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub status: PrintStatus,
    pub sub_status: String,
    pub percentage: u32,
    pub layer: u32,
    pub total_layers: u32,
    /// Degrees C; absent readings are recorded as 0.
    pub bed_temperature: f64,
    pub nozzle_temperature: f64,
    pub remaining_minutes: Option<i64>,
    pub finish_time: FinishTime,
}

impl TelemetrySnapshot {
    /// Bed temperature rounded to whole degrees.
    #[must_use]
    pub fn bed_display(&self) -> String {
        format!("{:.0}", self.bed_temperature)
    }

    #[must_use]
    pub fn nozzle_display(&self) -> String {
        format!("{:.0}", self.nozzle_temperature)
    }

    #[must_use]
    pub fn remaining_display(&self) -> String {
        self.remaining_minutes
            .map_or_else(|| "NA".to_string(), |m| m.to_string())
    }

    /// Fields of the status-update log line.
    #[must_use]
    pub fn log_fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert("status".to_string(), Value::from(self.status.as_str()));
        fields.insert("extended_status".to_string(), Value::from(self.sub_status.as_str()));
        fields.insert(
            "layers".to_string(),
            Value::from(format!("{}/{}", self.layer, self.total_layers)),
        );
        fields.insert("percentage".to_string(), Value::from(self.percentage));
        fields.insert("bed_temperature".to_string(), Value::from(self.bed_display()));
        fields.insert("nozzle_temperature".to_string(), Value::from(self.nozzle_display()));
        fields.insert(
            "remaining_time_minutes".to_string(),
            self.remaining_minutes.map_or(Value::Null, Value::from),
        );
        fields.insert("finish_time".to_string(), Value::from(self.finish_time.to_string()));
        fields
    }
}

/// Read one snapshot from the device. `now` anchors the finish-time estimate.
pub fn sample(
    device: &mut dyn PrinterDevice,
    now: DateTime<Local>,
) -> Result<TelemetrySnapshot, SampleError> {
    device.refresh()?;
    let status = PrintStatus::parse(&device.state()?);
    let sub_status = device.sub_state()?.trim().to_string();
    let percentage = device.percentage()?.min(100);
    let layer = device.current_layer()?;
    let total_layers = device.total_layers()?;
    let bed_temperature = device.bed_temperature()?.unwrap_or(0.0);
    let nozzle_temperature = device.nozzle_temperature()?.unwrap_or(0.0);
    let remaining_minutes = device.remaining_minutes()?;

    Ok(TelemetrySnapshot {
        status,
        sub_status,
        percentage,
        layer,
        total_layers,
        bed_temperature,
        nozzle_temperature,
        remaining_minutes,
        finish_time: compute_finish_time(now, remaining_minutes),
    })
}
