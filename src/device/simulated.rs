//! Deterministic in-process printer.
//!
//! Plays back a script of report frames, one per `refresh`, and holds the
//! last frame once the script is exhausted. Fault hooks cover the cases the
//! monitor has to survive: refused connections, failed reads and a dead
//! camera.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::core::config::PrinterConfig;
use crate::core::errors::DeviceError;
use crate::device::PrinterDevice;

pub const DRIVER_NAME: &str = "simulated";

/// 1x1 transparent PNG returned by the simulated camera.
pub const PLACEHOLDER_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44, 0x52,
    0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F, 0x15, 0xC4,
    0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00, 0x01, 0x00, 0x00,
    0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49, 0x45, 0x4E, 0x44, 0xAE,
    0x42, 0x60, 0x82,
];

/// One scripted printer report.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedFrame {
    pub state: String,
    pub sub_state: String,
    pub percentage: u32,
    pub layer: u32,
    pub total_layers: u32,
    pub bed_temperature: Option<f64>,
    pub nozzle_temperature: Option<f64>,
    pub remaining_minutes: Option<i64>,
    /// Every getter fails with this text while the frame is current.
    pub read_error: Option<String>,
    /// The camera fails with this text while the frame is current.
    pub camera_error: Option<String>,
}

impl SimulatedFrame {
    #[must_use]
    pub fn new(state: &str, sub_state: &str) -> Self {
        Self {
            state: state.to_string(),
            sub_state: sub_state.to_string(),
            percentage: 0,
            layer: 0,
            total_layers: 0,
            bed_temperature: Some(24.0),
            nozzle_temperature: Some(26.0),
            remaining_minutes: None,
            read_error: None,
            camera_error: None,
        }
    }

    #[must_use]
    pub fn progress(mut self, percentage: u32, layer: u32, total_layers: u32) -> Self {
        self.percentage = percentage;
        self.layer = layer;
        self.total_layers = total_layers;
        self
    }

    #[must_use]
    pub fn temperatures(mut self, bed: Option<f64>, nozzle: Option<f64>) -> Self {
        self.bed_temperature = bed;
        self.nozzle_temperature = nozzle;
        self
    }

    #[must_use]
    pub fn remaining(mut self, minutes: Option<i64>) -> Self {
        self.remaining_minutes = minutes;
        self
    }

    #[must_use]
    pub fn failing_reads(mut self, error: &str) -> Self {
        self.read_error = Some(error.to_string());
        self
    }

    #[must_use]
    pub fn failing_camera(mut self, error: &str) -> Self {
        self.camera_error = Some(error.to_string());
        self
    }
}

/// Shared counters for asserting on a device after it was boxed.
#[derive(Debug, Clone, Default)]
pub struct SimulatedCounters {
    connect_attempts: Arc<AtomicU32>,
    disconnects: Arc<AtomicU32>,
    refreshes: Arc<AtomicU32>,
}

impl SimulatedCounters {
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> u32 {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub struct SimulatedPrinter {
    frames: Vec<SimulatedFrame>,
    cursor: Option<usize>,
    connected: bool,
    refuse_connects: u32,
    counters: SimulatedCounters,
}

impl SimulatedPrinter {
    /// A printer that plays `frames` in order. An empty script reports IDLE.
    #[must_use]
    pub fn new(frames: Vec<SimulatedFrame>) -> Self {
        let frames = if frames.is_empty() {
            vec![SimulatedFrame::new("IDLE", "IDLE")]
        } else {
            frames
        };
        Self {
            frames,
            cursor: None,
            connected: false,
            refuse_connects: 0,
            counters: SimulatedCounters::default(),
        }
    }

    /// The driver used by the binary: a short job replayed from idle to finish.
    #[must_use]
    pub fn from_config(_printer: &PrinterConfig) -> Self {
        Self::new(demo_job())
    }

    /// Refuse the first `count` connection attempts.
    #[must_use]
    pub fn refusing_connects(mut self, count: u32) -> Self {
        self.refuse_connects = count;
        self
    }

    #[must_use]
    pub fn counters(&self) -> SimulatedCounters {
        self.counters.clone()
    }

    fn frame(&self, operation: &'static str) -> Result<&SimulatedFrame, DeviceError> {
        if !self.connected {
            return Err(DeviceError::new(operation, "printer not connected"));
        }
        let frame = &self.frames[self.cursor.unwrap_or(0)];
        match &frame.read_error {
            Some(error) => Err(DeviceError::new(operation, error.clone())),
            None => Ok(frame),
        }
    }
}

impl PrinterDevice for SimulatedPrinter {
    fn connect(&mut self) -> Result<(), DeviceError> {
        self.counters.connect_attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse_connects > 0 {
            self.refuse_connects -= 1;
            return Err(DeviceError::new("connect", "connection refused"));
        }
        self.connected = true;
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), DeviceError> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        self.connected = false;
        Ok(())
    }

    fn refresh(&mut self) -> Result<(), DeviceError> {
        if !self.connected {
            return Err(DeviceError::new("refresh", "printer not connected"));
        }
        self.counters.refreshes.fetch_add(1, Ordering::SeqCst);
        let last = self.frames.len() - 1;
        self.cursor = Some(self.cursor.map_or(0, |i| (i + 1).min(last)));
        Ok(())
    }

    fn state(&mut self) -> Result<String, DeviceError> {
        Ok(self.frame("get_state")?.state.clone())
    }

    fn sub_state(&mut self) -> Result<String, DeviceError> {
        Ok(self.frame("get_current_state")?.sub_state.clone())
    }

    fn percentage(&mut self) -> Result<u32, DeviceError> {
        Ok(self.frame("get_percentage")?.percentage)
    }

    fn current_layer(&mut self) -> Result<u32, DeviceError> {
        Ok(self.frame("current_layer_num")?.layer)
    }

    fn total_layers(&mut self) -> Result<u32, DeviceError> {
        Ok(self.frame("total_layer_num")?.total_layers)
    }

    fn bed_temperature(&mut self) -> Result<Option<f64>, DeviceError> {
        Ok(self.frame("get_bed_temperature")?.bed_temperature)
    }

    fn nozzle_temperature(&mut self) -> Result<Option<f64>, DeviceError> {
        Ok(self.frame("get_nozzle_temperature")?.nozzle_temperature)
    }

    fn remaining_minutes(&mut self) -> Result<Option<i64>, DeviceError> {
        Ok(self.frame("get_time")?.remaining_minutes)
    }

    fn camera_image(&mut self) -> Result<Vec<u8>, DeviceError> {
        let frame = self.frame("get_camera_image")?;
        match &frame.camera_error {
            Some(error) => Err(DeviceError::new("get_camera_image", error.clone())),
            None => Ok(PLACEHOLDER_PNG.to_vec()),
        }
    }
}

/// Idle, heat up, print in steps, finish.
#[must_use]
pub fn demo_job() -> Vec<SimulatedFrame> {
    let total_layers = 120;
    let mut frames = vec![
        SimulatedFrame::new("IDLE", "IDLE"),
        SimulatedFrame::new("PREPARE", "PREPARE"),
        SimulatedFrame::new("RUNNING", "HEATBED_PREHEATING")
            .temperatures(Some(45.0), Some(30.0))
            .remaining(Some(42)),
    ];
    for step in 1..=4u32 {
        frames.push(
            SimulatedFrame::new("RUNNING", "PRINTING")
                .progress(step * 25, step * 30, total_layers)
                .temperatures(Some(60.0), Some(220.0))
                .remaining(Some(i64::from(40 - step * 10))),
        );
    }
    frames.push(
        SimulatedFrame::new("FINISH", "FINISH")
            .progress(100, total_layers, total_layers)
            .temperatures(Some(58.4), Some(180.6)),
    );
    frames
}
