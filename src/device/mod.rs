//! Printer device seam: the driver trait, driver selection, and the
//! connection and sampling layers built on top of it.

#![allow(missing_docs)]

pub mod connector;
pub mod sampler;
pub mod simulated;

use crate::core::config::PrinterConfig;
use crate::core::errors::{DeviceError, MonitorError, Result};

/// One connected printer as seen by the monitor.
///
/// Getters mirror the vendor report fields. `refresh` pulls the next report
/// before a batch of getters; drivers that stream reports may leave it as a
/// no-op.
pub trait PrinterDevice: Send {
    fn connect(&mut self) -> std::result::Result<(), DeviceError>;
    fn disconnect(&mut self) -> std::result::Result<(), DeviceError>;

    fn refresh(&mut self) -> std::result::Result<(), DeviceError> {
        Ok(())
    }

    /// Coarse job state, e.g. `RUNNING`.
    fn state(&mut self) -> std::result::Result<String, DeviceError>;
    /// Fine-grained stage, e.g. `PRINTING` or `HEATBED_PREHEATING`.
    fn sub_state(&mut self) -> std::result::Result<String, DeviceError>;
    fn percentage(&mut self) -> std::result::Result<u32, DeviceError>;
    fn current_layer(&mut self) -> std::result::Result<u32, DeviceError>;
    fn total_layers(&mut self) -> std::result::Result<u32, DeviceError>;
    fn bed_temperature(&mut self) -> std::result::Result<Option<f64>, DeviceError>;
    fn nozzle_temperature(&mut self) -> std::result::Result<Option<f64>, DeviceError>;
    /// Estimated minutes left on the current job, if the printer reports one.
    fn remaining_minutes(&mut self) -> std::result::Result<Option<i64>, DeviceError>;
    /// Encoded camera frame (PNG).
    fn camera_image(&mut self) -> std::result::Result<Vec<u8>, DeviceError>;
}

/// Builds an unconnected device for a printer configuration.
pub trait DeviceFactory {
    fn open(&self, printer: &PrinterConfig) -> Result<Box<dyn PrinterDevice>>;
}

/// Selects a driver by `printer.driver`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DriverRegistry;

impl DriverRegistry {
    /// Driver names this build can open.
    pub const DRIVERS: &'static [&'static str] = &[simulated::DRIVER_NAME];
}

impl DeviceFactory for DriverRegistry {
    fn open(&self, printer: &PrinterConfig) -> Result<Box<dyn PrinterDevice>> {
        match printer.driver.as_str() {
            simulated::DRIVER_NAME => Ok(Box::new(simulated::SimulatedPrinter::from_config(
                printer,
            ))),
            other => Err(MonitorError::InvalidConfig {
                details: format!(
                    "unknown device driver {other:?}; available: {}",
                    Self::DRIVERS.join(", ")
                ),
            }),
        }
    }
}
