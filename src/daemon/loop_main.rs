//! Monitor loop: fixed-interval polling with per-tick fault isolation.
//!
//! Phases: `Starting -> Connecting -> Running -> Draining -> Stopped`.
//!
//! One tick: sample the printer, log the snapshot, mark health good, run the
//! transition detector and, on a transition, capture a camera frame and
//! dispatch the notification. Any fault inside a tick is a [`TickError`]
//! handled at the tick boundary; only configuration and exhausted connection
//! retries end the process.
//!
//! Shutdown is cooperative: the poll sleep and the connect retry delays are
//! sliced so a signal is noticed within [`SLEEP_SLICE`], the in-flight tick
//! always finishes, then the drain steps release the device, the health
//! server and the image file.

#![allow(missing_docs)]

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};

use crate::core::config::Config;
use crate::core::errors::{DeviceError, MonitorError, Result, TickError};
use crate::core::retry::{Sleeper, ThreadSleeper, sleep_sliced};
use crate::daemon::artifact::{ImageArtifact, remove_stale};
use crate::daemon::health::HealthState;
use crate::daemon::health_server::HealthServer;
use crate::daemon::notifications::{DispatchOutcome, NotificationDispatcher};
use crate::daemon::signals::{ShutdownCoordinator, SignalHandler};
use crate::daemon::transition::{Decision, TransitionDetector};
use crate::device::{DeviceFactory, simulated};
use crate::device::connector::{ConnectedPrinter, DeviceConnector};
use crate::device::sampler::{PrintStatus, sample};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

/// Longest uninterrupted sleep between shutdown checks.
pub const SLEEP_SLICE: Duration = Duration::from_millis(250);

// ──────────────────── phases and reports ────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    Starting,
    Connecting,
    Running,
    Draining,
    Stopped,
}

impl fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Starting => "starting",
            Self::Connecting => "connecting",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    Unchanged,
    Suppressed,
    Dispatched(DispatchOutcome),
    Failed(TickError),
}

#[derive(Debug)]
pub struct TickReport {
    /// 1-indexed tick number.
    pub tick: u64,
    /// Sampled status; `None` when sampling failed.
    pub status: Option<PrintStatus>,
    pub outcome: TickOutcome,
}

type Clock = Box<dyn Fn() -> DateTime<Local>>;

/// Forwards to `inner` in [`SLEEP_SLICE`] chunks and returns early once
/// shutdown is requested.
struct InterruptibleSleeper<'a, S: ?Sized> {
    inner: &'a mut S,
    signals: &'a SignalHandler,
}

impl<S: Sleeper + ?Sized> Sleeper for InterruptibleSleeper<'_, S> {
    fn sleep(&mut self, duration: Duration) {
        let signals = self.signals;
        sleep_sliced(&mut *self.inner, duration, SLEEP_SLICE, || {
            signals.should_shutdown()
        });
    }
}

// ──────────────────── monitor loop ────────────────────

pub struct MonitorLoop {
    config: Config,
    phase: LoopPhase,
    logger: ActivityLoggerHandle,
    signals: SignalHandler,
    health: HealthState,
    health_addr: SocketAddr,
    server: Option<HealthServer>,
    connector: DeviceConnector,
    printer: Option<ConnectedPrinter>,
    detector: TransitionDetector,
    dispatcher: NotificationDispatcher,
    sleeper: Box<dyn Sleeper>,
    clock: Clock,
    start_time: Instant,
}

impl MonitorLoop {
    /// Build the loop from configuration. Nothing is bound or connected yet.
    #[must_use]
    pub fn new(config: Config, logger: ActivityLoggerHandle, signals: SignalHandler) -> Self {
        let health = HealthState::new();
        let connector =
            DeviceConnector::from_config(&config.connection, health.clone(), logger.clone());
        let dispatcher = NotificationDispatcher::from_config(&config.notifications, logger.clone());
        let health_addr = SocketAddr::from(([0, 0, 0, 0], config.health.port));

        Self {
            config,
            phase: LoopPhase::Starting,
            logger,
            signals,
            health,
            health_addr,
            server: None,
            connector,
            printer: None,
            detector: TransitionDetector::new(),
            dispatcher,
            sleeper: Box::new(ThreadSleeper),
            clock: Box::new(Local::now),
            start_time: Instant::now(),
        }
    }

    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: NotificationDispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    #[must_use]
    pub fn with_sleeper(mut self, sleeper: Box<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Local> + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Override the health endpoint bind address (port 0 picks a free port).
    #[must_use]
    pub fn with_health_addr(mut self, addr: SocketAddr) -> Self {
        self.health_addr = addr;
        self
    }

    #[must_use]
    pub const fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Shared handle to the health record.
    #[must_use]
    pub fn health(&self) -> HealthState {
        self.health.clone()
    }

    /// Bound address of the health endpoint while it is running.
    #[must_use]
    pub fn health_addr(&self) -> Option<SocketAddr> {
        self.server.as_ref().map(HealthServer::local_addr)
    }

    #[must_use]
    pub const fn detector(&self) -> &TransitionDetector {
        &self.detector
    }

    /// Run until shutdown is requested.
    ///
    /// Returns an error only when startup fails or the printer never connects.
    /// Resources acquired before such a failure are still drained. A shutdown
    /// request while connecting drains and returns `Ok`.
    pub fn run(&mut self, factory: &dyn DeviceFactory) -> Result<()> {
        // 1. Startup log + health endpoint.
        if let Err(e) = self.start() {
            self.drain();
            return Err(e);
        }

        // 2. Connect.
        match self.connect(factory) {
            Ok(()) => {}
            Err(MonitorError::Interrupted { stage }) => {
                self.logger
                    .info(format!("Shutdown requested during {stage}, shutting down..."));
                self.drain();
                return Ok(());
            }
            Err(e) => {
                self.drain();
                return Err(e);
            }
        }

        // 3. Poll until shutdown.
        self.set_phase(LoopPhase::Running);
        while self.wait_for_next_tick() {
            self.tick();
        }

        // 4. Drain.
        self.logger.info("Shutting down...");
        self.drain();
        Ok(())
    }

    /// Log the startup event and bind the health endpoint.
    pub fn start(&mut self) -> Result<()> {
        self.logger.send(ActivityEvent::MonitorStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            ip: self.config.printer.ip.clone(),
            serial: self.config.printer.serial.clone(),
            config_hash: self.config.stable_hash().unwrap_or_default(),
        });
        if self.config.printer.driver == simulated::DRIVER_NAME {
            self.logger.warning(format!(
                "Device driver {:?} is active: replaying a demo print job, no real printer \
                 will be contacted",
                simulated::DRIVER_NAME
            ));
        }
        let server =
            HealthServer::start(self.health_addr, self.health.clone(), self.logger.clone())?;
        self.logger
            .debug(format!("health endpoint listening on {}", server.local_addr()));
        self.server = Some(server);
        Ok(())
    }

    /// Open the configured device and connect within the retry budget.
    ///
    /// Retry delays are interruptible; a shutdown request ends the attempt
    /// loop with [`MonitorError::Interrupted`].
    pub fn connect(&mut self, factory: &dyn DeviceFactory) -> Result<()> {
        self.set_phase(LoopPhase::Connecting);
        let device = factory.open(&self.config.printer)?;
        let signals = &self.signals;
        let mut sleeper = InterruptibleSleeper {
            inner: self.sleeper.as_mut(),
            signals,
        };
        let printer = self
            .connector
            .connect(device, &mut sleeper, || signals.should_shutdown())?;
        self.logger.info("Successfully connected to printer");
        self.printer = Some(printer);
        Ok(())
    }

    /// Sleep one poll interval in slices. `false` once shutdown is requested.
    fn wait_for_next_tick(&mut self) -> bool {
        let signals = &self.signals;
        sleep_sliced(
            self.sleeper.as_mut(),
            self.config.monitor.poll_interval(),
            SLEEP_SLICE,
            || signals.should_shutdown(),
        )
    }

    /// Run one tick. Never fails: faults are logged and reported.
    pub fn tick(&mut self) -> TickReport {
        let tick = self.detector.begin_tick();
        let mut status = None;
        let outcome = match self.run_tick(&mut status) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.handle_tick_error(&err);
                TickOutcome::Failed(err)
            }
        };
        TickReport {
            tick,
            status,
            outcome,
        }
    }

    fn run_tick(
        &mut self,
        status: &mut Option<PrintStatus>,
    ) -> std::result::Result<TickOutcome, TickError> {
        let Some(printer) = self.printer.as_mut() else {
            return Err(TickError::Sample(
                DeviceError::new("sample", "printer not connected").into(),
            ));
        };

        // 1. Sample + log + health.
        let snapshot = sample(printer.device_mut(), (self.clock)())?;
        *status = Some(snapshot.status.clone());
        self.logger.send(ActivityEvent::StatusUpdate {
            fields: snapshot.log_fields(),
        });
        self.health.update(true, true, None);

        // 2. Detect.
        match self.detector.evaluate(&snapshot) {
            Decision::Unchanged => return Ok(TickOutcome::Unchanged),
            Decision::SuppressedPreparing => {
                self.logger
                    .info("Printer is preparing, skipping notification.");
                return Ok(TickOutcome::Suppressed);
            }
            Decision::Notify => {}
        }

        // 3. Capture. Without an image the transition is retried next tick.
        let image_path: &PathBuf = &self.config.monitor.image_path;
        let bytes = printer
            .device_mut()
            .camera_image()
            .map_err(|e| TickError::ImageCapture {
                details: e.to_string(),
            })?;
        let artifact = ImageArtifact::persist(image_path, bytes).map_err(|e| {
            TickError::ImageCapture {
                details: e.to_string(),
            }
        })?;

        // 4. Dispatch + commit.
        let outcome = self.dispatcher.dispatch(&snapshot, &artifact);
        drop(artifact);
        self.detector.commit(&snapshot.status);

        match &outcome {
            DispatchOutcome::Delivered | DispatchOutcome::DeliveredViaFallback => {
                self.logger.send(ActivityEvent::NotificationSent {
                    status: snapshot.status.to_string(),
                    via: outcome.via(),
                });
            }
            DispatchOutcome::Failed(e) => {
                self.logger.send(ActivityEvent::NotificationFailed {
                    code: e.code().to_string(),
                    message: e.to_string(),
                });
            }
            DispatchOutcome::Skipped => {}
        }
        Ok(TickOutcome::Dispatched(outcome))
    }

    fn handle_tick_error(&self, err: &TickError) {
        match err {
            TickError::Sample(_) => {
                self.logger.send(ActivityEvent::TickFailed {
                    code: err.code().to_string(),
                    message: err.to_string(),
                });
                self.health.update(false, false, Some(err.to_string()));
            }
            TickError::ImageCapture { .. } => {
                self.logger
                    .error(format!("Failed to get camera image: {err}"));
            }
        }
    }

    /// Release everything and mark health as stopped. Safe to call twice.
    ///
    /// Returns `true` when every drain step succeeded.
    pub fn drain(&mut self) -> bool {
        if self.phase == LoopPhase::Stopped {
            return true;
        }
        self.set_phase(LoopPhase::Draining);

        let coordinator = ShutdownCoordinator::new(self.logger.clone());
        let connector = &self.connector;
        let printer = &mut self.printer;
        let server = &mut self.server;
        let health = &self.health;
        let logger = &self.logger;
        let image_path = &self.config.monitor.image_path;

        let mut disconnect =
            || printer.take().is_none_or(|mut p| connector.disconnect(&mut p));
        let mut stop_server = || {
            server.take().is_none_or(|mut s| {
                let stopped = s.stop();
                if !stopped {
                    logger.error("Error shutting down health server");
                }
                stopped
            })
        };
        let mut remove_image = || match remove_stale(image_path) {
            Ok(_) => true,
            Err(e) => {
                logger.error(format!("Error cleaning up image file: {e}"));
                false
            }
        };
        let mut mark_stopped = || {
            health.mark_stopped();
            true
        };

        let mut steps: [(&str, &mut dyn FnMut() -> bool); 4] = [
            ("disconnect printer", &mut disconnect),
            ("stop health server", &mut stop_server),
            ("remove image artifact", &mut remove_image),
            ("mark health stopped", &mut mark_stopped),
        ];
        let clean = coordinator.execute(&mut steps);

        self.logger.send(ActivityEvent::MonitorStopped {
            reason: if clean { "clean shutdown" } else { "shutdown with errors" }.to_string(),
            uptime_secs: self.start_time.elapsed().as_secs(),
        });
        self.set_phase(LoopPhase::Stopped);
        clean
    }

    fn set_phase(&mut self, to: LoopPhase) {
        if self.phase == to {
            return;
        }
        self.logger.send(ActivityEvent::PhaseChanged {
            from: self.phase.to_string(),
            to: to.to_string(),
        });
        self.phase = to;
    }
}

// ──────────────────── tests ────────────────────
