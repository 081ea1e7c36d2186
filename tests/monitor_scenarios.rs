//! End-to-end monitor scenarios driven through the library: a scripted
//! printer, a recording notifier, and the real health endpoint.

#![cfg(feature = "daemon")]

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use bambu_monitor::core::config::{Config, PrinterConfig};
use bambu_monitor::core::errors::{DispatchError, MonitorError, Result};
use bambu_monitor::core::retry::Sleeper;
use bambu_monitor::daemon::artifact::ImageArtifact;
use bambu_monitor::daemon::loop_main::{LoopPhase, MonitorLoop, TickOutcome};
use bambu_monitor::daemon::notifications::{DispatchOutcome, NotificationDispatcher, Notifier};
use bambu_monitor::daemon::signals::SignalHandler;
use bambu_monitor::device::sampler::PrintStatus;
use bambu_monitor::device::simulated::{SimulatedCounters, SimulatedFrame, SimulatedPrinter};
use bambu_monitor::device::{DeviceFactory, PrinterDevice};
use bambu_monitor::logger::activity::{ActivityEvent, ActivityLoggerHandle};

// ──────────────────── fixtures ────────────────────

struct OneShotFactory(Mutex<Option<SimulatedPrinter>>);

impl OneShotFactory {
    fn new(device: SimulatedPrinter) -> Self {
        Self(Mutex::new(Some(device)))
    }
}

impl DeviceFactory for OneShotFactory {
    fn open(&self, _printer: &PrinterConfig) -> Result<Box<dyn PrinterDevice>> {
        self.0
            .lock()
            .take()
            .map(|d| Box::new(d) as Box<dyn PrinterDevice>)
            .ok_or_else(|| MonitorError::Runtime {
                details: "device already opened".to_string(),
            })
    }
}

#[derive(Default)]
struct Deliveries {
    photos: Vec<String>,
    messages: Vec<String>,
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    deliveries: Arc<Mutex<Deliveries>>,
    fail_photo: bool,
    fail_message: bool,
}

impl Notifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send_message(&self, text: &str) -> std::result::Result<(), DispatchError> {
        if self.fail_message {
            return Err(DispatchError::Transport {
                details: "network unreachable".to_string(),
            });
        }
        self.deliveries.lock().messages.push(text.to_string());
        Ok(())
    }

    fn send_photo(
        &self,
        photo: &ImageArtifact,
        caption: &str,
    ) -> std::result::Result<(), DispatchError> {
        if self.fail_photo {
            return Err(DispatchError::Rejected {
                status: 400,
                description: "Bad Request: wrong file identifier".to_string(),
            });
        }
        assert!(photo.path().exists(), "photo must be on disk during upload");
        self.deliveries.lock().photos.push(caption.to_string());
        Ok(())
    }
}

/// Completes `ticks` poll waits, then requests shutdown during the next one.
struct StopAfterTicks {
    signals: SignalHandler,
    budget: Duration,
    slept: Duration,
}

impl StopAfterTicks {
    fn new(signals: SignalHandler, poll_interval: Duration, ticks: u32) -> Self {
        Self {
            signals,
            budget: poll_interval * (ticks + 1),
            slept: Duration::ZERO,
        }
    }
}

impl Sleeper for StopAfterTicks {
    fn sleep(&mut self, duration: Duration) {
        self.slept += duration;
        if self.slept >= self.budget {
            self.signals.request_shutdown();
        }
    }
}

struct Fixture {
    config: Config,
    logger: ActivityLoggerHandle,
    events: crossbeam_channel::Receiver<ActivityEvent>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.printer.ip = "192.168.1.50".to_string();
    config.printer.serial = "01S00A000000000".to_string();
    config.printer.access_code = "12345678".to_string();
    config.connection.max_retries = 3;
    config.connection.retry_delay_secs = 0;
    config.connection.stabilization_delay_secs = 0;
    config.monitor.poll_interval_secs = 1;
    config.monitor.image_path = dir.path().join("bambu_status.png");
    let (logger, events) = ActivityLoggerHandle::channel(4096);
    Fixture {
        config,
        logger,
        events,
        _dir: dir,
    }
}

fn local_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 0))
}

fn monitor(fx: &Fixture, notifier: RecordingNotifier, signals: SignalHandler) -> MonitorLoop {
    MonitorLoop::new(fx.config.clone(), fx.logger.clone(), signals)
        .with_dispatcher(NotificationDispatcher::with_notifier(
            Box::new(notifier),
            fx.logger.clone(),
        ))
        .with_health_addr(local_addr())
}

fn http_get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    write!(
        stream,
        "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )
    .unwrap();
    let mut raw = String::new();
    stream.read_to_string(&mut raw).unwrap();

    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}

fn job_frames() -> Vec<SimulatedFrame> {
    vec![
        SimulatedFrame::new("IDLE", "IDLE"),
        SimulatedFrame::new("IDLE", "IDLE"),
        SimulatedFrame::new("RUNNING", "HEATBED_PREHEATING"),
        SimulatedFrame::new("RUNNING", "PRINTING")
            .progress(10, 12, 120)
            .temperatures(Some(60.2), Some(219.6))
            .remaining(Some(95)),
        SimulatedFrame::new("FINISH", "FINISH").progress(100, 120, 120),
    ]
}

// ──────────────────── scenarios ────────────────────

#[test]
fn five_tick_job_runs_to_clean_shutdown() {
    let fx = fixture();
    let signals = SignalHandler::unregistered();
    let notifier = RecordingNotifier::default();
    let deliveries = Arc::clone(&notifier.deliveries);
    let device = SimulatedPrinter::new(job_frames());
    let counters: SimulatedCounters = device.counters();

    let mut monitor = monitor(&fx, notifier, signals.clone()).with_sleeper(Box::new(
        StopAfterTicks::new(signals, fx.config.monitor.poll_interval(), 5),
    ));
    monitor.run(&OneShotFactory::new(device)).unwrap();

    assert_eq!(monitor.phase(), LoopPhase::Stopped);
    assert_eq!(monitor.detector().tick(), 5);
    assert_eq!(monitor.detector().previous(), Some(&PrintStatus::Finished));

    let deliveries = deliveries.lock();
    assert_eq!(deliveries.photos.len(), 3);
    assert!(deliveries.messages.is_empty());
    assert!(deliveries.photos[1].contains("RUNNING \\- PRINTING"));
    assert!(deliveries.photos[1].contains(">Bed temp: 60ºC"));
    assert!(deliveries.photos[1].contains(">Remaining time: 95m"));

    assert_eq!(counters.disconnects(), 1);
    assert!(!fx.config.monitor.image_path.exists());
    let record = monitor.health().snapshot();
    assert!(!record.healthy);
    assert_eq!(record.error.as_deref(), Some("Service stopped"));

    let events: Vec<ActivityEvent> = fx.events.try_iter().collect();
    let status_updates = events
        .iter()
        .filter(|e| matches!(e, ActivityEvent::StatusUpdate { .. }))
        .count();
    assert_eq!(status_updates, 5);
    let phases: Vec<(String, String)> = events
        .iter()
        .filter_map(|e| match e {
            ActivityEvent::PhaseChanged { from, to } => Some((from.clone(), to.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(
        phases,
        vec![
            ("starting".to_string(), "connecting".to_string()),
            ("connecting".to_string(), "running".to_string()),
            ("running".to_string(), "draining".to_string()),
            ("draining".to_string(), "stopped".to_string()),
        ]
    );
    assert!(events.iter().any(|e| matches!(
        e,
        ActivityEvent::MonitorStarted { ip, .. } if ip == "192.168.1.50"
    )));
}

#[test]
fn photo_rejection_falls_back_to_text() {
    let fx = fixture();
    let notifier = RecordingNotifier {
        fail_photo: true,
        ..RecordingNotifier::default()
    };
    let deliveries = Arc::clone(&notifier.deliveries);
    let mut monitor = monitor(&fx, notifier, SignalHandler::unregistered());
    monitor.start().unwrap();
    monitor
        .connect(&OneShotFactory::new(SimulatedPrinter::new(Vec::new())))
        .unwrap();

    let report = monitor.tick();
    assert!(matches!(
        report.outcome,
        TickOutcome::Dispatched(DispatchOutcome::DeliveredViaFallback)
    ));
    assert_eq!(deliveries.lock().messages.len(), 1);
    assert!(deliveries.lock().messages[0].starts_with("ℹ️ IDLE \\- IDLE"));
    monitor.drain();
}

#[test]
fn total_dispatch_failure_commits_and_keeps_health() {
    let fx = fixture();
    let notifier = RecordingNotifier {
        fail_photo: true,
        fail_message: true,
        ..RecordingNotifier::default()
    };
    let mut monitor = monitor(&fx, notifier, SignalHandler::unregistered());
    monitor.start().unwrap();
    monitor
        .connect(&OneShotFactory::new(SimulatedPrinter::new(vec![
            SimulatedFrame::new("PAUSE", "PAUSED_USER"),
        ])))
        .unwrap();

    let err = match monitor.tick().outcome {
        TickOutcome::Dispatched(DispatchOutcome::Failed(err)) => err,
        other => panic!("expected failed dispatch, got {other:?}"),
    };
    assert_eq!(err.code(), "BMN-5001");
    assert!(monitor.health().snapshot().healthy);
    assert_eq!(monitor.detector().previous(), Some(&PrintStatus::Paused));

    let second = monitor.tick();
    assert!(matches!(second.outcome, TickOutcome::Unchanged));

    let events: Vec<ActivityEvent> = fx.events.try_iter().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        ActivityEvent::NotificationFailed { code, .. } if code == "BMN-5001"
    )));
    monitor.drain();
}

#[test]
fn exhausted_connection_is_fatal_and_drains() {
    let fx = fixture();
    let device = SimulatedPrinter::new(Vec::new()).refusing_connects(u32::MAX);
    let counters = device.counters();
    let mut monitor = monitor(&fx, RecordingNotifier::default(), SignalHandler::unregistered())
        .with_sleeper(Box::new(bambu_monitor::core::retry::RecordingSleeper::default()));

    let err = monitor.run(&OneShotFactory::new(device)).unwrap_err();
    assert_eq!(err.code(), "BMN-2001");
    assert_eq!(counters.connect_attempts(), 3);
    assert_eq!(monitor.phase(), LoopPhase::Stopped);
    assert!(monitor.health_addr().is_none());
    assert_eq!(
        monitor.health().snapshot().error.as_deref(),
        Some("Service stopped")
    );
}

#[test]
fn shutdown_while_connecting_drains_cleanly() {
    let mut fx = fixture();
    fx.config.connection.max_retries = 10;
    fx.config.connection.retry_delay_secs = 5;
    let signals = SignalHandler::unregistered();
    let device = SimulatedPrinter::new(Vec::new()).refusing_connects(u32::MAX);
    let counters = device.counters();
    // Shutdown arrives one second into the first five-second retry delay.
    let sleeper = StopAfterTicks::new(signals.clone(), Duration::from_secs(1), 0);
    let mut monitor = monitor(&fx, RecordingNotifier::default(), signals)
        .with_sleeper(Box::new(sleeper));

    monitor.run(&OneShotFactory::new(device)).unwrap();
    assert_eq!(counters.connect_attempts(), 1);
    assert_eq!(monitor.phase(), LoopPhase::Stopped);
    assert!(monitor.health_addr().is_none());

    let events: Vec<ActivityEvent> = fx.events.try_iter().collect();
    assert!(!events
        .iter()
        .any(|e| matches!(e, ActivityEvent::PrinterConnected { .. })));
    assert!(events
        .iter()
        .any(|e| matches!(e, ActivityEvent::MonitorStopped { .. })));
}

#[test]
fn health_endpoint_tracks_the_loop() {
    let fx = fixture();
    let mut monitor = monitor(&fx, RecordingNotifier::default(), SignalHandler::unregistered());
    monitor.start().unwrap();
    let addr = monitor.health_addr().unwrap();

    let (status, body) = http_get(addr, "/health");
    assert_eq!(status, 503);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["status"], "unhealthy");
    assert!(parsed["last_update"].is_null());

    monitor
        .connect(&OneShotFactory::new(SimulatedPrinter::new(Vec::new())))
        .unwrap();
    monitor.tick();

    let (status, body) = http_get(addr, "/health");
    assert_eq!(status, 200);
    let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(parsed["status"], "healthy");
    assert_eq!(parsed["printer_connected"], true);
    assert!(parsed["error"].is_null());
    assert!(parsed["last_update"].is_string());

    let (status, body) = http_get(addr, "/");
    assert_eq!(status, 200);
    assert!(body.contains("<html"));

    let (status, body) = http_get(addr, "/metrics");
    assert_eq!(status, 404);
    assert!(body.is_empty());

    monitor.drain();
    assert!(TcpStream::connect(addr).is_err());
}

#[test]
fn sample_failures_are_isolated_to_their_tick() {
    let fx = fixture();
    let mut monitor = monitor(&fx, RecordingNotifier::default(), SignalHandler::unregistered());
    monitor.start().unwrap();
    monitor
        .connect(&OneShotFactory::new(SimulatedPrinter::new(vec![
            SimulatedFrame::new("RUNNING", "PRINTING"),
            SimulatedFrame::new("RUNNING", "PRINTING").failing_reads("mqtt report missing"),
            SimulatedFrame::new("RUNNING", "PRINTING").failing_reads("mqtt report missing"),
            SimulatedFrame::new("FINISH", "FINISH"),
        ])))
        .unwrap();

    let outcomes: Vec<TickOutcome> = (0..4).map(|_| monitor.tick().outcome).collect();
    assert!(matches!(outcomes[0], TickOutcome::Dispatched(_)));
    assert!(matches!(outcomes[1], TickOutcome::Failed(_)));
    assert!(matches!(outcomes[2], TickOutcome::Failed(_)));
    assert!(matches!(outcomes[3], TickOutcome::Dispatched(_)));
    assert!(monitor.health().snapshot().healthy);

    let events: Vec<ActivityEvent> = fx.events.try_iter().collect();
    let tick_failures = events
        .iter()
        .filter(|e| matches!(e, ActivityEvent::TickFailed { code, .. } if code == "BMN-4001"))
        .count();
    assert_eq!(tick_failures, 2);
    monitor.drain();
}
