//! Signal handling: SIGTERM/SIGINT request a graceful drain.
//!
//! Uses the `signal-hook` crate for safe signal registration. The monitor loop
//! polls the flag between sleep slices rather than blocking on signals.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::consts::{SIGINT, SIGTERM};

use crate::logger::activity::ActivityLoggerHandle;
use crate::logger::jsonl::LogLevel;

// ──────────────────── signal handler ────────────────────

/// Shutdown flag shared between the OS signal hooks and the monitor loop.
#[derive(Clone, Debug)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler and register SIGTERM/SIGINT.
    ///
    /// Registration is best-effort; failures are reported on stderr but not fatal.
    pub fn new() -> Self {
        let handler = Self::unregistered();
        handler.register_signals();
        handler
    }

    /// A handler that only reacts to [`SignalHandler::request_shutdown`].
    #[must_use]
    pub fn unregistered() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    fn register_signals(&self) {
        if let Err(e) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[BMN-SIGNAL] failed to register SIGTERM: {e}");
        }
        if let Err(e) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[BMN-SIGNAL] failed to register SIGINT: {e}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

// ──────────────────── shutdown coordinator ────────────────────

/// Runs the drain steps in order and reports each one.
pub struct ShutdownCoordinator {
    logger: ActivityLoggerHandle,
}

impl ShutdownCoordinator {
    pub fn new(logger: ActivityLoggerHandle) -> Self {
        Self { logger }
    }

    /// Execute the drain sequence. Returns `true` if every step succeeded.
    ///
    /// Every step runs to completion; a failing step does not stop later
    /// steps.
    pub fn execute(&self, steps: &mut [(&str, &mut dyn FnMut() -> bool)]) -> bool {
        let mut all_ok = true;

        for (name, step) in steps.iter_mut() {
            if step() {
                self.logger.debug(format!("shutdown step {name}: ok"));
            } else {
                self.logger
                    .log(LogLevel::Error, format!("shutdown step {name}: failed"));
                all_ok = false;
            }
        }

        all_ok
    }
}

// ──────────────────── tests ────────────────────
