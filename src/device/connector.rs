//! Printer connection lifecycle: bounded retries, then a stabilization wait
//! before the printer counts as connected.

#![allow(missing_docs)]

use std::time::Duration;

use crate::core::config::ConnectionConfig;
use crate::core::errors::{MonitorError, Result};
use crate::core::retry::{RetryError, RetryPolicy, Sleeper, retry_with_delay};
use crate::daemon::health::HealthState;
use crate::device::PrinterDevice;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};

/// A device that completed `connect` and the stabilization wait.
pub struct ConnectedPrinter {
    device: Box<dyn PrinterDevice>,
    attempts: u32,
}

impl ConnectedPrinter {
    pub fn device_mut(&mut self) -> &mut dyn PrinterDevice {
        self.device.as_mut()
    }

    /// Attempts it took to connect (1 = first try).
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }
}

pub struct DeviceConnector {
    policy: RetryPolicy,
    stabilization_delay: Duration,
    health: HealthState,
    logger: ActivityLoggerHandle,
}

impl DeviceConnector {
    #[must_use]
    pub const fn new(
        policy: RetryPolicy,
        stabilization_delay: Duration,
        health: HealthState,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            policy,
            stabilization_delay,
            health,
            logger,
        }
    }

    #[must_use]
    pub fn from_config(
        config: &ConnectionConfig,
        health: HealthState,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self::new(
            RetryPolicy::new(config.max_retries, config.retry_delay()),
            config.stabilization_delay(),
            health,
            logger,
        )
    }

    /// Connect `device`, retrying within the budget.
    ///
    /// Health is updated after every attempt. Running out of attempts is
    /// [`MonitorError::Connection`], which the binary treats as fatal.
    /// `cancelled` is checked before every attempt; once it reports true the
    /// result is [`MonitorError::Interrupted`].
    pub fn connect<S, C>(
        &self,
        mut device: Box<dyn PrinterDevice>,
        sleeper: &mut S,
        cancelled: C,
    ) -> Result<ConnectedPrinter>
    where
        S: Sleeper + ?Sized,
        C: FnMut() -> bool,
    {
        let outcome = retry_with_delay(
            self.policy,
            sleeper,
            cancelled,
            |attempt| device.connect().map(|()| attempt),
            |attempt, error| {
                self.health.update(
                    false,
                    false,
                    Some(format!("Connection attempt {attempt} failed: {error}")),
                );
                self.logger.send(ActivityEvent::ConnectionAttemptFailed {
                    attempt,
                    max_attempts: self.policy.max_attempts,
                    error: error.to_string(),
                });
            },
        );

        match outcome {
            Ok(attempts) => {
                self.health.update(false, true, None);
                sleeper.sleep(self.stabilization_delay);
                self.health.update(true, true, None);
                self.logger.send(ActivityEvent::PrinterConnected { attempts });
                Ok(ConnectedPrinter { device, attempts })
            }
            Err(RetryError::Cancelled { attempts }) => {
                self.logger.info(format!(
                    "Connect abandoned after {attempts} attempts: shutdown requested"
                ));
                Err(MonitorError::Interrupted { stage: "connect" })
            }
            Err(RetryError::Exhausted(exhausted)) => {
                self.logger.error("Max retries reached, exiting");
                Err(MonitorError::Connection {
                    attempts: exhausted.attempts,
                    details: exhausted.last_error.to_string(),
                })
            }
        }
    }

    /// Release the device. Errors are logged, never raised.
    pub fn disconnect(&self, printer: &mut ConnectedPrinter) -> bool {
        match printer.device.disconnect() {
            Ok(()) => true,
            Err(e) => {
                self.logger.error(format!("Error disconnecting printer: {e}"));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::retry::RecordingSleeper;
    use crate::device::simulated::SimulatedPrinter;

    fn connector(max: u32, health: &HealthState) -> DeviceConnector {
        let (logger, _rx) = ActivityLoggerHandle::channel(64);
        DeviceConnector::new(
            RetryPolicy::new(max, Duration::from_secs(10)),
            Duration::from_secs(5),
            health.clone(),
            logger,
        )
    }

    #[test]
    fn first_try_waits_only_for_stabilization() {
        let health = HealthState::new();
        let mut sleeper = RecordingSleeper::default();
        let printer = connector(5, &health)
            .connect(Box::new(SimulatedPrinter::new(Vec::new())), &mut sleeper, || false)
            .unwrap();
        assert_eq!(printer.attempts(), 1);
        assert_eq!(sleeper.sleeps, vec![Duration::from_secs(5)]);
        let record = health.snapshot();
        assert!(record.healthy);
        assert!(record.printer_connected);
    }

    #[test]
    fn exhausted_budget_makes_exactly_n_attempts() {
        let health = HealthState::new();
        let mut sleeper = RecordingSleeper::default();
        let device = SimulatedPrinter::new(Vec::new()).refusing_connects(u32::MAX);
        let counters = device.counters();

        let result = connector(5, &health).connect(Box::new(device), &mut sleeper, || false);
        let Err(err) = result else {
            panic!("connection must fail");
        };
        assert_eq!(err.code(), "BMN-2001");
        assert!(err.to_string().contains("after 5 attempts"));
        assert_eq!(counters.connect_attempts(), 5);
        assert_eq!(sleeper.sleeps, vec![Duration::from_secs(10); 4]);

        let record = health.snapshot();
        assert!(!record.printer_connected);
        assert!(record.error.unwrap().contains("attempt 5"));
    }

    #[test]
    fn recovers_within_budget() {
        let health = HealthState::new();
        let mut sleeper = RecordingSleeper::default();
        let device = SimulatedPrinter::new(Vec::new()).refusing_connects(2);
        let printer = connector(5, &health)
            .connect(Box::new(device), &mut sleeper, || false)
            .unwrap();
        assert_eq!(printer.attempts(), 3);
        assert_eq!(
            sleeper.sleeps,
            vec![
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(5)
            ]
        );
        assert!(health.snapshot().healthy);
    }

    #[test]
    fn failed_attempts_are_logged() {
        let health = HealthState::new();
        let (logger, rx) = ActivityLoggerHandle::channel(64);
        let connector = DeviceConnector::new(
            RetryPolicy::new(3, Duration::ZERO),
            Duration::ZERO,
            health,
            logger,
        );
        let device = SimulatedPrinter::new(Vec::new()).refusing_connects(1);
        connector
            .connect(Box::new(device), &mut RecordingSleeper::default(), || false)
            .unwrap();
        let events: Vec<ActivityEvent> = rx.try_iter().collect();
        assert!(events.contains(&ActivityEvent::ConnectionAttemptFailed {
            attempt: 1,
            max_attempts: 3,
            error: "connect: connection refused".to_string(),
        }));
        assert!(events.contains(&ActivityEvent::PrinterConnected { attempts: 2 }));
    }

    #[test]
    fn disconnect_reaches_the_device() {
        let health = HealthState::new();
        let device = SimulatedPrinter::new(Vec::new());
        let counters = device.counters();
        let connector = connector(1, &health);
        let mut printer = connector
            .connect(Box::new(device), &mut RecordingSleeper::default(), || false)
            .unwrap();
        assert!(connector.disconnect(&mut printer));
        assert_eq!(counters.disconnects(), 1);
    }

    #[test]
    fn cancellation_stops_retrying_without_marking_connected() {
        let health = HealthState::new();
        let mut sleeper = RecordingSleeper::default();
        let device = SimulatedPrinter::new(Vec::new()).refusing_connects(u32::MAX);
        let counters = device.counters();
        let mut checks = 0;

        let result = connector(5, &health).connect(Box::new(device), &mut sleeper, || {
            checks += 1;
            checks > 2
        });
        let Err(err) = result else {
            panic!("connection must be interrupted");
        };
        assert!(matches!(err, MonitorError::Interrupted { stage: "connect" }));
        assert_eq!(err.code(), "BMN-3901");
        assert_eq!(counters.connect_attempts(), 2);
        assert_eq!(sleeper.sleeps, vec![Duration::from_secs(10); 2]);
        assert!(!health.snapshot().printer_connected);
    }
}
