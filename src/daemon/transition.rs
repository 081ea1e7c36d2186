//! Transition detection: at most one notification per status change.
//!
//! Only the coarse status drives detection. The first tick always notifies so
//! a freshly started monitor reports where the printer is. Warm-up phases
//! (`PREPARE`, or `RUNNING` before the printer reaches `PRINTING`) are
//! suppressed without touching the remembered status, so the transition is
//! reported once the job is actually printing.

#![allow(missing_docs)]

use crate::device::sampler::{PrintStatus, TelemetrySnapshot};

/// Sub-status reported while the nozzle is laying down plastic.
pub const ACTIVELY_PRINTING: &str = "PRINTING";

/// Outcome of evaluating one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Notify,
    Unchanged,
    SuppressedPreparing,
}

/// Primary rule: notify on the first tick or whenever the status differs from
/// the last notified one.
#[must_use]
pub fn should_notify(
    current: &PrintStatus,
    previous: Option<&PrintStatus>,
    tick_index: u64,
) -> bool {
    tick_index == 1 || previous != Some(current)
}

/// Warm-up phases that never notify on their own.
#[must_use]
pub fn is_preparing(snapshot: &TelemetrySnapshot) -> bool {
    match snapshot.status {
        PrintStatus::Prepare => true,
        PrintStatus::Running => snapshot.sub_status != ACTIVELY_PRINTING,
        _ => false,
    }
}

/// Last notified status and the tick counter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationState {
    pub previous: Option<PrintStatus>,
    pub tick: u64,
}

#[derive(Debug, Default)]
pub struct TransitionDetector {
    state: NotificationState,
}

impl TransitionDetector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the tick counter; returns the 1-indexed tick.
    pub fn begin_tick(&mut self) -> u64 {
        self.state.tick += 1;
        self.state.tick
    }

    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.state.tick
    }

    #[must_use]
    pub const fn previous(&self) -> Option<&PrintStatus> {
        self.state.previous.as_ref()
    }

    /// Classify `snapshot` for the current tick. Does not mutate state.
    #[must_use]
    pub fn evaluate(&self, snapshot: &TelemetrySnapshot) -> Decision {
        if !should_notify(&snapshot.status, self.previous(), self.state.tick) {
            Decision::Unchanged
        } else if is_preparing(snapshot) {
            Decision::SuppressedPreparing
        } else {
            Decision::Notify
        }
    }

    /// Remember `status` as notified. Call once the dispatch went through.
    pub fn commit(&mut self, status: &PrintStatus) {
        self.state.previous = Some(status.clone());
    }
}
