#![forbid(unsafe_code)]

//! Bambu Monitor: watches a Bambu Lab 3D printer, posts a Telegram
//! notification with a camera snapshot whenever the print status changes, and
//! serves a `/health` endpoint for container orchestration.
//!
//! The pieces, leaf first:
//! 1. **Device seam** ([`device`]): driver trait, bounded-retry connector, telemetry sampler
//! 2. **Detection and dispatch** ([`daemon`]): transition detector, photo-then-text notifier
//! 3. **Monitor loop** (`daemon::loop_main`): fixed-interval ticks with per-tick fault isolation
//!
//! # Library usage
//!
//! ```rust,no_run
//! use bambu_monitor::prelude::*;
//! ```
//!
//! Individual modules can also be imported directly:
//!
//! ```rust,no_run
//! use bambu_monitor::core::config::Config;
//! use bambu_monitor::daemon::transition::{Decision, TransitionDetector};
//! ```

pub mod prelude;

pub mod core;
pub mod daemon;
pub mod device;
pub mod logger;
