//! Daemon subsystem: health reporting, transition detection, notification
//! dispatch, and the monitor loop that ties them together.

pub mod artifact;
pub mod health;
pub mod health_server;
#[cfg(feature = "daemon")]
pub mod loop_main;
pub mod notifications;
#[cfg(feature = "daemon")]
pub mod signals;
pub mod transition;
