//! Core types: errors, configuration, retry budgets.

pub mod config;
pub mod errors;
pub mod retry;
