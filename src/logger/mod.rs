//! Structured JSONL logging on a dedicated thread.

pub mod activity;
pub mod jsonl;
