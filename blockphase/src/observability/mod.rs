//! Observability
//!
//! `tracing` setup for diagnostics and the JSONL journal of session
//! activity.

pub mod journal;
pub mod logging;

pub use journal::{Journal, Record};
pub use logging::{LogFormat, init_logging};
