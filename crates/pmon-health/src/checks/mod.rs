//! One handler per check type. Handlers return a finished outcome for
//! every condition they understand and an error only for failures the
//! engine should report as `unknown`.

pub mod custom;
pub mod log;
pub mod network;
pub mod process;

use pmon_common::types::{HealthCheckOutcome, HealthStatus};

pub(crate) fn outcome(name: &str, status: HealthStatus, message: impl Into<String>) -> HealthCheckOutcome {
    HealthCheckOutcome::new(name, status, message)
}

/// Truncates `text` to `max` characters.
pub(crate) fn excerpt(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}
