//! Shared value types for the pmon monitoring subsystem.
//!
//! Everything that crosses a crate boundary lives here: telemetry
//! [`types::Sample`]s, health-check outcomes, project snapshots and the
//! [`types::Alert`] instances handed to notification channels.

pub mod id;
pub mod listener;
pub mod task;
pub mod types;
