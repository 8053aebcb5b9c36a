//! Telemetry collection for the host and for supervised projects.
//!
//! Each [`Collector`] gathers one category of host metrics (CPU, memory,
//! disk, network, load, process counts) and returns them as [`Sample`]s.
//! [`system::SystemSampler`] runs a set of collectors with per-collector
//! fault isolation; [`project::ProjectSampler`] produces per-project
//! snapshots and health scores. [`runner::SamplerRunner`] drives either on
//! a fixed interval, persisting each batch and notifying listeners.

pub mod cpu;
pub mod disk;
pub mod error;
pub mod load;
pub mod logs;
pub mod memory;
pub mod network;
pub mod process;
pub mod project;
pub mod runner;
pub mod system;

#[cfg(test)]
mod tests;

use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::Sample;

/// A host metric collector.
///
/// Implementations are owned by a [`system::SystemSampler`] and called once
/// per collection tick. The trait requires `Send + Sync` so the sampler can
/// be shared with its background loop.
pub trait Collector: Send + Sync {
    /// Returns the collector name (e.g., `"cpu"`, `"disk"`), used for logging.
    fn name(&self) -> &str;

    /// Collects current values, stamping every sample with `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying system API call fails.
    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>>;
}

pub(crate) fn percent(part: f64, total: f64) -> f64 {
    if total > 0.0 {
        (part / total) * 100.0
    } else {
        0.0
    }
}
