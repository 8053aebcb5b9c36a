use crate::cpu::CpuCollector;
use crate::disk::DiskCollector;
use crate::load::LoadCollector;
use crate::memory::MemoryCollector;
use crate::network::NetworkCollector;
use crate::process::ProcessCountCollector;
use crate::runner::Sampler;
use crate::Collector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SystemSummary};
use std::sync::{Mutex, RwLock};

/// Host-wide sampler running every registered [`Collector`] per tick.
pub struct SystemSampler {
    collectors: Mutex<Vec<Box<dyn Collector>>>,
    last_batch: RwLock<Vec<Sample>>,
}

impl SystemSampler {
    /// A sampler with the cpu, memory, disk, network, load and process
    /// collectors.
    pub fn new() -> Self {
        Self::with_collectors(vec![
            Box::new(CpuCollector::new()),
            Box::new(MemoryCollector::new()),
            Box::new(DiskCollector::new()),
            Box::new(NetworkCollector::new()),
            Box::new(LoadCollector::new()),
            Box::new(ProcessCountCollector::new()),
        ])
    }

    pub fn with_collectors(collectors: Vec<Box<dyn Collector>>) -> Self {
        Self {
            collectors: Mutex::new(collectors),
            last_batch: RwLock::new(Vec::new()),
        }
    }

    /// Runs every collector once. A failing collector is logged and
    /// contributes nothing; the others still run.
    pub fn collect_at(&self, now: DateTime<Utc>) -> Vec<Sample> {
        let mut samples = Vec::new();
        {
            let mut collectors = self.collectors.lock().unwrap_or_else(|e| e.into_inner());
            for collector in collectors.iter_mut() {
                match collector.collect(now) {
                    Ok(batch) => samples.extend(batch),
                    Err(e) => {
                        tracing::warn!(collector = collector.name(), error = %e, "Collection failed")
                    }
                }
            }
        }
        *self.last_batch.write().unwrap_or_else(|e| e.into_inner()) = samples.clone();
        samples
    }

    /// Overview of the most recent batch, or `None` before the first one.
    pub fn summary(&self) -> Option<SystemSummary> {
        let batch = self.last_batch.read().unwrap_or_else(|e| e.into_inner());
        summarize(&batch)
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for SystemSampler {
    fn name(&self) -> &str {
        "system"
    }

    async fn sample(&self) -> Vec<Sample> {
        self.collect_at(Utc::now())
    }
}

/// Builds a [`SystemSummary`] from one sample batch. Disk figures come from
/// the `/` mount, falling back to the largest disk.
pub fn summarize(batch: &[Sample]) -> Option<SystemSummary> {
    let first = batch.first()?;
    let value = |name: &str| {
        batch
            .iter()
            .find(|s| s.name == name && s.tags.is_empty())
            .map(|s| s.value)
            .unwrap_or(0.0)
    };

    let disk_totals = batch.iter().filter(|s| s.name == "disk_total_bytes");
    let root_mount = disk_totals
        .clone()
        .find(|s| s.tags.get("mountpoint").is_some_and(|m| m == "/"))
        .or_else(|| disk_totals.max_by(|a, b| a.value.total_cmp(&b.value)))
        .and_then(|s| s.tags.get("mountpoint").cloned());
    let disk_value = |name: &str| {
        root_mount
            .as_ref()
            .and_then(|mount| {
                batch
                    .iter()
                    .find(|s| s.name == name && s.tags.get("mountpoint") == Some(mount))
            })
            .map(|s| s.value)
            .unwrap_or(0.0)
    };

    Some(SystemSummary {
        timestamp: Some(first.timestamp),
        cpu_usage_percent: value("cpu_usage_percent"),
        cpu_cores: batch
            .iter()
            .filter(|s| s.name == "cpu_core_usage_percent")
            .count(),
        memory_total_bytes: value("memory_total_bytes"),
        memory_used_bytes: value("memory_used_bytes"),
        memory_usage_percent: value("memory_usage_percent"),
        disk_total_bytes: disk_value("disk_total_bytes"),
        disk_used_bytes: disk_value("disk_used_bytes"),
        disk_usage_percent: disk_value("disk_usage_percent"),
        uptime_seconds: value("uptime_seconds"),
        load_average_1m: value("load_average_1m"),
        load_average_5m: value("load_average_5m"),
        load_average_15m: value("load_average_15m"),
    })
}
