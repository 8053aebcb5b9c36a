use crate::{percent, Collector};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory};
use sysinfo::System;

pub struct MemoryCollector {
    system: System,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for MemoryCollector {
    fn name(&self) -> &str {
        "memory"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.system.refresh_memory();

        let total = self.system.total_memory() as f64;
        let used = self.system.used_memory() as f64;
        let available = self.system.available_memory() as f64;
        let swap_total = self.system.total_swap() as f64;
        let swap_used = self.system.used_swap() as f64;

        let sample = |name: &str, value: f64, unit: &str| {
            Sample::new(SampleCategory::System, name, value, unit).at(now)
        };

        Ok(vec![
            sample("memory_total_bytes", total, "bytes"),
            sample("memory_used_bytes", used, "bytes"),
            sample("memory_available_bytes", available, "bytes"),
            sample("memory_usage_percent", percent(used, total), "percent"),
            // Swap
            sample("swap_total_bytes", swap_total, "bytes"),
            sample("swap_used_bytes", swap_used, "bytes"),
            sample("swap_usage_percent", percent(swap_used, swap_total), "percent"),
        ])
    }
}
