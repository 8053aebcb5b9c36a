use crate::Collector;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory};
use sysinfo::System;

pub struct CpuCollector {
    system: System,
}

impl CpuCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu_all();
        Self { system }
    }
}

impl Default for CpuCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for CpuCollector {
    fn name(&self) -> &str {
        "cpu"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.system.refresh_cpu_all();
        let cpus = self.system.cpus();
        if cpus.is_empty() {
            anyhow::bail!("no CPUs reported");
        }

        let mut samples = vec![Sample::new(
            SampleCategory::System,
            "cpu_usage_percent",
            self.system.global_cpu_usage() as f64,
            "percent",
        )
        .at(now)];

        for (i, cpu) in cpus.iter().enumerate() {
            samples.push(
                Sample::new(
                    SampleCategory::System,
                    "cpu_core_usage_percent",
                    cpu.cpu_usage() as f64,
                    "percent",
                )
                .at(now)
                .with_tag("core", i.to_string()),
            );
        }

        let frequency = cpus[0].frequency();
        if frequency > 0 {
            samples.push(
                Sample::new(SampleCategory::System, "cpu_frequency_mhz", frequency as f64, "mhz").at(now),
            );
        }

        Ok(samples)
    }
}
