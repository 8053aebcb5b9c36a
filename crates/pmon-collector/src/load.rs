use crate::Collector;
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory};
use sysinfo::System;

pub struct LoadCollector;

impl LoadCollector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LoadCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for LoadCollector {
    fn name(&self) -> &str {
        "load"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        let load_avg = System::load_average();
        let uptime = System::uptime();

        let sample = |name: &str, value: f64, unit: &str| {
            Sample::new(SampleCategory::System, name, value, unit).at(now)
        };

        Ok(vec![
            sample("load_average_1m", load_avg.one, "load"),
            sample("load_average_5m", load_avg.five, "load"),
            sample("load_average_15m", load_avg.fifteen, "load"),
            sample("uptime_seconds", uptime as f64, "seconds"),
        ])
    }
}
