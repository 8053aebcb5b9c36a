//! Process inspection: host-wide process counts and per-process stats.

use crate::{percent, Collector};
use anyhow::Result;
use chrono::{DateTime, Utc};
use pmon_common::types::{Sample, SampleCategory};
use std::collections::BTreeMap;
use std::ffi::OsStr;
use sysinfo::{Pid, Process, ProcessStatus, System};

/// Resource usage of a single process.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessStats {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub memory_percent: f64,
    pub threads: u32,
    /// Lowercase state name, e.g. `"run"`, `"sleep"`, `"zombie"`.
    pub status: String,
    pub run_time_secs: u64,
}

impl ProcessStats {
    /// Zombie and dead processes still have a table entry but do not count
    /// as running.
    pub fn is_alive(&self) -> bool {
        !matches!(self.status.as_str(), "zombie" | "dead")
    }
}

/// Read access to the host process table.
///
/// CPU usage is computed between two refreshes, so callers that need it
/// must keep the table alive across ticks or call [`refresh`](Self::refresh)
/// twice with a pause in between.
pub trait ProcessTable: Send + Sync {
    fn refresh(&mut self);

    fn by_pid(&self, pid: u32) -> Option<ProcessStats>;

    /// First process whose executable name equals `name`.
    fn by_name(&self, name: &str) -> Option<ProcessStats>;

    /// Process count per lowercase status.
    fn status_counts(&self) -> BTreeMap<String, usize>;
}

/// [`ProcessTable`] backed by `sysinfo`.
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self {
            system: System::new_all(),
        }
    }

    fn stats(&self, pid: Pid, process: &Process) -> ProcessStats {
        let name: &OsStr = process.name();
        let memory = process.memory() as f64;
        ProcessStats {
            pid: pid.as_u32(),
            name: name.to_string_lossy().to_string(),
            cpu_percent: process.cpu_usage() as f64,
            memory_mb: memory / 1024.0 / 1024.0,
            memory_percent: percent(memory, self.system.total_memory() as f64),
            threads: process.tasks().map(|t| t.len() as u32).unwrap_or(1).max(1),
            status: status_name(process.status()),
            run_time_secs: process.run_time(),
        }
    }
}

impl Default for SysinfoProcessTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn refresh(&mut self) {
        self.system.refresh_all();
    }

    fn by_pid(&self, pid: u32) -> Option<ProcessStats> {
        let pid = Pid::from_u32(pid);
        self.system.process(pid).map(|p| self.stats(pid, p))
    }

    fn by_name(&self, name: &str) -> Option<ProcessStats> {
        self.system
            .processes()
            .iter()
            .find(|(_, p)| p.name() == name)
            .map(|(pid, p)| self.stats(*pid, p))
    }

    fn status_counts(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for process in self.system.processes().values() {
            *counts.entry(status_name(process.status())).or_insert(0) += 1;
        }
        counts
    }
}

fn status_name(status: ProcessStatus) -> String {
    match status {
        ProcessStatus::Zombie => "zombie".to_string(),
        ProcessStatus::Dead => "dead".to_string(),
        other => other.to_string().to_lowercase(),
    }
}

/// Host-wide process counts, total and per status.
pub struct ProcessCountCollector {
    table: Box<dyn ProcessTable>,
}

impl ProcessCountCollector {
    pub fn new() -> Self {
        Self::with_table(Box::new(SysinfoProcessTable::new()))
    }

    pub fn with_table(table: Box<dyn ProcessTable>) -> Self {
        Self { table }
    }
}

impl Default for ProcessCountCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for ProcessCountCollector {
    fn name(&self) -> &str {
        "processes"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> Result<Vec<Sample>> {
        self.table.refresh();
        let counts = self.table.status_counts();
        let total: usize = counts.values().sum();

        let mut samples = vec![Sample::new(
            SampleCategory::System,
            "process_count_total",
            total as f64,
            "processes",
        )
        .at(now)];
        for (status, count) in counts {
            samples.push(
                Sample::new(
                    SampleCategory::System,
                    "process_count_by_status",
                    count as f64,
                    "processes",
                )
                .at(now)
                .with_tag("status", status),
            );
        }
        Ok(samples)
    }
}
