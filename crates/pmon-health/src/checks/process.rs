use super::outcome;
use crate::definition::ProcessCheck;
use crate::error::{HealthError, Result};
use pmon_collector::process::{ProcessStats, ProcessTable, SysinfoProcessTable};
use pmon_common::types::{HealthCheckOutcome, HealthStatus};

pub async fn run(name: &str, check: &ProcessCheck) -> Result<HealthCheckOutcome> {
    let lookup = match (check.pid, &check.process_name) {
        (Some(pid), _) => Lookup::Pid(pid),
        (None, Some(process_name)) => Lookup::Name(process_name.clone()),
        (None, None) => {
            return Ok(outcome(
                name,
                HealthStatus::Unknown,
                "No PID or process name specified",
            ))
        }
    };

    let not_found = match &lookup {
        Lookup::Pid(pid) => format!("Process with PID {pid} not found"),
        Lookup::Name(n) => format!("Process '{n}' not found"),
    };
    let stats = tokio::task::spawn_blocking(move || lookup.find())
        .await
        .map_err(|e| HealthError::Other(format!("process lookup panicked: {e}")))?;

    match stats {
        Some(stats) => Ok(evaluate(name, check, &stats)),
        None => Ok(outcome(name, HealthStatus::Unhealthy, not_found)),
    }
}

enum Lookup {
    Pid(u32),
    Name(String),
}

impl Lookup {
    /// Two refreshes a CPU-update interval apart, so the usage figure is
    /// meaningful.
    fn find(&self) -> Option<ProcessStats> {
        let mut table = SysinfoProcessTable::new();
        std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
        table.refresh();
        match self {
            Lookup::Pid(pid) => table.by_pid(*pid),
            Lookup::Name(name) => table.by_name(name),
        }
    }
}

/// Applies the check's ceilings to a process snapshot.
pub fn evaluate(name: &str, check: &ProcessCheck, stats: &ProcessStats) -> HealthCheckOutcome {
    let mut status = HealthStatus::Healthy;
    let mut issues = Vec::new();

    if stats.cpu_percent > check.max_cpu_percent {
        issues.push(format!("High CPU usage: {:.1}%", stats.cpu_percent));
        status = HealthStatus::Degraded;
    }
    if stats.memory_mb > check.max_memory_mb {
        issues.push(format!("High memory usage: {:.1}MB", stats.memory_mb));
        status = HealthStatus::Degraded;
    }
    if !stats.is_alive() {
        issues.push(format!("Process status: {}", stats.status));
        status = HealthStatus::Unhealthy;
    }

    let message = if issues.is_empty() {
        "Process check passed".to_string()
    } else {
        issues.join("; ")
    };

    outcome(name, status, message)
        .with_detail("pid", stats.pid)
        .with_detail("cpu_percent", stats.cpu_percent)
        .with_detail("memory_mb", stats.memory_mb)
        .with_detail("status", stats.status.as_str())
        .with_detail("num_threads", stats.threads)
}
