//! Per-project sampling: process stats, log-derived rates, disk usage and
//! an optional external HTTP probe, folded into a [`ProjectSnapshot`] with
//! a composite health score.

use crate::error::{CollectorError, Result};
use crate::logs::LogSource;
use crate::process::{ProcessStats, ProcessTable, SysinfoProcessTable};
use crate::runner::Sampler;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pmon_common::types::{
    ProjectPerformance, ProjectSnapshot, ProjectSummary, Sample, SampleCategory,
};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const MAX_ERROR_MESSAGE_LENGTH: usize = 500;

/// What the process supervisor tells us about a project.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRegistration {
    pub name: String,
    pub id: i64,
    pub pid: Option<u32>,
    pub health_check_url: Option<String>,
    /// Project working directory, walked for disk and log-file usage.
    pub path: Option<PathBuf>,
}

impl ProjectRegistration {
    pub fn new(name: &str, id: i64) -> Self {
        Self {
            name: name.to_string(),
            id,
            pid: None,
            health_check_url: None,
            path: None,
        }
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_health_check_url(mut self, url: &str) -> Self {
        self.health_check_url = Some(url.to_string());
        self
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

struct MonitoredProject {
    id: i64,
    pid: Option<u32>,
    /// Pid of the last process seen for this project; survives a detected
    /// death so the next pid counts as a restart.
    last_known_pid: Option<u32>,
    health_check_url: Option<String>,
    path: Option<PathBuf>,
    restart_count: u32,
    last_seen_alive: Option<DateTime<Utc>>,
    custom_metrics: BTreeMap<String, f64>,
    last_snapshot: Option<ProjectSnapshot>,
}

#[derive(Default)]
struct ProjectState {
    projects: BTreeMap<String, MonitoredProject>,
    histories: BTreeMap<String, VecDeque<ProjectSnapshot>>,
}

struct Target {
    name: String,
    id: i64,
    pid: Option<u32>,
    health_check_url: Option<String>,
    path: Option<PathBuf>,
    restart_count: u32,
    custom_metrics: BTreeMap<String, f64>,
}

struct ProbeResult {
    healthy: bool,
    response_time_ms: Option<f64>,
    error: Option<String>,
}

pub struct ProjectSampler {
    state: Mutex<ProjectState>,
    processes: Mutex<Box<dyn ProcessTable>>,
    log_source: Option<Arc<dyn LogSource>>,
    client: reqwest::Client,
    history_limit: usize,
    probe_timeout: Duration,
}

impl ProjectSampler {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProjectState::default()),
            processes: Mutex::new(Box::new(SysinfoProcessTable::new())),
            log_source: None,
            client: reqwest::Client::new(),
            history_limit: 1000,
            probe_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_process_table(mut self, table: Box<dyn ProcessTable>) -> Self {
        self.processes = Mutex::new(table);
        self
    }

    pub fn with_log_source(mut self, source: Arc<dyn LogSource>) -> Self {
        self.log_source = Some(source);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit.max(1);
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ProjectState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts monitoring a project, replacing any registration with the
    /// same name. History of a previous registration is kept.
    pub fn add_project(&self, registration: ProjectRegistration) -> Result<()> {
        if registration.name.trim().is_empty() {
            return Err(CollectorError::InvalidRegistration(
                "project name is empty".to_string(),
            ));
        }
        let now = Utc::now();
        let mut state = self.lock_state();
        state.histories.entry(registration.name.clone()).or_default();
        state.projects.insert(
            registration.name.clone(),
            MonitoredProject {
                id: registration.id,
                pid: registration.pid,
                last_known_pid: registration.pid,
                health_check_url: registration.health_check_url,
                path: registration.path,
                restart_count: 0,
                last_seen_alive: registration.pid.map(|_| now),
                custom_metrics: BTreeMap::new(),
                last_snapshot: None,
            },
        );
        tracing::info!(project = %registration.name, pid = ?registration.pid, "Added project to monitoring");
        Ok(())
    }

    /// Stops monitoring a project and drops its snapshot history. Returns
    /// `false` if it was not registered.
    pub fn remove_project(&self, name: &str) -> bool {
        let mut state = self.lock_state();
        let removed = state.projects.remove(name).is_some();
        state.histories.remove(name);
        if removed {
            tracing::info!(project = name, "Removed project from monitoring");
        }
        removed
    }

    pub fn update_pid(&self, name: &str, pid: Option<u32>) -> Result<()> {
        self.update_pid_at(name, pid, Utc::now())
    }

    /// Records a pid change reported by the supervisor.
    ///
    /// A first pid (or the same pid again) is a start. A different pid
    /// while running, or after the previous process was found dead, is a
    /// restart and the counter increments. `None` is a clean stop.
    pub fn update_pid_at(&self, name: &str, pid: Option<u32>, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.lock_state();
        let project = state
            .projects
            .get_mut(name)
            .ok_or_else(|| CollectorError::UnknownProject(name.to_string()))?;

        match (project.pid, pid) {
            (None, Some(new_pid)) => {
                if project.last_known_pid.is_some_and(|known| known != new_pid) {
                    project.restart_count += 1;
                    tracing::info!(project = name, pid = new_pid, "Project restarted after process death");
                }
                project.last_seen_alive = Some(now);
                project.last_known_pid = Some(new_pid);
            }
            (Some(old_pid), Some(new_pid)) if old_pid != new_pid => {
                project.restart_count += 1;
                project.last_seen_alive = Some(now);
                project.last_known_pid = Some(new_pid);
                tracing::info!(project = name, old_pid, new_pid, "Project restarted");
            }
            (Some(_), None) => {
                project.last_known_pid = None;
                tracing::info!(project = name, "Project stopped");
            }
            _ => {}
        }
        project.pid = pid;
        Ok(())
    }

    /// Sets an application-reported metric, emitted with every following
    /// snapshot as a `project_custom` sample. Returns `false` for an
    /// unknown project.
    pub fn record_custom_metric(&self, project: &str, name: &str, value: f64) -> bool {
        match self.lock_state().projects.get_mut(project) {
            Some(p) => {
                p.custom_metrics.insert(name.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn project_names(&self) -> Vec<String> {
        self.lock_state().projects.keys().cloned().collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock_state().projects.contains_key(name)
    }

    pub fn restart_count(&self, name: &str) -> Option<u32> {
        self.lock_state().projects.get(name).map(|p| p.restart_count)
    }

    pub fn current_pid(&self, name: &str) -> Option<u32> {
        self.lock_state().projects.get(name).and_then(|p| p.pid)
    }

    /// Collects one snapshot per registered project and returns the
    /// corresponding samples.
    pub async fn sample_at(&self, now: DateTime<Utc>) -> Vec<Sample> {
        let targets: Vec<Target> = self
            .lock_state()
            .projects
            .iter()
            .map(|(name, p)| Target {
                name: name.clone(),
                id: p.id,
                pid: p.pid,
                health_check_url: p.health_check_url.clone(),
                path: p.path.clone(),
                restart_count: p.restart_count,
                custom_metrics: p.custom_metrics.clone(),
            })
            .collect();
        if targets.is_empty() {
            return Vec::new();
        }

        let stats: Vec<Option<ProcessStats>> = {
            let mut table = self.processes.lock().unwrap_or_else(|e| e.into_inner());
            table.refresh();
            targets
                .iter()
                .map(|t| t.pid.and_then(|pid| table.by_pid(pid)))
                .collect()
        };

        let mut snapshots = Vec::with_capacity(targets.len());
        for (target, stats) in targets.iter().zip(stats) {
            snapshots.push(self.snapshot(target, stats, now).await);
        }

        let mut samples = Vec::new();
        let mut state = self.lock_state();
        for (target, snapshot) in targets.iter().zip(snapshots) {
            let Some(project) = state.projects.get_mut(&target.name) else {
                continue;
            };
            if snapshot.is_running {
                project.last_seen_alive = Some(now);
            } else if target.pid.is_some() && project.pid == target.pid {
                tracing::warn!(project = %target.name, pid = ?target.pid, "Project process is no longer running");
                project.pid = None;
            }
            project.last_snapshot = Some(snapshot.clone());

            samples.extend(snapshot_samples(&snapshot));
            let history = state.histories.entry(target.name.clone()).or_default();
            history.push_back(snapshot);
            while history.len() > self.history_limit {
                history.pop_front();
            }
        }
        samples
    }

    async fn snapshot(
        &self,
        target: &Target,
        stats: Option<ProcessStats>,
        now: DateTime<Utc>,
    ) -> ProjectSnapshot {
        let mut snapshot = ProjectSnapshot::empty(&target.name, target.id, now);
        snapshot.restart_count = target.restart_count;
        snapshot.custom_metrics = target.custom_metrics.clone();

        if let Some(stats) = stats.filter(ProcessStats::is_alive) {
            snapshot.is_running = true;
            snapshot.pid = Some(stats.pid);
            snapshot.cpu_percent = stats.cpu_percent;
            snapshot.memory_mb = stats.memory_mb;
            snapshot.memory_percent = stats.memory_percent;
            snapshot.threads = stats.threads;
            snapshot.uptime_seconds = stats.run_time_secs as f64;
        }

        self.collect_log_metrics(&mut snapshot, now).await;

        if let Some(path) = target.path.clone() {
            match tokio::task::spawn_blocking(move || directory_usage(&path)).await {
                Ok((total, logs)) => {
                    snapshot.disk_usage_mb = bytes_to_mb(total);
                    snapshot.log_size_mb = bytes_to_mb(logs);
                }
                Err(e) => {
                    tracing::warn!(project = %target.name, error = %e, "Disk usage scan failed")
                }
            }
        }

        if let (Some(url), true) = (&target.health_check_url, snapshot.is_running) {
            let probe = self.probe(url).await;
            if !probe.healthy {
                tracing::warn!(project = %target.name, error = ?probe.error, "Project health probe failed");
            }
            snapshot.health_check_status = Some(probe.healthy);
            snapshot.health_check_response_time_ms = probe.response_time_ms;
            snapshot.health_check_error = probe.error;
        }

        snapshot.health_score = health_score(&snapshot, now);
        snapshot
    }

    async fn collect_log_metrics(&self, snapshot: &mut ProjectSnapshot, now: DateTime<Utc>) {
        let Some(source) = &self.log_source else {
            return;
        };
        let since = now - chrono::Duration::minutes(1);
        match source.entries_since(snapshot.project_id, since).await {
            Ok(entries) => {
                snapshot.log_entries_per_minute = entries.len() as f64;
                if !entries.is_empty() {
                    let errors = entries.iter().filter(|e| e.is_error()).count();
                    snapshot.error_rate_percent = errors as f64 / entries.len() as f64 * 100.0;
                }
            }
            Err(e) => {
                tracing::warn!(project = %snapshot.project_name, error = %e, "Log metrics unavailable")
            }
        }
        match source.latest_error(snapshot.project_id).await {
            Ok(Some(entry)) => {
                snapshot.last_error = Some(entry.message.chars().take(MAX_ERROR_MESSAGE_LENGTH).collect());
                snapshot.last_error_time = Some(entry.timestamp);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(project = %snapshot.project_name, error = %e, "Latest error lookup failed")
            }
        }
    }

    async fn probe(&self, url: &str) -> ProbeResult {
        let started = Instant::now();
        match self.client.get(url).timeout(self.probe_timeout).send().await {
            Ok(response) => {
                let elapsed = started.elapsed().as_secs_f64() * 1000.0;
                let status = response.status();
                if status.is_success() {
                    ProbeResult {
                        healthy: true,
                        response_time_ms: Some(elapsed),
                        error: None,
                    }
                } else {
                    ProbeResult {
                        healthy: false,
                        response_time_ms: Some(elapsed),
                        error: Some(format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        )),
                    }
                }
            }
            Err(e) => {
                let error = if e.is_timeout() {
                    format!("Timeout after {}s", self.probe_timeout.as_secs())
                } else if e.is_connect() {
                    format!("Connection error: {e}")
                } else {
                    format!("Request error: {e}")
                };
                ProbeResult {
                    healthy: false,
                    response_time_ms: None,
                    error: Some(error),
                }
            }
        }
    }

    /// Latest snapshot of a registered project.
    pub fn latest(&self, name: &str) -> Option<ProjectSnapshot> {
        self.lock_state()
            .projects
            .get(name)
            .and_then(|p| p.last_snapshot.clone())
    }

    /// Snapshots of `name` taken within `window` before now, oldest first.
    pub fn history(&self, name: &str, window: chrono::Duration) -> Vec<ProjectSnapshot> {
        let cutoff = Utc::now() - window;
        self.lock_state()
            .histories
            .get(name)
            .map(|h| h.iter().filter(|s| s.timestamp >= cutoff).cloned().collect())
            .unwrap_or_default()
    }

    pub fn summaries(&self) -> Vec<ProjectSummary> {
        self.lock_state()
            .projects
            .iter()
            .map(|(name, p)| {
                let latest = p.last_snapshot.as_ref();
                ProjectSummary {
                    project_name: name.clone(),
                    project_id: p.id,
                    is_running: latest.is_some_and(|s| s.is_running),
                    health_score: latest.map_or(0.0, |s| s.health_score),
                    cpu_percent: latest.map_or(0.0, |s| s.cpu_percent),
                    memory_mb: latest.map_or(0.0, |s| s.memory_mb),
                    uptime_seconds: latest.map_or(0.0, |s| s.uptime_seconds),
                    restart_count: p.restart_count,
                    last_seen: p.last_seen_alive,
                    error_rate_percent: latest.map_or(0.0, |s| s.error_rate_percent),
                }
            })
            .collect()
    }

    /// Aggregates over the snapshots of the last `window`.
    pub fn performance(&self, name: &str, window: chrono::Duration) -> Option<ProjectPerformance> {
        performance(name, &self.history(name, window))
    }
}

impl Default for ProjectSampler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Sampler for ProjectSampler {
    fn name(&self) -> &str {
        "projects"
    }

    async fn sample(&self) -> Vec<Sample> {
        self.sample_at(Utc::now()).await
    }
}

/// Composite 0-100 health score of a snapshot.
///
/// Starts at 100 and deducts for: not running (50), error rate (>10%: 20,
/// >5%: 10), cpu and memory percent (>90: 15, >70: 10 each), a recent error
/// (<5 min: 10, <30 min: 5), restarts (>10: 10, >5: 5) and the external
/// probe (failed: 15, else slower than 5 s: 10, slower than 2 s: 5).
pub fn health_score(snapshot: &ProjectSnapshot, now: DateTime<Utc>) -> f64 {
    let mut score = 100.0;

    if !snapshot.is_running {
        score -= 50.0;
    }

    if snapshot.error_rate_percent > 10.0 {
        score -= 20.0;
    } else if snapshot.error_rate_percent > 5.0 {
        score -= 10.0;
    }

    if snapshot.cpu_percent > 90.0 {
        score -= 15.0;
    } else if snapshot.cpu_percent > 70.0 {
        score -= 10.0;
    }

    if snapshot.memory_percent > 90.0 {
        score -= 15.0;
    } else if snapshot.memory_percent > 70.0 {
        score -= 10.0;
    }

    if let Some(error_time) = snapshot.last_error_time {
        let minutes = (now - error_time).num_seconds() as f64 / 60.0;
        if minutes < 5.0 {
            score -= 10.0;
        } else if minutes < 30.0 {
            score -= 5.0;
        }
    }

    if snapshot.restart_count > 10 {
        score -= 10.0;
    } else if snapshot.restart_count > 5 {
        score -= 5.0;
    }

    match snapshot.health_check_status {
        Some(false) => score -= 15.0,
        Some(true) => match snapshot.health_check_response_time_ms {
            Some(ms) if ms > 5000.0 => score -= 10.0,
            Some(ms) if ms > 2000.0 => score -= 5.0,
            _ => {}
        },
        None => {}
    }

    f64::clamp(score, 0.0, 100.0)
}

/// Samples emitted for one snapshot, tagged with the project name and id.
pub fn snapshot_samples(snapshot: &ProjectSnapshot) -> Vec<Sample> {
    let project_id = snapshot.project_id.to_string();
    let sample = |category: SampleCategory, name: &str, value: f64, unit: &str| {
        Sample::new(category, name, value, unit)
            .at(snapshot.timestamp)
            .with_tag("project", snapshot.project_name.as_str())
            .with_tag("project_id", project_id.as_str())
    };
    let project = |name: &str, value: f64, unit: &str| sample(SampleCategory::Project, name, value, unit);
    let flag = |b: bool| if b { 1.0 } else { 0.0 };

    let mut samples = vec![
        project("cpu_percent", snapshot.cpu_percent, "percent"),
        project("memory_mb", snapshot.memory_mb, "mb"),
        project("memory_percent", snapshot.memory_percent, "percent"),
        project("threads", snapshot.threads as f64, "count"),
        project("uptime_seconds", snapshot.uptime_seconds, "seconds"),
        project("is_running", flag(snapshot.is_running), "boolean"),
        project("restart_count", snapshot.restart_count as f64, "count"),
        project("error_rate_percent", snapshot.error_rate_percent, "percent"),
        project("disk_usage_mb", snapshot.disk_usage_mb, "mb"),
        project("log_size_mb", snapshot.log_size_mb, "mb"),
        project("log_entries_per_minute", snapshot.log_entries_per_minute, "lpm"),
    ];
    if let Some(status) = snapshot.health_check_status {
        samples.push(project("health_check_status", flag(status), "boolean"));
    }
    if let Some(ms) = snapshot.health_check_response_time_ms {
        samples.push(project("health_check_response_time_ms", ms, "ms"));
    }
    samples.push(project("health_score", snapshot.health_score, "score"));
    for (name, value) in &snapshot.custom_metrics {
        samples.push(sample(SampleCategory::ProjectCustom, name, *value, "custom"));
    }
    samples
}

/// Aggregates a snapshot history. `None` for an empty history.
pub fn performance(name: &str, history: &[ProjectSnapshot]) -> Option<ProjectPerformance> {
    let period_start = history.iter().map(|s| s.timestamp).min()?;
    let period_end = history.iter().map(|s| s.timestamp).max()?;

    let running: Vec<&ProjectSnapshot> = history.iter().filter(|s| s.is_running).collect();
    let avg = |values: &[f64]| {
        if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        }
    };
    let max = |values: &[f64]| values.iter().copied().fold(0.0, f64::max);
    let cpu: Vec<f64> = running.iter().map(|s| s.cpu_percent).collect();
    let memory: Vec<f64> = running.iter().map(|s| s.memory_mb).collect();
    let response_times: Vec<f64> = history
        .iter()
        .filter_map(|s| s.health_check_response_time_ms)
        .collect();

    Some(ProjectPerformance {
        project_name: name.to_string(),
        period_start,
        period_end,
        avg_cpu_percent: avg(&cpu),
        max_cpu_percent: max(&cpu),
        avg_memory_mb: avg(&memory),
        max_memory_mb: max(&memory),
        total_restarts: history.iter().map(|s| s.restart_count).max().unwrap_or(0),
        total_errors: history
            .iter()
            .filter(|s| s.last_error_time.is_some_and(|t| t >= period_start))
            .count() as u32,
        uptime_percent: running.len() as f64 / history.len() as f64 * 100.0,
        avg_response_time_ms: (!response_times.is_empty()).then(|| avg(&response_times)),
    })
}

/// Total size of all files under `root` and of the `*.log` files among
/// them. Unreadable entries are skipped; symlinks are not followed.
pub fn directory_usage(root: &Path) -> (u64, u64) {
    let mut total = 0;
    let mut logs = 0;
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let Ok(meta) = entry.path().symlink_metadata() else {
                continue;
            };
            if meta.is_dir() {
                pending.push(entry.path());
            } else if meta.is_file() {
                total += meta.len();
                if entry.path().extension().is_some_and(|ext| ext == "log") {
                    logs += meta.len();
                }
            }
        }
    }
    (total, logs)
}

fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / 1024.0 / 1024.0
}
