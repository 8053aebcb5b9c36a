use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tag map attached to samples, outcomes and alerts. Ordered so that
/// rendering and storage keys are deterministic.
pub type Tags = BTreeMap<String, String>;

/// Source category of a [`Sample`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleCategory {
    System,
    Disk,
    Network,
    Project,
    ProjectCustom,
}

impl SampleCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SampleCategory::System => "system",
            SampleCategory::Disk => "disk",
            SampleCategory::Network => "network",
            SampleCategory::Project => "project",
            SampleCategory::ProjectCustom => "project_custom",
        }
    }
}

impl std::fmt::Display for SampleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SampleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(SampleCategory::System),
            "disk" => Ok(SampleCategory::Disk),
            "network" => Ok(SampleCategory::Network),
            "project" => Ok(SampleCategory::Project),
            "project_custom" => Ok(SampleCategory::ProjectCustom),
            _ => Err(format!("unknown sample category: {s}")),
        }
    }
}

/// A single telemetry data point.
///
/// # Examples
///
/// ```
/// use pmon_common::types::{Sample, SampleCategory};
///
/// let s = Sample::new(SampleCategory::Project, "cpu_percent", 42.0, "percent")
///     .with_tag("project", "api");
/// assert_eq!(s.project(), Some("api"));
/// assert_eq!(s.category.to_string(), "project");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub category: SampleCategory,
    pub name: String,
    pub value: f64,
    pub unit: String,
    #[serde(default)]
    pub tags: Tags,
}

/// Identity of a sample for storage de-duplication.
pub type SampleKey = (SampleCategory, String, DateTime<Utc>, String);

impl Sample {
    pub fn new(category: SampleCategory, name: &str, value: f64, unit: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            name: name.to_string(),
            value,
            unit: unit.to_string(),
            tags: Tags::new(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_tag(mut self, key: &str, value: impl Into<String>) -> Self {
        self.tags.insert(key.to_string(), value.into());
        self
    }

    pub fn with_tags(mut self, tags: &Tags) -> Self {
        self.tags.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// The `project` tag, if this sample belongs to a project.
    pub fn project(&self) -> Option<&str> {
        self.tags.get("project").map(String::as_str)
    }

    pub fn key(&self) -> SampleKey {
        (
            self.category,
            self.name.clone(),
            self.timestamp,
            format_tags(&self.tags),
        )
    }
}

/// Alert severity level, ordered from lowest to highest.
///
/// # Examples
///
/// ```
/// use pmon_common::types::Severity;
///
/// let sev: Severity = "warning".parse().unwrap();
/// assert_eq!(sev, Severity::Warning);
/// assert_eq!(sev.to_string(), "warning");
/// assert!(Severity::Critical > Severity::Info);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(Severity::Info),
            "warning" => Ok(Severity::Warning),
            "critical" => Ok(Severity::Critical),
            _ => Err(format!("unknown severity: {s}")),
        }
    }
}

/// Categorical result of a health check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Numeric value used when alert rules compare health outcomes
    /// against a threshold.
    pub fn ordinal(&self) -> f64 {
        match self {
            HealthStatus::Healthy => 0.0,
            HealthStatus::Degraded => 1.0,
            HealthStatus::Unhealthy => 2.0,
            HealthStatus::Unknown => 3.0,
        }
    }

    /// Aggregation precedence: unhealthy > degraded > unknown > healthy.
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    /// Worst status of `statuses`, or `Unknown` when there are none.
    ///
    /// # Examples
    ///
    /// ```
    /// use pmon_common::types::HealthStatus;
    ///
    /// let all = [HealthStatus::Healthy, HealthStatus::Unknown, HealthStatus::Degraded];
    /// assert_eq!(HealthStatus::worst(all), HealthStatus::Degraded);
    /// assert_eq!(HealthStatus::worst([]), HealthStatus::Unknown);
    /// ```
    pub fn worst(statuses: impl IntoIterator<Item = HealthStatus>) -> HealthStatus {
        statuses
            .into_iter()
            .max_by_key(HealthStatus::rank)
            .unwrap_or(HealthStatus::Unknown)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "healthy" => Ok(HealthStatus::Healthy),
            "degraded" => Ok(HealthStatus::Degraded),
            "unhealthy" => Ok(HealthStatus::Unhealthy),
            "unknown" => Ok(HealthStatus::Unknown),
            _ => Err(format!("unknown health status: {s}")),
        }
    }
}

/// Result of one health-check execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckOutcome {
    pub check_name: String,
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    /// Wall time of the handler in milliseconds.
    pub latency_ms: Option<f64>,
    pub message: String,
    #[serde(default)]
    pub details: BTreeMap<String, serde_json::Value>,
    /// Tags copied from the check definition (e.g. `project`).
    #[serde(default)]
    pub tags: Tags,
}

impl HealthCheckOutcome {
    pub fn new(check_name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            check_name: check_name.to_string(),
            status,
            timestamp: Utc::now(),
            latency_ms: None,
            message: message.into(),
            details: BTreeMap::new(),
            tags: Tags::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

/// Point-in-time aggregate for one monitored project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSnapshot {
    pub project_name: String,
    pub project_id: i64,
    pub timestamp: DateTime<Utc>,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub memory_percent: f64,
    pub threads: u32,
    pub uptime_seconds: f64,
    pub restart_count: u32,
    pub error_rate_percent: f64,
    pub disk_usage_mb: f64,
    pub log_size_mb: f64,
    pub log_entries_per_minute: f64,
    pub last_error: Option<String>,
    pub last_error_time: Option<DateTime<Utc>>,
    /// `None` when no external probe ran this tick.
    pub health_check_status: Option<bool>,
    pub health_check_response_time_ms: Option<f64>,
    pub health_check_error: Option<String>,
    pub health_score: f64,
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
}

impl ProjectSnapshot {
    /// An empty, not-running snapshot used as the starting point of a tick.
    pub fn empty(project_name: &str, project_id: i64, timestamp: DateTime<Utc>) -> Self {
        Self {
            project_name: project_name.to_string(),
            project_id,
            timestamp,
            is_running: false,
            pid: None,
            cpu_percent: 0.0,
            memory_mb: 0.0,
            memory_percent: 0.0,
            threads: 0,
            uptime_seconds: 0.0,
            restart_count: 0,
            error_rate_percent: 0.0,
            disk_usage_mb: 0.0,
            log_size_mb: 0.0,
            log_entries_per_minute: 0.0,
            last_error: None,
            last_error_time: None,
            health_check_status: None,
            health_check_response_time_ms: None,
            health_check_error: None,
            health_score: 100.0,
            custom_metrics: BTreeMap::new(),
        }
    }
}

/// Latest-known state of one registered project, for listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_name: String,
    pub project_id: i64,
    pub is_running: bool,
    pub health_score: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
    pub uptime_seconds: f64,
    pub restart_count: u32,
    pub last_seen: Option<DateTime<Utc>>,
    pub error_rate_percent: f64,
}

/// Aggregates over a project's snapshot history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectPerformance {
    pub project_name: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub avg_cpu_percent: f64,
    pub max_cpu_percent: f64,
    pub avg_memory_mb: f64,
    pub max_memory_mb: f64,
    pub total_restarts: u32,
    /// Snapshots in the window that carried an error newer than the window start.
    pub total_errors: u32,
    pub uptime_percent: f64,
    pub avg_response_time_ms: Option<f64>,
}

/// Host overview assembled from the latest system sample batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemSummary {
    pub timestamp: Option<DateTime<Utc>>,
    pub cpu_usage_percent: f64,
    pub cpu_cores: usize,
    pub memory_total_bytes: f64,
    pub memory_used_bytes: f64,
    pub memory_usage_percent: f64,
    pub disk_total_bytes: f64,
    pub disk_used_bytes: f64,
    pub disk_usage_percent: f64,
    pub uptime_seconds: f64,
    pub load_average_1m: f64,
    pub load_average_5m: f64,
    pub load_average_15m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    Suppressed,
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "active"),
            AlertStatus::Acknowledged => write!(f, "acknowledged"),
            AlertStatus::Resolved => write!(f, "resolved"),
            AlertStatus::Suppressed => write!(f, "suppressed"),
        }
    }
}

/// A stateful alert instance for one (rule, scope) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    /// `"{rule}:{scope}"`; at most one open alert exists per key.
    pub key: String,
    pub rule_name: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub title: String,
    pub description: String,
    pub triggered_at: DateTime<Utc>,
    pub metric_value: Option<f64>,
    pub threshold_value: Option<f64>,
    pub project: Option<String>,
    #[serde(default)]
    pub tags: Tags,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolution_message: Option<String>,
    pub last_notified_at: Option<DateTime<Utc>>,
    pub notification_count: u32,
    pub escalated: bool,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    pub fn is_open(&self) -> bool {
        self.status != AlertStatus::Resolved
    }
}

/// Counters over the alert engine's current state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertStatistics {
    pub active_alerts: usize,
    pub by_severity: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub suppressed_rules: Vec<String>,
    pub total_rules: usize,
    pub enabled_rules: usize,
    pub history_size: usize,
}

/// Format a tag map as sorted `k=v` pairs separated by `", "`.
///
/// # Examples
///
/// ```
/// use pmon_common::types::{format_tags, Tags};
///
/// let mut tags = Tags::new();
/// tags.insert("mountpoint".to_string(), "/data".to_string());
/// tags.insert("device".to_string(), "sda1".to_string());
/// assert_eq!(format_tags(&tags), "device=sda1, mountpoint=/data");
/// ```
pub fn format_tags(tags: &Tags) -> String {
    tags.iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(", ")
}
