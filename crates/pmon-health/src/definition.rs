use crate::error::{HealthError, Result};
use pmon_common::types::Tags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A named, scheduled health check.
///
/// # Examples
///
/// ```
/// use pmon_health::definition::{CheckKind, HealthCheckDefinition};
///
/// let def: HealthCheckDefinition = serde_json::from_value(serde_json::json!({
///     "name": "api-http",
///     "type": "http",
///     "url": "http://127.0.0.1:8080/health",
/// }))
/// .unwrap();
/// assert_eq!(def.interval_secs, 60);
/// assert!(matches!(def.kind, CheckKind::Network(ref n) if n.expected_status_codes == vec![200]));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckDefinition {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Copied onto every outcome; a `project` tag scopes alerts.
    #[serde(default)]
    pub tags: Tags,
    #[serde(flatten)]
    pub kind: CheckKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CheckKind {
    #[serde(alias = "http")]
    Network(NetworkCheck),
    Process(ProcessCheck),
    Log(LogCheck),
    Custom(CustomCheck),
}

impl CheckKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            CheckKind::Network(_) => "network",
            CheckKind::Process(_) => "process",
            CheckKind::Log(_) => "log",
            CheckKind::Custom(_) => "custom",
        }
    }
}

/// HTTP GET with a status-code allow-list and an optional body regex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkCheck {
    pub url: String,
    #[serde(default = "default_status_codes")]
    pub expected_status_codes: Vec<u16>,
    #[serde(default, alias = "expected_response_pattern")]
    pub body_pattern: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Liveness and resource ceilings of one process, found by pid or name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessCheck {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default = "default_max_cpu_percent")]
    pub max_cpu_percent: f64,
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: f64,
}

/// Error and warning pattern counts over the tail of a log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogCheck {
    #[serde(alias = "log_file_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub error_patterns: Vec<String>,
    #[serde(default)]
    pub warning_patterns: Vec<String>,
    #[serde(default = "default_max_error_rate")]
    pub max_error_rate_per_minute: u32,
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
}

/// Delegates to an evaluator registered on the engine under `evaluator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCheck {
    pub evaluator: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_status_codes() -> Vec<u16> {
    vec![200]
}

fn default_max_cpu_percent() -> f64 {
    90.0
}

fn default_max_memory_mb() -> f64 {
    1024.0
}

fn default_max_error_rate() -> u32 {
    5
}

fn default_tail_lines() -> usize {
    1000
}

impl HealthCheckDefinition {
    pub fn new(name: &str, kind: CheckKind) -> Self {
        Self {
            name: name.to_string(),
            enabled: true,
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            tags: Tags::new(),
            kind,
        }
    }

    pub fn with_interval(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Rejects definitions the engine could never run: empty names, zero
    /// intervals or timeouts, and missing type-specific fields.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(HealthError::InvalidCheck("name is empty".to_string()));
        }
        if self.interval_secs == 0 {
            return Err(HealthError::InvalidCheck(format!(
                "{}: interval_secs must be positive",
                self.name
            )));
        }
        if self.timeout_secs == 0 {
            return Err(HealthError::InvalidCheck(format!(
                "{}: timeout_secs must be positive",
                self.name
            )));
        }
        match &self.kind {
            CheckKind::Network(n) if n.url.trim().is_empty() => Err(HealthError::InvalidCheck(
                format!("{}: url is empty", self.name),
            )),
            CheckKind::Log(l) if l.path.as_os_str().is_empty() => Err(HealthError::InvalidCheck(
                format!("{}: path is empty", self.name),
            )),
            CheckKind::Custom(c) if c.evaluator.trim().is_empty() => Err(
                HealthError::InvalidCheck(format!("{}: evaluator is empty", self.name)),
            ),
            _ => Ok(()),
        }
    }
}
