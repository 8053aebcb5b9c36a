use pmon_alert::AlertRuleConfig;
use pmon_health::definition::HealthCheckDefinition;
use pmon_storage::retention::RetentionPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level server configuration. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub system: SystemConfig,
    #[serde(default)]
    pub projects: ProjectsConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    #[serde(default)]
    pub rules: Vec<AlertRuleConfig>,
    #[serde(default)]
    pub health_checks: Vec<HealthCheckDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_system_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_system_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectsConfig {
    #[serde(default = "default_project_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_project_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ProjectsConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_project_interval_secs(),
            history_limit: default_project_history_limit(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_health_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_health_tick_secs(),
            history_limit: default_health_history_limit(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default = "default_alert_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_alert_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_alert_tick_secs(),
            history_limit: default_alert_history_limit(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(flatten)]
    pub policy: RetentionPolicy,
    /// Hours between cleanup runs.
    #[serde(default = "default_cleanup_interval_hours")]
    pub interval_hours: u64,
    /// Maximum samples kept by the in-memory store.
    #[serde(default = "default_store_capacity")]
    pub store_capacity: usize,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            policy: RetentionPolicy::default(),
            interval_hours: default_cleanup_interval_hours(),
            store_capacity: default_store_capacity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

/// One configured notification channel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub channel_type: String,
    #[serde(default = "empty_object")]
    pub config: serde_json::Value,
}

fn default_system_interval_secs() -> u64 {
    30
}

fn default_project_interval_secs() -> u64 {
    15
}

fn default_project_history_limit() -> usize {
    1000
}

fn default_probe_timeout_secs() -> u64 {
    10
}

fn default_health_tick_secs() -> u64 {
    1
}

fn default_health_history_limit() -> usize {
    100
}

fn default_max_concurrent() -> usize {
    8
}

fn default_alert_tick_secs() -> u64 {
    10
}

fn default_alert_history_limit() -> usize {
    1000
}

fn default_send_timeout_secs() -> u64 {
    30
}

fn default_cleanup_interval_hours() -> u64 {
    24
}

fn default_store_capacity() -> usize {
    100_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl MonitorConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn system_interval(&self) -> Duration {
        Duration::from_secs(self.system.interval_secs.max(1))
    }

    pub fn project_interval(&self) -> Duration {
        Duration::from_secs(self.projects.interval_secs.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.retention.interval_hours.max(1) * 3600)
    }
}
