use crate::error::AlertError;
use chrono::Duration;
use pmon_common::types::{HealthCheckOutcome, Sample, SampleCategory, Severity, Tags};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    GreaterThan,
    LessThan,
    GreaterEqual,
    LessEqual,
    Equal,
    NotEqual,
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">" | "gt" | "greater_than" => Ok(Self::GreaterThan),
            "<" | "lt" | "less_than" => Ok(Self::LessThan),
            ">=" | "gte" | "greater_equal" => Ok(Self::GreaterEqual),
            "<=" | "lte" | "less_equal" => Ok(Self::LessEqual),
            "==" | "eq" | "equal" => Ok(Self::Equal),
            "!=" | "ne" | "not_equal" => Ok(Self::NotEqual),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for CompareOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbol = match self {
            Self::GreaterThan => ">",
            Self::LessThan => "<",
            Self::GreaterEqual => ">=",
            Self::LessEqual => "<=",
            Self::Equal => "==",
            Self::NotEqual => "!=",
        };
        f.write_str(symbol)
    }
}

impl CompareOp {
    pub fn check(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::GreaterThan => value > threshold,
            Self::LessThan => value < threshold,
            Self::GreaterEqual => value >= threshold,
            Self::LessEqual => value <= threshold,
            Self::Equal => (value - threshold).abs() < f64::EPSILON,
            Self::NotEqual => (value - threshold).abs() >= f64::EPSILON,
        }
    }
}

/// What a rule listens to: one sample category, or health-check outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleCategory {
    Sample(SampleCategory),
    HealthCheck,
}

impl FromStr for RuleCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "health_check" | "health" => Ok(Self::HealthCheck),
            other => other.parse().map(Self::Sample),
        }
    }
}

impl std::fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sample(category) => write!(f, "{category}"),
            Self::HealthCheck => f.write_str("health_check"),
        }
    }
}

/// A threshold rule over samples or health-check outcomes.
///
/// A `None` category matches every sample category but never health
/// outcomes; a `None` metric name matches every name (or every check).
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub enabled: bool,
    pub category: Option<RuleCategory>,
    pub metric_name: Option<String>,
    pub operator: CompareOp,
    pub threshold: f64,
    /// How long the condition must hold before an alert is raised; 0
    /// raises on the first breaching observation.
    pub duration_minutes: u32,
    /// Glob over the `project` tag; `*` matches every project.
    pub project_filter: Option<String>,
    pub tags_filter: Tags,
    pub notification_channels: Vec<String>,
    pub repeat_interval_minutes: u32,
    pub max_notifications: u32,
    /// 0 disables escalation.
    pub escalate_after_minutes: u32,
    pub escalation_channels: Vec<String>,
    /// 0 means manual resolution only.
    pub auto_resolve_after_minutes: u32,
}

impl AlertRule {
    pub fn new(name: &str, severity: Severity, operator: CompareOp, threshold: f64) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            severity,
            enabled: true,
            category: None,
            metric_name: None,
            operator,
            threshold,
            duration_minutes: 0,
            project_filter: None,
            tags_filter: Tags::new(),
            notification_channels: Vec::new(),
            repeat_interval_minutes: default_repeat_interval(),
            max_notifications: default_max_notifications(),
            escalate_after_minutes: 0,
            escalation_channels: Vec::new(),
            auto_resolve_after_minutes: 0,
        }
    }

    pub fn for_metric(mut self, category: SampleCategory, metric_name: &str) -> Self {
        self.category = Some(RuleCategory::Sample(category));
        self.metric_name = Some(metric_name.to_string());
        self
    }

    /// Targets health outcomes of `check`, or of every check when `None`.
    pub fn for_health_check(mut self, check: Option<&str>) -> Self {
        self.category = Some(RuleCategory::HealthCheck);
        self.metric_name = check.map(str::to_string);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_channels(mut self, channels: &[&str]) -> Self {
        self.notification_channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_repeat(mut self, minutes: u32, max_notifications: u32) -> Self {
        self.repeat_interval_minutes = minutes;
        self.max_notifications = max_notifications;
        self
    }

    pub fn with_duration(mut self, minutes: u32) -> Self {
        self.duration_minutes = minutes;
        self
    }

    pub fn with_escalation(mut self, after_minutes: u32, channels: &[&str]) -> Self {
        self.escalate_after_minutes = after_minutes;
        self.escalation_channels = channels.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_auto_resolve(mut self, minutes: u32) -> Self {
        self.auto_resolve_after_minutes = minutes;
        self
    }

    pub fn with_project_filter(mut self, pattern: &str) -> Self {
        self.project_filter = Some(pattern.to_string());
        self
    }

    pub fn with_tag_filter(mut self, key: &str, value: &str) -> Self {
        self.tags_filter.insert(key.to_string(), value.to_string());
        self
    }

    pub fn validate(&self) -> crate::error::Result<()> {
        if self.name.trim().is_empty() {
            return Err(AlertError::InvalidRule("name is empty".to_string()));
        }
        if !self.threshold.is_finite() {
            return Err(AlertError::InvalidRule(format!(
                "{}: threshold must be finite",
                self.name
            )));
        }
        Ok(())
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }

    /// Whether `sample` is in this rule's selector and scope. The threshold
    /// is tested separately with [`breached`](Self::breached).
    pub fn applies_to_sample(&self, sample: &Sample) -> bool {
        match self.category {
            Some(RuleCategory::HealthCheck) => return false,
            Some(RuleCategory::Sample(category)) if category != sample.category => return false,
            _ => {}
        }
        if self
            .metric_name
            .as_deref()
            .is_some_and(|name| name != sample.name)
        {
            return false;
        }
        self.scope_matches(&sample.tags)
    }

    pub fn applies_to_outcome(&self, outcome: &HealthCheckOutcome) -> bool {
        if self.category != Some(RuleCategory::HealthCheck) {
            return false;
        }
        if self
            .metric_name
            .as_deref()
            .is_some_and(|name| name != outcome.check_name)
        {
            return false;
        }
        self.scope_matches(&outcome.tags)
    }

    pub fn breached(&self, value: f64) -> bool {
        self.operator.check(value, self.threshold)
    }

    fn scope_matches(&self, tags: &Tags) -> bool {
        if let Some(pattern) = &self.project_filter {
            let Some(project) = tags.get("project") else {
                return false;
            };
            if pattern != "*" && !glob_match::glob_match(pattern, project) {
                return false;
            }
        }
        self.tags_filter
            .iter()
            .all(|(key, value)| tags.get(key) == Some(value))
    }
}

/// Serialized form of an [`AlertRule`], as found in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertRuleConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_severity")]
    pub severity: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, alias = "metric_type")]
    pub category: Option<String>,
    #[serde(default)]
    pub metric_name: Option<String>,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub duration_minutes: u32,
    #[serde(default)]
    pub project_filter: Option<String>,
    #[serde(default)]
    pub tags_filter: Tags,
    #[serde(default)]
    pub notification_channels: Vec<String>,
    #[serde(default = "default_repeat_interval")]
    pub repeat_interval_minutes: u32,
    #[serde(default = "default_max_notifications")]
    pub max_notifications: u32,
    #[serde(default)]
    pub escalate_after_minutes: u32,
    #[serde(default)]
    pub escalation_channels: Vec<String>,
    #[serde(default)]
    pub auto_resolve_after_minutes: u32,
}

fn default_severity() -> String {
    "warning".to_string()
}

fn default_true() -> bool {
    true
}

fn default_operator() -> String {
    ">".to_string()
}

fn default_repeat_interval() -> u32 {
    60
}

fn default_max_notifications() -> u32 {
    10
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<AlertRuleConfig> for AlertRule {
    type Error = AlertError;

    fn try_from(cfg: AlertRuleConfig) -> Result<Self, Self::Error> {
        let invalid = |e: String| AlertError::InvalidRule(format!("{}: {e}", cfg.name));
        let severity: Severity = cfg.severity.parse().map_err(invalid)?;
        let operator: CompareOp = cfg.operator.parse().map_err(invalid)?;
        let category = non_empty(cfg.category.clone())
            .map(|c| c.parse::<RuleCategory>())
            .transpose()
            .map_err(invalid)?;

        let rule = AlertRule {
            name: cfg.name,
            description: cfg.description,
            severity,
            enabled: cfg.enabled,
            category,
            metric_name: non_empty(cfg.metric_name),
            operator,
            threshold: cfg.threshold,
            duration_minutes: cfg.duration_minutes,
            project_filter: non_empty(cfg.project_filter),
            tags_filter: cfg.tags_filter,
            notification_channels: cfg.notification_channels,
            repeat_interval_minutes: cfg.repeat_interval_minutes,
            max_notifications: cfg.max_notifications,
            escalate_after_minutes: cfg.escalate_after_minutes,
            escalation_channels: cfg.escalation_channels,
            auto_resolve_after_minutes: cfg.auto_resolve_after_minutes,
        };
        rule.validate()?;
        Ok(rule)
    }
}

impl From<&AlertRule> for AlertRuleConfig {
    fn from(rule: &AlertRule) -> Self {
        Self {
            name: rule.name.clone(),
            description: rule.description.clone(),
            severity: rule.severity.to_string(),
            enabled: rule.enabled,
            category: rule.category.map(|c| c.to_string()),
            metric_name: rule.metric_name.clone(),
            operator: rule.operator.to_string(),
            threshold: rule.threshold,
            duration_minutes: rule.duration_minutes,
            project_filter: rule.project_filter.clone(),
            tags_filter: rule.tags_filter.clone(),
            notification_channels: rule.notification_channels.clone(),
            repeat_interval_minutes: rule.repeat_interval_minutes,
            max_notifications: rule.max_notifications,
            escalate_after_minutes: rule.escalate_after_minutes,
            escalation_channels: rule.escalation_channels.clone(),
            auto_resolve_after_minutes: rule.auto_resolve_after_minutes,
        }
    }
}
