use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long each class of data is kept. A value of zero disables cleanup
/// for that class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    #[serde(default = "default_metrics_days")]
    pub metrics_days: u32,
    #[serde(default = "default_alerts_days")]
    pub alerts_days: u32,
    #[serde(default = "default_health_hours")]
    pub health_hours: u32,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            metrics_days: default_metrics_days(),
            alerts_days: default_alerts_days(),
            health_hours: default_health_hours(),
        }
    }
}

fn default_metrics_days() -> u32 {
    30
}

fn default_alerts_days() -> u32 {
    90
}

fn default_health_hours() -> u32 {
    168
}

impl RetentionPolicy {
    pub fn sample_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.metrics_days > 0).then(|| now - Duration::days(i64::from(self.metrics_days)))
    }

    /// Resolved alerts whose resolution is older than this are deleted.
    pub fn alert_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.alerts_days > 0).then(|| now - Duration::days(i64::from(self.alerts_days)))
    }

    pub fn outcome_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.health_hours > 0).then(|| now - Duration::hours(i64::from(self.health_hours)))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupStats {
    pub samples_deleted: usize,
    pub alerts_deleted: usize,
    pub outcomes_deleted: usize,
}
