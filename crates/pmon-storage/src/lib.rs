//! Durability layer for samples, health-check outcomes and alerts.
//!
//! The monitoring components keep their working state in memory; the
//! [`MonitorStore`] only receives copies for history queries and export.
//! [`memory::MemoryStore`] is the bundled bounded implementation.

pub mod error;
pub mod memory;
pub mod retention;


use chrono::{DateTime, Utc};
use error::Result;
use pmon_common::types::{Alert, HealthCheckOutcome, Sample, SampleCategory, Tags};
use retention::{CleanupStats, RetentionPolicy};

/// Filter for a time-range sample query.
///
/// Empty `tags` matches every sample; otherwise each listed tag must be
/// present with the same value.
///
/// # Examples
///
/// ```
/// use pmon_storage::SampleQuery;
/// use pmon_common::types::SampleCategory;
/// use chrono::{Duration, Utc};
///
/// let now = Utc::now();
/// let query = SampleQuery::range(now - Duration::hours(1), now)
///     .category(SampleCategory::Project)
///     .name("cpu_percent")
///     .tag("project", "api");
/// assert_eq!(query.name.as_deref(), Some("cpu_percent"));
/// ```
#[derive(Debug, Clone)]
pub struct SampleQuery {
    pub category: Option<SampleCategory>,
    pub name: Option<String>,
    pub tags: Tags,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub limit: Option<usize>,
}

impl SampleQuery {
    pub fn range(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            category: None,
            name: None,
            tags: Tags::new(),
            from,
            to,
            limit: None,
        }
    }

    pub fn category(mut self, category: SampleCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, sample: &Sample) -> bool {
        if sample.timestamp < self.from || sample.timestamp > self.to {
            return false;
        }
        if self.category.is_some_and(|c| c != sample.category) {
            return false;
        }
        if self.name.as_deref().is_some_and(|n| n != sample.name) {
            return false;
        }
        self.tags
            .iter()
            .all(|(k, v)| sample.tags.get(k).is_some_and(|actual| actual == v))
    }
}

/// Persistence backend shared by all monitoring components.
///
/// Implementations must be `Send + Sync`: samplers, the probe engine and
/// the alert engine write from their own loops while the query facade
/// reads concurrently.
pub trait MonitorStore: Send + Sync {
    /// Appends samples. A sample whose key is already stored is ignored.
    fn write_samples(&self, samples: &[Sample]) -> Result<()>;

    /// Samples matching `query`, oldest first.
    fn query_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>>;

    /// The newest sample per (category, name, tags) not older than `since`.
    fn latest_samples(&self, since: DateTime<Utc>) -> Result<Vec<Sample>>;

    fn write_outcome(&self, outcome: &HealthCheckOutcome) -> Result<()>;

    /// Outcomes for `check_name` newer than `from`, oldest first.
    fn query_outcomes(&self, check_name: &str, from: DateTime<Utc>) -> Result<Vec<HealthCheckOutcome>>;

    /// Inserts the alert or replaces the stored copy with the same id.
    fn upsert_alert(&self, alert: &Alert) -> Result<()>;

    /// Alerts triggered at or after `from`, newest first.
    fn query_alerts(&self, from: DateTime<Utc>) -> Result<Vec<Alert>>;

    /// Deletes data older than the policy allows.
    fn cleanup(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<CleanupStats>;
}
