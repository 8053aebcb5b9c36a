use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// One entry of a project's application log.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub message: String,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, level: &str, message: &str) -> Self {
        Self {
            timestamp,
            level: level.to_string(),
            message: message.to_string(),
        }
    }

    /// `ERROR` and `CRITICAL` entries, case-insensitively.
    pub fn is_error(&self) -> bool {
        self.level.eq_ignore_ascii_case("error") || self.level.eq_ignore_ascii_case("critical")
    }
}

/// External log store the project sampler derives log-rate and error
/// metrics from.
#[async_trait]
pub trait LogSource: Send + Sync {
    /// Entries of `project_id` with `timestamp >= since`.
    async fn entries_since(&self, project_id: i64, since: DateTime<Utc>) -> Result<Vec<LogEntry>>;

    /// The newest error entry of `project_id`, if any.
    async fn latest_error(&self, project_id: i64) -> Result<Option<LogEntry>>;
}
