use crate::error::{Result, StorageError};
use crate::retention::{CleanupStats, RetentionPolicy};
use crate::{MonitorStore, SampleQuery};
use chrono::{DateTime, Utc};
use pmon_common::types::{Alert, HealthCheckOutcome, Sample, SampleKey};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Bounded in-memory [`MonitorStore`].
///
/// Each class of data is capped at `capacity` entries; the oldest entry is
/// evicted first. Open alerts are never evicted by the cap.
pub struct MemoryStore {
    capacity: usize,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    samples: VecDeque<Sample>,
    sample_keys: HashSet<SampleKey>,
    outcomes: VecDeque<HealthCheckOutcome>,
    alerts: HashMap<String, Alert>,
}

impl MemoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StorageError::LockPoisoned)
    }

    pub fn sample_count(&self) -> usize {
        self.lock().map(|inner| inner.samples.len()).unwrap_or(0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(100_000)
    }
}

impl MonitorStore for MemoryStore {
    fn write_samples(&self, samples: &[Sample]) -> Result<()> {
        let mut inner = self.lock()?;
        for sample in samples {
            if !inner.sample_keys.insert(sample.key()) {
                continue;
            }
            inner.samples.push_back(sample.clone());
            while inner.samples.len() > self.capacity {
                if let Some(evicted) = inner.samples.pop_front() {
                    inner.sample_keys.remove(&evicted.key());
                }
            }
        }
        Ok(())
    }

    fn query_samples(&self, query: &SampleQuery) -> Result<Vec<Sample>> {
        if query.from > query.to {
            return Err(StorageError::InvalidQuery(format!(
                "from ({}) is after to ({})",
                query.from, query.to
            )));
        }
        let inner = self.lock()?;
        let mut matched: Vec<Sample> = inner
            .samples
            .iter()
            .filter(|s| query.matches(s))
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.timestamp);
        if let Some(limit) = query.limit {
            let skip = matched.len().saturating_sub(limit);
            matched.drain(..skip);
        }
        Ok(matched)
    }

    fn latest_samples(&self, since: DateTime<Utc>) -> Result<Vec<Sample>> {
        let inner = self.lock()?;
        let mut latest: HashMap<(String, String, String), &Sample> = HashMap::new();
        for sample in inner.samples.iter().filter(|s| s.timestamp >= since) {
            let (category, name, _, tags) = sample.key();
            let series = (category.to_string(), name, tags);
            match latest.get(&series) {
                Some(existing) if existing.timestamp >= sample.timestamp => {}
                _ => {
                    latest.insert(series, sample);
                }
            }
        }
        let mut out: Vec<Sample> = latest.into_values().cloned().collect();
        out.sort_by(|a, b| {
            (a.category, &a.name, &a.tags).cmp(&(b.category, &b.name, &b.tags))
        });
        Ok(out)
    }

    fn write_outcome(&self, outcome: &HealthCheckOutcome) -> Result<()> {
        let mut inner = self.lock()?;
        inner.outcomes.push_back(outcome.clone());
        while inner.outcomes.len() > self.capacity {
            inner.outcomes.pop_front();
        }
        Ok(())
    }

    fn query_outcomes(&self, check_name: &str, from: DateTime<Utc>) -> Result<Vec<HealthCheckOutcome>> {
        let inner = self.lock()?;
        Ok(inner
            .outcomes
            .iter()
            .filter(|o| o.check_name == check_name && o.timestamp >= from)
            .cloned()
            .collect())
    }

    fn upsert_alert(&self, alert: &Alert) -> Result<()> {
        let mut inner = self.lock()?;
        inner.alerts.insert(alert.id.clone(), alert.clone());
        if inner.alerts.len() > self.capacity {
            let oldest_resolved = inner
                .alerts
                .values()
                .filter(|a| !a.is_open())
                .min_by_key(|a| a.triggered_at)
                .map(|a| a.id.clone());
            if let Some(id) = oldest_resolved {
                inner.alerts.remove(&id);
            }
        }
        Ok(())
    }

    fn query_alerts(&self, from: DateTime<Utc>) -> Result<Vec<Alert>> {
        let inner = self.lock()?;
        let mut alerts: Vec<Alert> = inner
            .alerts
            .values()
            .filter(|a| a.triggered_at >= from)
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.triggered_at.cmp(&a.triggered_at));
        Ok(alerts)
    }

    fn cleanup(&self, policy: &RetentionPolicy, now: DateTime<Utc>) -> Result<CleanupStats> {
        let mut inner = self.lock()?;
        let mut stats = CleanupStats::default();

        if let Some(cutoff) = policy.sample_cutoff(now) {
            let before = inner.samples.len();
            let Inner {
                samples,
                sample_keys,
                ..
            } = &mut *inner;
            samples.retain(|s| {
                let keep = s.timestamp >= cutoff;
                if !keep {
                    sample_keys.remove(&s.key());
                }
                keep
            });
            stats.samples_deleted = before - inner.samples.len();
        }

        if let Some(cutoff) = policy.alert_cutoff(now) {
            let before = inner.alerts.len();
            inner
                .alerts
                .retain(|_, a| a.is_open() || a.resolved_at.map_or(true, |r| r >= cutoff));
            stats.alerts_deleted = before - inner.alerts.len();
        }

        if let Some(cutoff) = policy.outcome_cutoff(now) {
            let before = inner.outcomes.len();
            inner.outcomes.retain(|o| o.timestamp >= cutoff);
            stats.outcomes_deleted = before - inner.outcomes.len();
        }

        tracing::info!(
            samples = stats.samples_deleted,
            alerts = stats.alerts_deleted,
            outcomes = stats.outcomes_deleted,
            "Retention cleanup completed"
        );
        Ok(stats)
    }
}
