use crate::types::{HealthCheckOutcome, Sample};
use async_trait::async_trait;

/// Receives every batch a sampler produces, after it has been persisted.
///
/// Listeners run on the producing loop; a slow listener delays the next
/// collection of that sampler only.
#[async_trait]
pub trait SampleListener: Send + Sync {
    async fn on_samples(&self, samples: &[Sample]);
}

/// Receives every health-check outcome after it has been stored.
#[async_trait]
pub trait OutcomeListener: Send + Sync {
    async fn on_outcome(&self, outcome: &HealthCheckOutcome);
}
