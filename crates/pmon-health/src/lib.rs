//! Scheduled health probes.
//!
//! A [`HealthCheckDefinition`](definition::HealthCheckDefinition) names one
//! network, process, log or custom check together with its interval and
//! timeout. The [`HealthProbeEngine`](engine::HealthProbeEngine) runs due
//! checks concurrently, keeps a bounded outcome history per check and
//! reports every outcome to the store and to registered listeners.

pub mod checks;
pub mod definition;
pub mod engine;
pub mod error;

pub use checks::custom::{CustomEvaluator, CustomVerdict};
pub use engine::{HealthProbeEngine, ProbeSettings};
