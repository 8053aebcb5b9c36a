use super::outcome;
use crate::definition::CustomCheck;
use anyhow::Result;
use async_trait::async_trait;
use pmon_common::types::{HealthCheckOutcome, HealthStatus};
use serde_json::Value;
use std::collections::BTreeMap;

/// What a custom evaluator concluded.
#[derive(Debug, Clone, PartialEq)]
pub struct CustomVerdict {
    pub status: HealthStatus,
    pub message: String,
    pub details: BTreeMap<String, Value>,
}

impl CustomVerdict {
    pub fn new(status: HealthStatus, message: &str) -> Self {
        Self {
            status,
            message: message.to_string(),
            details: BTreeMap::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

impl From<bool> for CustomVerdict {
    fn from(passed: bool) -> Self {
        if passed {
            Self::new(HealthStatus::Healthy, "Custom check passed")
        } else {
            Self::new(HealthStatus::Unhealthy, "Custom check failed")
        }
    }
}

/// Application-supplied check logic, registered on the engine by name and
/// referenced from `custom` check definitions.
#[async_trait]
pub trait CustomEvaluator: Send + Sync {
    async fn evaluate(&self, params: &Value) -> Result<CustomVerdict>;
}

#[async_trait]
impl<F> CustomEvaluator for F
where
    F: Fn(&Value) -> Result<CustomVerdict> + Send + Sync,
{
    async fn evaluate(&self, params: &Value) -> Result<CustomVerdict> {
        self(params)
    }
}

pub async fn run(
    name: &str,
    check: &CustomCheck,
    evaluator: Option<&dyn CustomEvaluator>,
) -> HealthCheckOutcome {
    let Some(evaluator) = evaluator else {
        return outcome(
            name,
            HealthStatus::Unknown,
            format!("No evaluator registered: {}", check.evaluator),
        );
    };
    match evaluator.evaluate(&check.params).await {
        Ok(verdict) => {
            let mut result = outcome(name, verdict.status, verdict.message);
            result.details = verdict.details;
            result
        }
        Err(e) => outcome(name, HealthStatus::Unknown, format!("Custom check failed: {e}")),
    }
}
