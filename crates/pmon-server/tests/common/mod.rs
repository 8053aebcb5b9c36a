#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pmon_collector::project::ProjectSampler;
use pmon_collector::system::SystemSampler;
use pmon_collector::Collector;
use pmon_common::types::{Alert, HealthStatus, Sample, SampleCategory};
use pmon_health::{CustomEvaluator, CustomVerdict};
use pmon_notify::NotificationChannel;
use pmon_server::{MonitorConfig, MonitoringService};
use serde_json::Value;
use std::sync::{Arc, Mutex};

/// Reports a single host CPU reading that tests can change between ticks.
pub struct FixedCpu {
    value: Arc<Mutex<f64>>,
}

impl Collector for FixedCpu {
    fn name(&self) -> &str {
        "fixed-cpu"
    }

    fn collect(&mut self, now: DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
        let value = *self.value.lock().unwrap();
        Ok(vec![
            Sample::new(SampleCategory::System, "cpu_usage_percent", value, "percent").at(now),
        ])
    }
}

pub struct RecordingChannel {
    name: String,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingChannel {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            sent: Mutex::new(Vec::new()),
        })
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|(_, m)| m.clone()).collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, alert: &Alert, message: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((alert.id.clone(), message.to_string()));
        Ok(())
    }
}

/// A service whose host sampler only reports `cpu`.
pub fn service_with_cpu(cpu: Arc<Mutex<f64>>) -> MonitoringService {
    let system = SystemSampler::with_collectors(vec![Box::new(FixedCpu { value: cpu })]);
    MonitoringService::with_samplers(&MonitorConfig::default(), system, ProjectSampler::new())
}

/// Custom evaluator answering with `params["status"]`.
pub fn fixed_status() -> Arc<dyn CustomEvaluator> {
    Arc::new(|params: &Value| -> anyhow::Result<CustomVerdict> {
        let status: HealthStatus = serde_json::from_value(params["status"].clone())?;
        Ok(CustomVerdict::new(status, "fixed"))
    })
}
