use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::NotificationChannel;
use async_trait::async_trait;
use pmon_common::types::Alert;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Posts a JSON document describing the alert to an arbitrary URL.
pub struct WebhookChannel {
    name: String,
    client: reqwest::Client,
    config: WebhookConfig,
}

impl WebhookChannel {
    pub fn new(name: &str, config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            name: name.to_string(),
            client,
            config,
        })
    }

    /// JSON payload sent for `alert`, or the rendered `body_template`.
    pub fn render_body(&self, alert: &Alert, message: &str) -> String {
        match &self.config.body_template {
            Some(template) => template
                .replace("{{alert_id}}", &alert.id)
                .replace("{{rule_name}}", &alert.rule_name)
                .replace("{{severity}}", &alert.severity.to_string())
                .replace("{{status}}", &alert.status.to_string())
                .replace("{{title}}", &alert.title)
                .replace("{{project}}", alert.project.as_deref().unwrap_or(""))
                .replace(
                    "{{value}}",
                    &alert.metric_value.map(|v| format!("{v:.2}")).unwrap_or_default(),
                )
                .replace("{{triggered_at}}", &alert.triggered_at.to_rfc3339())
                .replace("{{message}}", message),
            None => payload(alert, message).to_string(),
        }
    }
}

pub(crate) fn payload(alert: &Alert, message: &str) -> Value {
    serde_json::json!({
        "alert_id": alert.id,
        "rule_name": alert.rule_name,
        "severity": alert.severity.to_string(),
        "status": alert.status.to_string(),
        "title": alert.title,
        "description": alert.description,
        "triggered_at": alert.triggered_at.to_rfc3339(),
        "metric_value": alert.metric_value,
        "threshold_value": alert.threshold_value,
        "project_name": alert.project,
        "tags": alert.tags,
        "message": message,
        "notification_count": alert.notification_count,
    })
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert, message: &str) -> anyhow::Result<()> {
        let body = self.render_body(alert, message);
        let mut request = match self.config.method {
            HttpMethod::Post => self.client.post(&self.config.url),
            HttpMethod::Put => self.client.put(&self.config.url),
        };
        let has_content_type = self
            .config
            .headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            request = request.header("Content-Type", "application/json");
        }
        for (key, value) in &self.config.headers {
            request = request.header(key.as_str(), value.as_str());
        }
        super::send_with_retry(request.body(body), &self.name).await
    }
}

// Plugin

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    #[serde(alias = "post")]
    Post,
    #[serde(alias = "put")]
    Put,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub body_template: Option<String>,
}

fn default_timeout_secs() -> u64 {
    10
}

fn parse_config(config: &Value) -> Result<WebhookConfig> {
    let cfg: WebhookConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("webhook: {e}")))?;
    if cfg.url.trim().is_empty() {
        return Err(NotifyError::InvalidConfig("webhook: url is empty".to_string()));
    }
    Ok(cfg)
}

pub struct WebhookPlugin;

impl ChannelPlugin for WebhookPlugin {
    fn name(&self) -> &str {
        "webhook"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, instance_name: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(WebhookChannel::new(instance_name, cfg)?))
    }
}
