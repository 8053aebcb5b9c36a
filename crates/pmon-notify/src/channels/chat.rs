use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::NotificationChannel;
use async_trait::async_trait;
use pmon_common::types::{Alert, Severity};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Chat-room webhook using the Slack incoming-webhook attachment format,
/// which Mattermost and Rocket.Chat accept as well.
pub struct ChatWebhookChannel {
    name: String,
    client: reqwest::Client,
    webhook_url: String,
    username: Option<String>,
}

impl ChatWebhookChannel {
    pub fn new(name: &str, webhook_url: &str, username: Option<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            name: name.to_string(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
            webhook_url: webhook_url.to_string(),
            username,
        })
    }

    pub fn payload(&self, alert: &Alert, message: &str) -> Value {
        let mut fields = vec![
            field("Status", &alert.status.to_string()),
            field(
                "Triggered",
                &alert.triggered_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            ),
        ];
        if let Some(project) = &alert.project {
            fields.push(field("Project", project));
        }
        if let Some(value) = alert.metric_value {
            fields.push(field("Current Value", &value.to_string()));
        }

        let text = if alert.description.is_empty() {
            message.to_string()
        } else {
            format!("{}\n{}", alert.description, message)
        };

        let mut payload = serde_json::json!({
            "attachments": [{
                "color": severity_color(alert.severity),
                "title": format!("{}: {}", alert.severity.to_string().to_uppercase(), alert.title),
                "text": text,
                "fields": fields,
                "footer": "pmon alerting",
                "ts": alert.triggered_at.timestamp(),
            }]
        });
        if let (Some(username), Some(obj)) = (&self.username, payload.as_object_mut()) {
            obj.insert("username".to_string(), Value::String(username.clone()));
        }
        payload
    }
}

fn field(title: &str, value: &str) -> Value {
    serde_json::json!({ "title": title, "value": value, "short": true })
}

pub fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Critical => "#FF0000",
        Severity::Warning => "#FFA500",
        Severity::Info => "#36A64F",
    }
}

#[async_trait]
impl NotificationChannel for ChatWebhookChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "chat"
    }

    async fn deliver(&self, alert: &Alert, message: &str) -> anyhow::Result<()> {
        let payload = self.payload(alert, message);
        let request = self.client.post(&self.webhook_url).json(&payload);
        super::send_with_retry(request, &self.name).await
    }
}

// Plugin

#[derive(Deserialize)]
struct ChatConfig {
    webhook_url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

fn parse_config(config: &Value) -> Result<ChatConfig> {
    let cfg: ChatConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("chat: {e}")))?;
    if cfg.webhook_url.trim().is_empty() {
        return Err(NotifyError::InvalidConfig("chat: webhook_url is empty".to_string()));
    }
    Ok(cfg)
}

pub struct ChatPlugin;

impl ChannelPlugin for ChatPlugin {
    fn name(&self) -> &str {
        "chat"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, instance_name: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(ChatWebhookChannel::new(
            instance_name,
            &cfg.webhook_url,
            cfg.username,
            Duration::from_secs(cfg.timeout_secs),
        )?))
    }

    fn redact_config(&self, config: &Value) -> Value {
        let mut redacted = config.clone();
        if let Some(obj) = redacted.as_object_mut() {
            if obj.contains_key("webhook_url") {
                obj.insert("webhook_url".to_string(), Value::String("***".to_string()));
            }
        }
        redacted
    }
}
