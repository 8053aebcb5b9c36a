use crate::error::{NotifyError, Result};
use crate::plugin::ChannelPlugin;
use crate::utils::render_plain;
use crate::NotificationChannel;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use pmon_common::types::Alert;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

pub struct EmailChannel {
    name: String,
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl EmailChannel {
    fn new(name: &str, cfg: &EmailConfig) -> Result<Self> {
        let mut builder = match cfg.security {
            SmtpSecurity::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(&cfg.smtp_host)
                .map_err(|e| NotifyError::SmtpError(e.to_string()))?,
            SmtpSecurity::Starttls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&cfg.smtp_host)
                    .map_err(|e| NotifyError::SmtpError(e.to_string()))?
            }
            SmtpSecurity::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&cfg.smtp_host),
        }
        .port(cfg.smtp_port)
        .timeout(Some(Duration::from_secs(cfg.timeout_secs)));

        if let (Some(user), Some(pass)) = (&cfg.username, &cfg.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        let from = cfg
            .from_address
            .parse::<Mailbox>()
            .map_err(|e| NotifyError::InvalidConfig(format!("email: from_address: {e}")))?;
        let to = cfg
            .to_addresses
            .iter()
            .map(|addr| {
                addr.parse::<Mailbox>()
                    .map_err(|e| NotifyError::InvalidConfig(format!("email: to_addresses: {addr}: {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            transport: builder.build(),
            from,
            to,
        })
    }

    pub fn subject(alert: &Alert) -> String {
        format!(
            "[{}] {}",
            alert.severity.to_string().to_uppercase(),
            alert.title
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn channel_type(&self) -> &str {
        "email"
    }

    async fn deliver(&self, alert: &Alert, message: &str) -> anyhow::Result<()> {
        if self.to.is_empty() {
            anyhow::bail!("no recipients configured");
        }
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(Self::subject(alert))
            .header(ContentType::TEXT_PLAIN);
        for mailbox in &self.to {
            builder = builder.to(mailbox.clone());
        }
        let email = builder.body(render_plain(alert, message))?;
        self.transport.send(email).await?;
        Ok(())
    }
}

// Plugin

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SmtpSecurity {
    Tls,
    #[default]
    Starttls,
    None,
}

#[derive(Deserialize)]
struct EmailConfig {
    #[serde(alias = "smtp_server")]
    smtp_host: String,
    #[serde(default = "default_smtp_port")]
    smtp_port: u16,
    #[serde(default)]
    security: SmtpSecurity,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    #[serde(default = "default_from_address")]
    from_address: String,
    #[serde(default)]
    to_addresses: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_from_address() -> String {
    "alerts@pmon.local".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn parse_config(config: &Value) -> Result<EmailConfig> {
    let cfg: EmailConfig = serde_json::from_value(config.clone())
        .map_err(|e| NotifyError::InvalidConfig(format!("email: {e}")))?;
    if cfg.to_addresses.is_empty() {
        return Err(NotifyError::InvalidConfig(
            "email: to_addresses must not be empty".to_string(),
        ));
    }
    Ok(cfg)
}

pub struct EmailPlugin;

impl ChannelPlugin for EmailPlugin {
    fn name(&self) -> &str {
        "email"
    }

    fn validate_config(&self, config: &Value) -> Result<()> {
        parse_config(config).map(|_| ())
    }

    fn create_channel(&self, instance_name: &str, config: &Value) -> Result<Box<dyn NotificationChannel>> {
        let cfg = parse_config(config)?;
        Ok(Box::new(EmailChannel::new(instance_name, &cfg)?))
    }
}
