use crate::channels::chat::severity_color;
use crate::channels::email::EmailChannel;
use crate::channels::webhook::payload;
use crate::error::NotifyError;
use crate::plugin::ChannelRegistry;
use chrono::Utc;
use pmon_common::types::{Alert, AlertStatus, Severity, Tags};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn sample_alert() -> Alert {
    let now = Utc::now();
    let mut tags = Tags::new();
    tags.insert("project".to_string(), "api".to_string());
    Alert {
        id: "42".to_string(),
        key: "cpu-high:api".to_string(),
        rule_name: "cpu-high".to_string(),
        severity: Severity::Critical,
        status: AlertStatus::Active,
        title: "cpu-high: cpu_percent = 95".to_string(),
        description: "CPU above 90%".to_string(),
        triggered_at: now,
        metric_value: Some(95.0),
        threshold_value: Some(90.0),
        project: Some("api".to_string()),
        tags,
        acknowledged_at: None,
        acknowledged_by: None,
        resolved_at: None,
        resolved_by: None,
        resolution_message: None,
        last_notified_at: None,
        notification_count: 0,
        escalated: false,
        updated_at: now,
    }
}

/// Minimal HTTP/1.1 responder: answers every request with `status` and
/// records request bodies.
async fn spawn_http_stub(status: u16) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let recorded = bodies.clone();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap_or(0);
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf).to_string();
                    if let Some(header_end) = text.find("\r\n\r\n") {
                        let content_length = text[..header_end]
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if buf.len() >= header_end + 4 + content_length {
                            let body = String::from_utf8_lossy(&buf[header_end + 4..]).to_string();
                            recorded.lock().unwrap().push(body);
                            break;
                        }
                    }
                }
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    (format!("http://{addr}/hook"), bodies)
}

#[test]
fn registry_has_builtin_plugins() {
    let registry = ChannelRegistry::default();
    assert_eq!(registry.plugin_names(), vec!["chat", "email", "webhook"]);
}

#[test]
fn registry_rejects_unknown_type() {
    let registry = ChannelRegistry::default();
    let result = registry.create_channel("pager", "p1", &json!({}));
    assert!(matches!(result, Err(NotifyError::UnknownChannelType(t)) if t == "pager"));
}

#[test]
fn webhook_config_validation() {
    let registry = ChannelRegistry::default();
    let plugin = registry.get_plugin("webhook").unwrap();
    assert!(plugin.validate_config(&json!({ "url": "http://x/hook" })).is_ok());
    assert!(plugin
        .validate_config(&json!({ "url": "http://x/hook", "method": "put" }))
        .is_ok());
    assert!(plugin
        .validate_config(&json!({ "url": "http://x/hook", "method": "GET" }))
        .is_err());
    assert!(plugin.validate_config(&json!({ "url": "  " })).is_err());
    assert!(plugin.validate_config(&json!({})).is_err());
}

#[test]
fn email_config_requires_recipients() {
    let registry = ChannelRegistry::default();
    let plugin = registry.get_plugin("email").unwrap();
    assert!(plugin
        .validate_config(&json!({ "smtp_host": "localhost", "to_addresses": [] }))
        .is_err());
    assert!(plugin
        .validate_config(&json!({ "smtp_server": "localhost", "to_addresses": ["ops@example.com"] }))
        .is_ok());
}

#[test]
fn email_invalid_address_fails_at_creation() {
    let registry = ChannelRegistry::default();
    let result = registry.create_channel(
        "email",
        "ops-mail",
        &json!({ "smtp_host": "localhost", "security": "none", "to_addresses": ["not an address"] }),
    );
    assert!(matches!(result, Err(NotifyError::InvalidConfig(_))));
}

#[test]
fn email_subject_carries_severity() {
    let alert = sample_alert();
    assert_eq!(EmailChannel::subject(&alert), "[CRITICAL] cpu-high: cpu_percent = 95");
}

#[test]
fn chat_config_is_redacted() {
    let registry = ChannelRegistry::default();
    let plugin = registry.get_plugin("chat").unwrap();
    let redacted = plugin.redact_config(&json!({ "webhook_url": "https://hooks.slack.com/T/B/X" }));
    assert_eq!(redacted["webhook_url"], "***");
}

#[test]
fn webhook_payload_fields() {
    let alert = sample_alert();
    let body = payload(&alert, "Alert triggered");
    assert_eq!(body["alert_id"], "42");
    assert_eq!(body["severity"], "critical");
    assert_eq!(body["status"], "active");
    assert_eq!(body["project_name"], "api");
    assert_eq!(body["metric_value"], 95.0);
    assert_eq!(body["message"], "Alert triggered");
    assert_eq!(body["tags"]["project"], "api");
}

#[test]
fn chat_colors_follow_severity() {
    assert_eq!(severity_color(Severity::Critical), "#FF0000");
    assert_eq!(severity_color(Severity::Warning), "#FFA500");
    assert_eq!(severity_color(Severity::Info), "#36A64F");
}

#[tokio::test]
async fn webhook_send_reports_success() {
    let (url, bodies) = spawn_http_stub(200).await;
    let registry = ChannelRegistry::default();
    let channel = registry
        .create_channel("webhook", "ops-hook", &json!({ "url": url }))
        .unwrap();

    assert!(channel.send(&sample_alert(), "Alert triggered").await);
    let bodies = bodies.lock().unwrap();
    assert_eq!(bodies.len(), 1);
    let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(sent["rule_name"], "cpu-high");
}

#[tokio::test]
async fn webhook_send_retries_then_fails() {
    let (url, bodies) = spawn_http_stub(500).await;
    let registry = ChannelRegistry::default();
    let channel = registry
        .create_channel("webhook", "ops-hook", &json!({ "url": url }))
        .unwrap();

    assert!(!channel.send(&sample_alert(), "Alert triggered").await);
    assert_eq!(bodies.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn chat_send_posts_attachment() {
    let (url, bodies) = spawn_http_stub(200).await;
    let registry = ChannelRegistry::default();
    let channel = registry
        .create_channel("chat", "ops-chat", &json!({ "webhook_url": url }))
        .unwrap();

    assert!(channel.send(&sample_alert(), "Alert triggered").await);
    let bodies = bodies.lock().unwrap();
    let sent: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(sent["attachments"][0]["color"], "#FF0000");
    assert_eq!(sent["attachments"][0]["fields"][2]["value"], "api");
}

#[tokio::test]
async fn unreachable_webhook_reports_failure() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let registry = ChannelRegistry::default();
    let channel = registry
        .create_channel(
            "webhook",
            "dead-hook",
            &json!({ "url": format!("http://{addr}/hook"), "timeout_secs": 1 }),
        )
        .unwrap();
    assert!(!channel.send(&sample_alert(), "Alert triggered").await);
}
