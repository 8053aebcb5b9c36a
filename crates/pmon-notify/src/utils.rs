//! Helpers shared by the notification channels.

use pmon_common::types::{format_tags, Alert};
use serde_json::Value;

/// Maximum length of a response body quoted in an error message.
pub const MAX_BODY_LENGTH: usize = 500;

/// Truncates `s` to at most `max_len` bytes on a char boundary.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &s[..end])
}

/// Plain-text rendering of an alert used by mail and as webhook fallback.
pub fn render_plain(alert: &Alert, message: &str) -> String {
    let mut lines = vec![
        format!("Alert: {}", alert.title),
        format!("Severity: {}", alert.severity.to_string().to_uppercase()),
        format!("Status: {}", alert.status),
        format!(
            "Triggered: {}",
            alert.triggered_at.format("%Y-%m-%d %H:%M:%S UTC")
        ),
    ];
    if let Some(project) = &alert.project {
        lines.push(format!("Project: {project}"));
    }
    if let Some(value) = alert.metric_value {
        lines.push(format!("Current Value: {value}"));
    }
    if let Some(threshold) = alert.threshold_value {
        lines.push(format!("Threshold: {threshold}"));
    }
    if !alert.tags.is_empty() {
        lines.push(format!("Tags: {}", format_tags(&alert.tags)));
    }
    if !alert.description.is_empty() {
        lines.push(String::new());
        lines.push(alert.description.clone());
    }
    lines.push(String::new());
    lines.push(message.to_string());
    lines.join("\n")
}

/// Redact sensitive fields from JSON configuration.
///
/// Keys containing `password`, `passwd`, `pwd`, `token`, `secret`,
/// `api_key`, `apikey` or `credentials` have their values replaced.
pub fn redact_sensitive_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let key_lower = key.to_lowercase();
                let is_sensitive = ["password", "passwd", "pwd", "token", "secret", "api_key", "apikey", "credentials"]
                    .iter()
                    .any(|needle| key_lower.contains(needle));

                if is_sensitive {
                    redacted.insert(key.clone(), Value::String("***".to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_json(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(redact_sensitive_json).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("hello", 10), "hello");
        assert_eq!(truncate_string("hello world", 5), "hello... [truncated]");
    }

    #[test]
    fn test_truncate_string_respects_char_boundary() {
        assert_eq!(truncate_string("héllo", 2), "h... [truncated]");
    }

    #[test]
    fn test_redact_nested() {
        let config = serde_json::json!({
            "url": "https://hooks.example.com",
            "headers": { "Authorization-Token": "abc", "X-Env": "prod" },
            "smtp_password": "hunter2"
        });
        let redacted = redact_sensitive_json(&config);
        assert_eq!(redacted["url"], "https://hooks.example.com");
        assert_eq!(redacted["headers"]["Authorization-Token"], "***");
        assert_eq!(redacted["headers"]["X-Env"], "prod");
        assert_eq!(redacted["smtp_password"], "***");
    }
}
