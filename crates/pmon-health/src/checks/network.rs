use super::{excerpt, outcome};
use crate::definition::NetworkCheck;
use crate::error::Result;
use pmon_common::types::{HealthCheckOutcome, HealthStatus};
use regex::Regex;
use std::time::Duration;

const MAX_RESPONSE_EXCERPT: usize = 500;

pub async fn run(
    client: &reqwest::Client,
    name: &str,
    check: &NetworkCheck,
    timeout: Duration,
) -> Result<HealthCheckOutcome> {
    let pattern = check.body_pattern.as_deref().map(Regex::new).transpose()?;

    let mut request = client.get(&check.url).timeout(timeout);
    for (key, value) in &check.headers {
        request = request.header(key.as_str(), value.as_str());
    }

    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            return Ok(outcome(
                name,
                HealthStatus::Unhealthy,
                format!("HTTP request failed: {e}"),
            ))
        }
    };
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Ok(outcome(
                name,
                HealthStatus::Unhealthy,
                format!("HTTP request failed: {e}"),
            ))
        }
    };

    if !check.expected_status_codes.contains(&status) {
        return Ok(outcome(
            name,
            HealthStatus::Unhealthy,
            format!("Unexpected status code: {status}"),
        )
        .with_detail("status_code", status)
        .with_detail("response_text", excerpt(&body, MAX_RESPONSE_EXCERPT)));
    }

    if let Some(pattern) = &pattern {
        if !pattern.is_match(&body) {
            return Ok(outcome(name, HealthStatus::Degraded, "Response pattern not found")
                .with_detail("expected_pattern", pattern.as_str())
                .with_detail("response_text", excerpt(&body, MAX_RESPONSE_EXCERPT)));
        }
    }

    Ok(outcome(name, HealthStatus::Healthy, "HTTP check passed")
        .with_detail("status_code", status)
        .with_detail("response_size", body.len()))
}
