pub mod chat;
pub mod email;
pub mod webhook;

use crate::utils::{truncate_string, MAX_BODY_LENGTH};
use anyhow::Result;
use std::time::Duration;

const MAX_ATTEMPTS: u32 = 3;

/// Sends a prepared request up to three times with exponential backoff,
/// succeeding on the first 2xx response.
pub(crate) async fn send_with_retry(request: reqwest::RequestBuilder, channel: &str) -> Result<()> {
    let mut last_err = None;
    for attempt in 0..MAX_ATTEMPTS {
        let Some(req) = request.try_clone() else {
            return Err(anyhow::anyhow!("request body cannot be retried"));
        };
        match req.send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    return Ok(());
                }
                let body = match resp.text().await {
                    Ok(text) => truncate_string(&text, MAX_BODY_LENGTH),
                    Err(e) => format!("[Failed to read response body: {e}]"),
                };
                tracing::warn!(
                    channel,
                    attempt = attempt + 1,
                    status = %status,
                    "Webhook returned non-success status, retrying"
                );
                last_err = Some(anyhow::anyhow!("HTTP {status}: {body}"));
            }
            Err(e) => {
                tracing::warn!(
                    channel,
                    attempt = attempt + 1,
                    error = %e,
                    "Webhook send failed, retrying"
                );
                last_err = Some(e.into());
            }
        }
        if attempt + 1 < MAX_ATTEMPTS {
            tokio::time::sleep(Duration::from_millis(100 * 2u64.pow(attempt))).await;
        }
    }
    Err(last_err.unwrap_or_else(|| anyhow::anyhow!("no attempt made")))
}
