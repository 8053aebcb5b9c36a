//! Notification delivery for alert lifecycle events.
//!
//! An [`NotificationChannel`] is a named, configured delivery backend. Built-in
//! types are mail (`email`), generic JSON `webhook` and Slack-compatible
//! `chat` webhooks; [`plugin::ChannelRegistry`] turns JSON configuration into
//! channel instances.

pub mod channels;
pub mod error;
pub mod plugin;
pub mod utils;

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use pmon_common::types::Alert;

/// A delivery backend that alerts are dispatched through.
///
/// Implementations provide [`deliver`](Self::deliver); callers use
/// [`send`](Self::send), which never fails: errors are logged and reported
/// as `false` so one broken channel cannot stop the others.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The instance name rules refer to (e.g. `"ops-mail"`).
    fn name(&self) -> &str;

    /// The channel type (e.g. `"email"`, `"webhook"`).
    fn channel_type(&self) -> &str;

    /// Delivers `message` about `alert`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejected or never received the
    /// notification (after retries, where the channel retries).
    async fn deliver(&self, alert: &Alert, message: &str) -> anyhow::Result<()>;

    /// Delivers and reports success.
    async fn send(&self, alert: &Alert, message: &str) -> bool {
        match self.deliver(alert, message).await {
            Ok(()) => {
                tracing::info!(
                    channel = self.name(),
                    alert_id = %alert.id,
                    "Notification sent"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    channel = self.name(),
                    channel_type = self.channel_type(),
                    alert_id = %alert.id,
                    error = %e,
                    "Failed to send notification"
                );
                false
            }
        }
    }
}
