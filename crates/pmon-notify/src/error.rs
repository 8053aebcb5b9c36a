/// Errors raised while configuring notification channels.
///
/// Delivery itself reports through [`crate::NotificationChannel::send`],
/// which never fails; these errors surface when a channel is built from
/// configuration.
///
/// # Examples
///
/// ```rust
/// use pmon_notify::error::NotifyError;
///
/// let err = NotifyError::InvalidConfig("missing smtp_host".to_string());
/// assert!(err.to_string().contains("smtp_host"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The channel type is not registered in the plugin registry.
    #[error("Notify: unknown channel type '{0}'")]
    UnknownChannelType(String),

    /// Building the HTTP client failed.
    #[error("Notify: HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Building the SMTP transport failed.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// JSON deserialization of a channel config failed.
    #[error("Notify: JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
