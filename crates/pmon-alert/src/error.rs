/// Errors raised by rule management in the alert engine.
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("Alert: invalid rule: {0}")]
    InvalidRule(String),

    #[error("Alert: rule not found: {0}")]
    UnknownRule(String),
}

pub type Result<T> = std::result::Result<T, AlertError>;
