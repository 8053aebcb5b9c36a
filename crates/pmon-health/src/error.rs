/// Errors raised while validating or executing a health check.
///
/// Execution errors never leave the engine: they are turned into an
/// `unknown` outcome carrying the message.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health: invalid check definition: {0}")]
    InvalidCheck(String),

    #[error("Health: check not found: {0}")]
    UnknownCheck(String),

    #[error("Health: invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Health: I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Health: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, HealthError>;
