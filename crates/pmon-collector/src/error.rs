/// Errors returned by project registration calls.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("Collector: project not registered: {0}")]
    UnknownProject(String),

    #[error("Collector: invalid registration: {0}")]
    InvalidRegistration(String),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
