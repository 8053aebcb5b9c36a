/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use pmon_storage::error::StorageError;
///
/// let err = StorageError::InvalidQuery("from is after to".to_string());
/// assert!(err.to_string().starts_with("Storage:"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The query bounds or filters are inconsistent.
    #[error("Storage: invalid query: {0}")]
    InvalidQuery(String),

    /// A writer panicked while holding the store lock.
    #[error("Storage: store lock poisoned")]
    LockPoisoned,

    /// Generic storage error for cases not covered by other variants.
    #[error("Storage: {0}")]
    Other(String),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
