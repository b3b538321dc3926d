//! Error types for the memory engine
//!
//! One crate-level error enum covering every failure the engine can surface.
//! Budget exhaustion is deliberately NOT an error: retrieval degrades to a
//! partial result instead (see `budget::BudgetExhaustion`).

/// Engine error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum EngramError {
    /// Entity not found (node, edge, session, config)
    #[error("Not found: {0}")]
    NotFound(String),
    /// Malformed request or input
    #[error("Validation error: {0}")]
    Validation(String),
    /// Duplicate id or unknown foreign reference
    #[error("Constraint violation: {0}")]
    Constraint(String),
    /// Transient I/O failure - safe to retry
    #[error("Transient I/O error: {0}")]
    TransientIo(String),
    /// Provider or backend rate limit hit
    #[error("Rate limited: {0}")]
    RateLimited(String),
    /// Caller is not authenticated
    #[error("Unauthorized")]
    Unauthorized,
    /// Caller is authenticated but not allowed
    #[error("Forbidden")]
    Forbidden,
    /// No embedding provider left in the fallback chain
    #[error("Provider degraded: {0}")]
    ProviderDegraded(String),
    /// Storage backend unavailable - caller must retry after backoff
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
    /// Operation cancelled by caller
    #[error("Cancelled")]
    Cancelled,
    /// Database error from the SQLite adapter
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization error
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    /// Unexpected internal failure
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngramError>;

impl EngramError {
    /// Whether the caller should retry after backoff
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngramError::TransientIo(_)
                | EngramError::RateLimited(_)
                | EngramError::StorageUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngramError::TransientIo("timeout".into()).is_retryable());
        assert!(EngramError::StorageUnavailable("down".into()).is_retryable());
        assert!(!EngramError::NotFound("node-x".into()).is_retryable());
        assert!(!EngramError::Cancelled.is_retryable());
    }

    #[test]
    fn test_display_includes_detail() {
        let err = EngramError::Validation("limit must be 1..=100".into());
        assert!(err.to_string().contains("limit must be"));
    }
}
