//! Embedding provider abstraction
//!
//! All inference is external. Providers are ranked in a fallback chain
//! (primary, secondary, local, degraded) and their failures are classified
//! so the retry manager knows what is worth retrying.

use async_trait::async_trait;

/// Default embedding dimensionality produced by the primary model
pub const DEFAULT_DIMENSIONS: usize = 1536;

/// Truncation width used for fast similarity comparisons
pub const COMPARISON_DIMENSIONS: usize = 512;

// ============================================================================
// ERROR CLASSIFICATION
// ============================================================================

/// Classified embedding provider failure
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Transient network or service hiccup - retry
    #[error("Transient provider error: {0}")]
    Transient(String),
    /// Provider rate limit - retry after the window
    #[error("Provider rate limited: {0}")]
    RateLimited(String),
    /// Content rejected by policy - do not retry
    #[error("Content policy rejection: {0}")]
    ContentPolicy(String),
    /// Provider is down - move to the next provider
    #[error("Provider unavailable: {0}")]
    ServiceUnavailable(String),
    /// Input exceeds the provider's context window - do not retry
    #[error("Context too long: {0}")]
    ContextTooLong(String),
}

impl ProviderError {
    /// Whether retrying the same provider can help
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Transient(_) | ProviderError::RateLimited(_)
        )
    }
}

// ============================================================================
// PROVIDER TIERS
// ============================================================================

/// Position of a provider in the fallback chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProviderTier {
    /// Preferred model; embeddings from it are never provisional
    Primary,
    /// First fallback
    Secondary,
    /// Local model fallback
    Local,
    /// Last-resort degraded model
    Degraded,
}

impl ProviderTier {
    /// Embeddings from any non-primary tier are provisional
    pub fn is_provisional(&self) -> bool {
        !matches!(self, ProviderTier::Primary)
    }
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// A model that turns texts into dense vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts, one vector per input in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Model identifier recorded on produced embeddings
    fn model_id(&self) -> &str;

    /// Dimensionality of produced vectors
    fn dimensions(&self) -> usize;

    /// Approximate token count for cost reporting
    ///
    /// Informational only; the core reports usage but does not enforce cost
    /// budgets.
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::Transient("timeout".into()).is_retryable());
        assert!(ProviderError::RateLimited("tpm".into()).is_retryable());
        assert!(!ProviderError::ContentPolicy("flagged".into()).is_retryable());
        assert!(!ProviderError::ContextTooLong("9000 tokens".into()).is_retryable());
        assert!(!ProviderError::ServiceUnavailable("503".into()).is_retryable());
    }

    #[test]
    fn test_non_primary_tiers_are_provisional() {
        assert!(!ProviderTier::Primary.is_provisional());
        assert!(ProviderTier::Secondary.is_provisional());
        assert!(ProviderTier::Local.is_provisional());
        assert!(ProviderTier::Degraded.is_provisional());
    }
}
