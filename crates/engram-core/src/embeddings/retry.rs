//! Retry manager for the provider fallback chain
//!
//! An explicit state machine: {idle, trying(provider, attempt),
//! cooldown(until), exhausted}. Retryable errors back off and retry on the
//! same provider (base 1 s, max 2 retries); non-retryable errors skip ahead
//! to the next provider after a 1 s inter-provider delay. Cancellation
//! interrupts any state without waiting out remaining retries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cancel::CancelToken;
use crate::error::{EngramError, Result};

use super::provider::{EmbeddingProvider, ProviderError, ProviderTier};

// ============================================================================
// POLICY
// ============================================================================

/// Retry/backoff policy for the chain
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base backoff before a same-provider retry
    pub base_delay: Duration,
    /// Maximum retries per provider (attempts = retries + 1)
    pub max_retries_per_provider: u32,
    /// Delay between giving up on one provider and trying the next
    pub inter_provider_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_retries_per_provider: 2,
            inter_provider_delay: Duration::from_secs(1),
        }
    }
}

// ============================================================================
// STATE
// ============================================================================

/// Observable state of the retry manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// No call in flight
    Idle,
    /// Attempting a provider
    Trying {
        /// Index into the chain
        provider: usize,
        /// 0-based attempt number on that provider
        attempt: u32,
    },
    /// Backing off until the given instant
    Cooldown {
        /// When the cooldown ends
        until: DateTime<Utc>,
    },
    /// Every provider failed
    Exhausted,
}

/// A successful embedding call, annotated with which tier produced it
#[derive(Debug, Clone)]
pub struct ChainOutput {
    /// One vector per input text
    pub vectors: Vec<Vec<f32>>,
    /// Model that produced the vectors
    pub model_id: String,
    /// Tier of the producing provider
    pub tier: ProviderTier,
    /// True when a non-primary tier produced the vectors
    pub provisional: bool,
}

// ============================================================================
// RETRY MANAGER
// ============================================================================

/// Owns the ordered provider chain and drives calls through it
pub struct RetryManager {
    chain: Vec<(ProviderTier, Arc<dyn EmbeddingProvider>)>,
    policy: RetryPolicy,
    state: std::sync::Mutex<RetryState>,
}

impl RetryManager {
    /// Build a manager over an ordered (tier, provider) chain
    pub fn new(chain: Vec<(ProviderTier, Arc<dyn EmbeddingProvider>)>, policy: RetryPolicy) -> Self {
        Self {
            chain,
            policy,
            state: std::sync::Mutex::new(RetryState::Idle),
        }
    }

    /// Current observable state
    pub fn state(&self) -> RetryState {
        self.state.lock().expect("retry state lock").clone()
    }

    fn set_state(&self, state: RetryState) {
        *self.state.lock().expect("retry state lock") = state;
    }

    /// Whether the primary provider answered its most recent probe
    ///
    /// Used by the re-embedding trigger for provisional embeddings.
    pub async fn primary_is_healthy(&self) -> bool {
        let Some((_, primary)) = self.chain.first() else {
            return false;
        };
        primary.embed(&["health probe".to_string()]).await.is_ok()
    }

    /// Drive one batch through the chain
    ///
    /// Walks providers in order. Retryable errors back off and retry on the
    /// same provider; non-retryable errors move on immediately. Returns
    /// `ProviderDegraded` once the chain is exhausted and `Cancelled` the
    /// moment the token fires, without running remaining retries.
    pub async fn embed(&self, texts: &[String], cancel: &CancelToken) -> Result<ChainOutput> {
        if self.chain.is_empty() {
            return Err(EngramError::ProviderDegraded(
                "embedding chain is empty".to_string(),
            ));
        }

        let mut last_error: Option<ProviderError> = None;

        for (index, (tier, provider)) in self.chain.iter().enumerate() {
            let mut attempt = 0_u32;
            loop {
                if cancel.is_cancelled() {
                    self.set_state(RetryState::Idle);
                    return Err(EngramError::Cancelled);
                }
                self.set_state(RetryState::Trying {
                    provider: index,
                    attempt,
                });

                let outcome = tokio::select! {
                    result = provider.embed(texts) => result,
                    _ = cancel.cancelled() => {
                        self.set_state(RetryState::Idle);
                        return Err(EngramError::Cancelled);
                    }
                };

                match outcome {
                    Ok(vectors) => {
                        self.set_state(RetryState::Idle);
                        return Ok(ChainOutput {
                            vectors,
                            model_id: provider.model_id().to_string(),
                            tier: *tier,
                            provisional: tier.is_provisional(),
                        });
                    }
                    Err(error) => {
                        let retryable = error.is_retryable();
                        tracing::warn!(
                            provider = provider.model_id(),
                            attempt,
                            retryable,
                            "embedding provider call failed: {error}"
                        );
                        last_error = Some(error);

                        if retryable && attempt < self.policy.max_retries_per_provider {
                            attempt += 1;
                            let delay = self.policy.base_delay * attempt;
                            self.set_state(RetryState::Cooldown {
                                until: Utc::now()
                                    + chrono::Duration::from_std(delay)
                                        .unwrap_or(chrono::Duration::seconds(1)),
                            });
                            if !self.sleep_or_cancel(delay, cancel).await {
                                self.set_state(RetryState::Idle);
                                return Err(EngramError::Cancelled);
                            }
                            continue;
                        }
                        break;
                    }
                }
            }

            // Move to the next provider after the inter-provider delay
            if index + 1 < self.chain.len()
                && !self
                    .sleep_or_cancel(self.policy.inter_provider_delay, cancel)
                    .await
            {
                self.set_state(RetryState::Idle);
                return Err(EngramError::Cancelled);
            }
        }

        self.set_state(RetryState::Exhausted);
        Err(EngramError::ProviderDegraded(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no provider answered".to_string()),
        ))
    }

    /// Sleep for `delay`; returns false when cancelled first
    async fn sleep_or_cancel(&self, delay: Duration, cancel: &CancelToken) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = cancel.cancelled() => false,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Provider that fails a fixed number of times before succeeding
    struct FlakyProvider {
        name: String,
        failures_before_success: u32,
        calls: AtomicU32,
        error: fn(String) -> ProviderError,
    }

    impl FlakyProvider {
        fn new(name: &str, failures: u32, error: fn(String) -> ProviderError) -> Self {
            Self {
                name: name.to_string(),
                failures_before_success: failures,
                calls: AtomicU32::new(0),
                error,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                return Err((self.error)("simulated".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
        }

        fn model_id(&self) -> &str {
            &self.name
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    fn policy_without_delays() -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(1),
            max_retries_per_provider: 2,
            inter_provider_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_primary_success_is_not_provisional() {
        let manager = RetryManager::new(
            vec![(
                ProviderTier::Primary,
                Arc::new(FlakyProvider::new("primary", 0, ProviderError::Transient)) as _,
            )],
            policy_without_delays(),
        );

        let output = manager
            .embed(&["hello".to_string()], &CancelToken::new())
            .await
            .unwrap();
        assert!(!output.provisional);
        assert_eq!(output.model_id, "primary");
        assert_eq!(output.vectors.len(), 1);
    }

    #[tokio::test]
    async fn test_transient_error_retries_same_provider() {
        let provider = Arc::new(FlakyProvider::new("primary", 2, ProviderError::Transient));
        let manager = RetryManager::new(
            vec![(ProviderTier::Primary, provider.clone() as _)],
            policy_without_delays(),
        );

        let output = manager
            .embed(&["hello".to_string()], &CancelToken::new())
            .await
            .unwrap();
        // Two failures then success, all on the primary
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(!output.provisional);
    }

    #[tokio::test]
    async fn test_content_policy_skips_retries_and_falls_back() {
        let primary = Arc::new(FlakyProvider::new("primary", 99, ProviderError::ContentPolicy));
        let secondary = Arc::new(FlakyProvider::new("secondary", 0, ProviderError::Transient));
        let manager = RetryManager::new(
            vec![
                (ProviderTier::Primary, primary.clone() as _),
                (ProviderTier::Secondary, secondary as _),
            ],
            policy_without_delays(),
        );

        let output = manager
            .embed(&["hello".to_string()], &CancelToken::new())
            .await
            .unwrap();
        // Non-retryable: exactly one call on the primary
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert!(output.provisional);
        assert_eq!(output.model_id, "secondary");
    }

    #[tokio::test]
    async fn test_exhausted_chain_is_provider_degraded() {
        let manager = RetryManager::new(
            vec![(
                ProviderTier::Primary,
                Arc::new(FlakyProvider::new("primary", 99, ProviderError::ServiceUnavailable)) as _,
            )],
            policy_without_delays(),
        );

        let err = manager
            .embed(&["hello".to_string()], &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::ProviderDegraded(_)));
        assert_eq!(manager.state(), RetryState::Exhausted);
    }

    #[tokio::test]
    async fn test_cancellation_aborts_without_remaining_retries() {
        let provider = Arc::new(FlakyProvider::new("primary", 99, ProviderError::Transient));
        let manager = RetryManager::new(
            vec![(ProviderTier::Primary, provider.clone() as _)],
            RetryPolicy {
                base_delay: Duration::from_secs(30),
                ..policy_without_delays()
            },
        );

        let cancel = CancelToken::new();
        cancel.cancel();
        let err = manager
            .embed(&["hello".to_string()], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngramError::Cancelled));
    }
}
