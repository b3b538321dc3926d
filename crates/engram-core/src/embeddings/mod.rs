//! Contextual embedding pipeline
//!
//! Typed context prefixes, provider fallback with retry, Matryoshka
//! truncation, and re-embedding triggers. No model runs in-process: all
//! inference goes through the `EmbeddingProvider` trait so the engine can be
//! driven by remote APIs, a local model server, or test doubles.

mod context;
mod pipeline;
mod provider;
mod retry;

pub use context::{
    build_context, BuiltContext, ContextInput, ContextKind, MIN_CONTENT_CHARS,
    MIN_PREFIXED_CHARS,
};
pub use pipeline::{EmbeddingPipeline, QueryEmbedding, TokenUsage, QUERY_CACHE_SIZE};
pub use provider::{
    EmbeddingProvider, ProviderError, ProviderTier, COMPARISON_DIMENSIONS, DEFAULT_DIMENSIONS,
};
pub use retry::{ChainOutput, RetryManager, RetryPolicy, RetryState};

use crate::mathx::truncate_to;

/// Valid Matryoshka truncation widths
pub const MATRYOSHKA_DIMENSIONS: [usize; 3] = [128, 512, 1536];

/// Truncate an embedding to a Matryoshka prefix width
///
/// Returns `None` when `k` is not one of the trained prefix widths; an
/// arbitrary cut is not a meaningful embedding.
pub fn truncate_to_matryoshka(vector: &[f32], k: usize) -> Option<Vec<f32>> {
    if !MATRYOSHKA_DIMENSIONS.contains(&k) {
        return None;
    }
    Some(truncate_to(vector, k))
}
