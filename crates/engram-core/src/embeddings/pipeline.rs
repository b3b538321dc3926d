//! Embedding pipeline
//!
//! Node embedding: build the typed context prefix, drive the provider chain,
//! record model/hash/version metadata. Query embedding: same chain, cached in
//! an LRU keyed by query text so repeated queries never re-embed.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use lru::LruCache;

use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::error::Result;
use crate::memory::{MemoryNode, NodeEmbedding};

use super::context::{build_context, ContextInput, ContextKind};
use super::retry::RetryManager;

/// Capacity of the query-embedding LRU cache
pub const QUERY_CACHE_SIZE: usize = 256;

/// Informational token usage for a pipeline call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Approximate tokens sent to the provider
    pub tokens: usize,
}

/// A query vector plus how it was produced
#[derive(Debug, Clone)]
pub struct QueryEmbedding {
    /// The query vector
    pub vector: Vec<f32>,
    /// Model that produced it
    pub model_id: String,
    /// Whether it came from the cache
    pub cached: bool,
    /// Informational token usage (zero on cache hits)
    pub usage: TokenUsage,
}

// ============================================================================
// PIPELINE
// ============================================================================

/// Drives embedding of nodes and queries through the provider chain
pub struct EmbeddingPipeline {
    retry: Arc<RetryManager>,
    clock: Arc<dyn Clock>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl EmbeddingPipeline {
    /// Build a pipeline over a retry-managed provider chain
    pub fn new(retry: Arc<RetryManager>, clock: Arc<dyn Clock>) -> Self {
        Self {
            retry,
            clock,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
        }
    }

    /// Access to the underlying retry manager (health probes, state)
    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry
    }

    /// Embed a node's content behind its typed context prefix
    ///
    /// The embedding version starts at 1 and increments past the node's
    /// current embedding on re-embedding.
    pub async fn embed_node(
        &self,
        node: &MemoryNode,
        context: &ContextInput,
        cancel: &CancelToken,
    ) -> Result<(NodeEmbedding, TokenUsage)> {
        let kind = ContextKind::select(node.node_type, node.provenance.source_type.as_deref());
        let built = build_context(kind, context, &node.searchable_text());

        let output = self.retry.embed(&[built.text.clone()], cancel).await?;
        let vector = output
            .vectors
            .into_iter()
            .next()
            .unwrap_or_default();
        let dimensions = vector.len();
        let version = node.embedding.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let usage = TokenUsage {
            tokens: built.text.split_whitespace().count(),
        };

        Ok((
            NodeEmbedding {
                vector,
                dimensions,
                model: output.model_id,
                context_prefix: built.prefix,
                context_hash: built.hash,
                created_at: self.clock.now(),
                provisional: output.provisional,
                version,
            },
            usage,
        ))
    }

    /// Embed a query, using the LRU cache when possible
    pub async fn embed_query(&self, text: &str, cancel: &CancelToken) -> Result<QueryEmbedding> {
        if let Some(vector) = self
            .query_cache
            .lock()
            .expect("query cache lock")
            .get(text)
            .cloned()
        {
            return Ok(QueryEmbedding {
                vector,
                model_id: "cache".to_string(),
                cached: true,
                usage: TokenUsage::default(),
            });
        }

        let built = build_context(ContextKind::Query, &ContextInput::default(), text);
        let output = self.retry.embed(&[built.text.clone()], cancel).await?;
        let vector = output.vectors.into_iter().next().unwrap_or_default();

        self.query_cache
            .lock()
            .expect("query cache lock")
            .put(text.to_string(), vector.clone());

        Ok(QueryEmbedding {
            vector,
            model_id: output.model_id,
            cached: false,
            usage: TokenUsage {
                tokens: built.text.split_whitespace().count(),
            },
        })
    }

    /// Whether a node needs re-embedding
    ///
    /// Triggers: (a) the stored context hash differs from the current one,
    /// (b) the embedding is provisional and the primary is healthy again,
    /// (c) the content body changed since the embedding was computed.
    pub fn needs_reembedding(
        node: &MemoryNode,
        current_context_hash: &str,
        primary_healthy: bool,
        body_changed: bool,
    ) -> bool {
        match &node.embedding {
            None => true,
            Some(embedding) => {
                embedding.context_hash != current_context_hash
                    || (embedding.provisional && primary_healthy)
                    || body_changed
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
