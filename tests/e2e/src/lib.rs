//! End-to-end test harness
//!
//! Builds fully wired engines over deterministic collaborators: a fake
//! clock, an in-memory or temp-file store, and a synonym-group embedding
//! provider whose vectors are predictable enough to assert on.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use engram_core::{
    CancelToken, ClusterRef, CreateNodeInput, EmbeddingPipeline, EmbeddingProvider, FakeClock,
    MemoryEngine, MemoryStore, NodeType, ProviderError, ProviderTier, RetryManager, RetryPolicy,
    SearchRequest, StaticClusters, StorageAdapter,
};

/// Synonym groups: every word in a group maps onto the same vector axis
///
/// This makes semantic-but-not-lexical matches constructible: "dinner" and
/// "pasta" share an axis without sharing a token.
pub const SYNONYM_GROUPS: &[&[&str]] = &[
    &["rust", "ownership", "borrowing"],
    &["cooking", "pasta", "dinner"],
    &["kubernetes", "incident", "outage"],
];

/// Deterministic embedding provider over the synonym groups
pub struct SynonymProvider;

#[async_trait]
impl EmbeddingProvider for SynonymProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts
            .iter()
            .map(|text| {
                let lower = text.to_lowercase();
                SYNONYM_GROUPS
                    .iter()
                    .map(|group| {
                        group
                            .iter()
                            .map(|word| lower.matches(word).count())
                            .sum::<usize>() as f32
                    })
                    .collect()
            })
            .collect())
    }

    fn model_id(&self) -> &str {
        "synonym-test-model"
    }

    fn dimensions(&self) -> usize {
        SYNONYM_GROUPS.len()
    }
}

/// A fully wired engine plus its fake clock
pub struct Harness {
    /// The engine under test
    pub engine: MemoryEngine,
    /// The injected clock
    pub clock: Arc<FakeClock>,
}

/// Default test epoch
pub fn epoch() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
}

/// Harness over an in-memory store with the synonym provider
pub fn harness() -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), vec![])
}

/// Harness with a fixed cluster list
pub fn harness_with_clusters(clusters: Vec<ClusterRef>) -> Harness {
    harness_with_store(Arc::new(MemoryStore::new()), clusters)
}

/// Harness over any store
pub fn harness_with_store(
    store: Arc<dyn StorageAdapter>,
    clusters: Vec<ClusterRef>,
) -> Harness {
    let clock = Arc::new(FakeClock::at(epoch()));
    let retry = Arc::new(RetryManager::new(
        vec![(ProviderTier::Primary, Arc::new(SynonymProvider) as _)],
        RetryPolicy::default(),
    ));
    let pipeline = Arc::new(EmbeddingPipeline::new(retry, clock.clone()));

    let engine = MemoryEngine::new(store, clock.clone())
        .with_pipeline(pipeline)
        .with_clusters(Arc::new(StaticClusters::new(clusters)));

    Harness { engine, clock }
}

/// Create a concept node with the given title and body
pub async fn concept(engine: &MemoryEngine, title: &str, body: &str) -> engram_core::MemoryNode {
    concept_in_cluster(engine, title, body, None).await
}

/// Create a concept node inside a cluster
pub async fn concept_in_cluster(
    engine: &MemoryEngine,
    title: &str,
    body: &str,
    cluster_id: Option<&str>,
) -> engram_core::MemoryNode {
    engine
        .create_node(CreateNodeInput {
            node_type: NodeType::Concept,
            subtype: None,
            title: title.to_string(),
            summary: None,
            body: Some(body.to_string()),
            tags: vec![],
            source: None,
            source_type: None,
            source_episode: None,
            chunk_position: None,
            participants: vec![],
            event: None,
            cluster_id: cluster_id.map(|c| c.to_string()),
            extraction_depth: Default::default(),
        })
        .await
        .expect("create node")
}

/// Run a search with default knobs
pub async fn search(engine: &MemoryEngine, query: &str) -> engram_core::SearchResponse {
    engine
        .search(
            SearchRequest {
                query: query.to_string(),
                filters: None,
                limit: 10,
                thoroughness: None,
                operation: None,
            },
            &CancelToken::new(),
        )
        .await
        .expect("search")
}
