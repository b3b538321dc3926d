//! Memory engine
//!
//! The orchestrator tying the subsystems together: node/edge operations
//! with forgetting-curve side effects, the public retrieval call (analyze ->
//! budget -> seed -> spread -> rank -> side effects), engagement feedback,
//! and the housekeeping sweeps.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::budget::{
    self, BudgetExhaustion, ExhaustedResource, GraphMetrics, OperationKey, QueryType, Thoroughness,
};
use crate::cancel::CancelToken;
use crate::clock::Clock;
use crate::clusters::{route, ClusterRef, ClusterRouting, RoutingStrategy};
use crate::config::HybridWeightsConfig;
use crate::embeddings::{ContextInput, EmbeddingPipeline, COMPARISON_DIMENSIONS};
use crate::error::{EngramError, Result};
use crate::fsrs::{self, neural_defaults, recall, retrievability, DEFAULT_GRADE};
use crate::index::{Bm25Index, IndexedFields};
use crate::mathx::{cosine_similarity, truncate_to};
use crate::memory::{
    new_node_id, parse_markdown, Direction, EdgeType, EditRecord, Lifecycle, MemoryEdge,
    MemoryNode, MemoryStats, NeuralState, NodeFilters, Provenance, Session, SyncState,
    TemporalModel, UpdateNodePatch,
};
use crate::search::{
    analyze_query, fuse_seeds, rank, spread, substring_fallback, ActivationMap, CandidateSignals,
    GraphAccess, QueryAnalysis, Signal, SignalBreakdown, SignalWeights, SpreadOutcome,
    SpreadParams, Traversal,
};
use crate::similarity::{review_embedding, RECENT_NODE_WINDOW};
use crate::storage::{StorageAdapter, VectorQuery};
use crate::weights::{
    create_user_edge, create_weighted_edge, expire_or_promote, record_activation,
    touch_coactivation_decay, build_candidate, compression_eligibility, restorable_until,
    CompressionDecision, ENGAGED_DWELL_SECONDS,
};

/// Candidate pool fetched from each seeding modality, per entry point
const SEED_POOL_FACTOR: usize = 4;
/// Capacity of the low-priority embedding backfill queue
const BACKFILL_QUEUE_CAPACITY: usize = 1024;
/// Recent sessions examined for cross-session continuation edges
const RECENT_SESSION_WINDOW: usize = 20;

// ============================================================================
// COLLABORATOR TRAITS
// ============================================================================

/// Supplies cluster centroids and learns from access events
pub trait ClusterSource: Send + Sync {
    /// Current `{cluster, centroid}` pairs
    fn centroids(&self) -> Vec<ClusterRef>;

    /// Access event for affinity learning (fire-and-forget)
    fn record_access(&self, node_id: &str, cluster_id: Option<&str>);
}

/// A fixed set of clusters; the default when no cluster service is wired
#[derive(Default)]
pub struct StaticClusters {
    clusters: Vec<ClusterRef>,
}

impl StaticClusters {
    /// Cluster source over a fixed list
    pub fn new(clusters: Vec<ClusterRef>) -> Self {
        Self { clusters }
    }
}

impl ClusterSource for StaticClusters {
    fn centroids(&self) -> Vec<ClusterRef> {
        self.clusters.clone()
    }

    fn record_access(&self, _node_id: &str, _cluster_id: Option<&str>) {}
}

/// Receives per-request metrics and score breakdowns
pub trait TelemetrySink: Send + Sync {
    /// One completed retrieval
    fn record_search(&self, metrics: &SearchMetrics, breakdowns: &[(String, SignalBreakdown)]);
}

/// Telemetry sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetrySink for NoopTelemetry {
    fn record_search(&self, _metrics: &SearchMetrics, _breakdowns: &[(String, SignalBreakdown)]) {}
}

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

/// The public retrieval request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Optional filters
    #[serde(default)]
    pub filters: Option<NodeFilters>,
    /// Result cap, 1..=100
    pub limit: usize,
    /// Thoroughness selection
    #[serde(default)]
    pub thoroughness: Option<Thoroughness>,
    /// Operation override for budgeting
    #[serde(default)]
    pub operation: Option<OperationKey>,
}

/// One scored retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredNode {
    /// The node
    pub node: MemoryNode,
    /// Composite score in [0, 1]
    pub score: f64,
    /// Six-signal breakdown
    pub breakdown: SignalBreakdown,
    /// Largest-contribution signal
    pub primary_signal: Signal,
}

/// Retrieval execution metrics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMetrics {
    /// Hops fully executed
    pub hops_executed: u32,
    /// Nodes that accumulated activation
    pub nodes_activated: usize,
    /// Seeds admitted
    pub seeds: usize,
    /// Wall-clock spent
    pub time_ms: u64,
    /// Whether the lexical fallback path answered
    pub used_fallback: bool,
    /// Cluster routing strategy taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_strategy: Option<RoutingStrategy>,
    /// Session the accesses were recorded under
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Query classification surfaced to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryClassification {
    /// Classified query type
    pub query_type: QueryType,
    /// Classification confidence
    pub confidence: f64,
    /// Whether dense embeddings participated
    pub used_embeddings: bool,
    /// True when the query was disqualified from embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disqualified: Option<bool>,
    /// Why the query skipped embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disqualifier_category: Option<String>,
}

/// The public retrieval response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Scored results, best first
    pub data: Vec<ScoredNode>,
    /// Number of results
    pub count: usize,
    /// Execution metrics
    pub metrics: SearchMetrics,
    /// Query classification
    pub qcs: QueryClassification,
    /// Present when the budget ran out before the quality target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<BudgetExhaustion>,
}

// ============================================================================
// GRAPH VIEW
// ============================================================================

/// GraphAccess over the storage adapter
struct StoreGraph<'a> {
    store: &'a dyn StorageAdapter,
    cluster_cache: Mutex<HashMap<String, Option<String>>>,
}

impl<'a> StoreGraph<'a> {
    fn new(store: &'a dyn StorageAdapter) -> Self {
        Self {
            store,
            cluster_cache: Mutex::new(HashMap::new()),
        }
    }
}

impl GraphAccess for StoreGraph<'_> {
    fn connections(&self, node_id: &str, cap: usize) -> Vec<Traversal> {
        let Ok(edges) = self.store.edges_for(node_id, Direction::Both) else {
            return Vec::new();
        };
        let mut traversals: Vec<Traversal> = edges
            .iter()
            .filter_map(|edge| {
                // Outgoing always; incoming only when the edge is bidirectional
                let far = if edge.source == node_id {
                    Some(edge.target.as_str())
                } else if edge.bidirectional {
                    Some(edge.source.as_str())
                } else {
                    None
                }?;
                Some(Traversal {
                    neighbor: far.to_string(),
                    weight: edge.effective_weight(),
                })
            })
            .collect();
        traversals.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.neighbor.cmp(&b.neighbor))
        });
        traversals.truncate(cap);
        traversals
    }

    fn cluster_of(&self, node_id: &str) -> Option<String> {
        let mut cache = self.cluster_cache.lock().expect("cluster cache lock");
        if let Some(cached) = cache.get(node_id) {
            return cached.clone();
        }
        let cluster = self
            .store
            .get_node(node_id)
            .ok()
            .and_then(|node| node.cluster_id);
        cache.insert(node_id.to_string(), cluster.clone());
        cluster
    }
}

// ============================================================================
// ENGINE
// ============================================================================

/// The memory dynamics and retrieval engine
pub struct MemoryEngine {
    store: Arc<dyn StorageAdapter>,
    bm25: RwLock<Bm25Index>,
    pipeline: Option<Arc<EmbeddingPipeline>>,
    clusters: Arc<dyn ClusterSource>,
    telemetry: Arc<dyn TelemetrySink>,
    clock: Arc<dyn Clock>,
    hybrid: HybridWeightsConfig,
    signal_weights: SignalWeights,
    backfill: Mutex<VecDeque<String>>,
}

impl MemoryEngine {
    /// Engine over a store and clock, with no embedding pipeline wired
    pub fn new(store: Arc<dyn StorageAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            bm25: RwLock::new(Bm25Index::new()),
            pipeline: None,
            clusters: Arc::new(StaticClusters::default()),
            telemetry: Arc::new(NoopTelemetry),
            clock,
            hybrid: HybridWeightsConfig::default(),
            signal_weights: SignalWeights::default(),
            backfill: Mutex::new(VecDeque::new()),
        }
    }

    /// Attach an embedding pipeline
    pub fn with_pipeline(mut self, pipeline: Arc<EmbeddingPipeline>) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Attach a cluster source
    pub fn with_clusters(mut self, clusters: Arc<dyn ClusterSource>) -> Self {
        self.clusters = clusters;
        self
    }

    /// Attach a telemetry sink
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Override the hybrid seeding weights
    pub fn with_hybrid_weights(mut self, hybrid: HybridWeightsConfig) -> Self {
        self.hybrid = hybrid;
        self
    }

    /// The underlying store
    pub fn store(&self) -> &dyn StorageAdapter {
        self.store.as_ref()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn index_node(&self, node: &MemoryNode) {
        let mut index = self.bm25.write().expect("bm25 lock");
        index.upsert(
            &node.id,
            &IndexedFields {
                title: node.title.clone(),
                summary: node.summary.clone(),
                body: node.body.clone(),
                tags: node.tags.clone(),
                node_type: node.node_type,
                lifecycle: node.lifecycle,
                cluster_id: node.cluster_id.clone(),
                primary_timestamp: node.primary_timestamp(),
            },
        );
    }

    // ========================================================================
    // NODE OPERATIONS
    // ========================================================================

    /// Create a node from the input, embed it, and index it
    ///
    /// Embedding failure never fails the create: the node lands without a
    /// vector and is queued for backfill.
    pub async fn create_node(&self, input: crate::memory::CreateNodeInput) -> Result<MemoryNode> {
        if input.title.trim().is_empty() {
            return Err(EngramError::Validation("title must not be empty".to_string()));
        }
        let now = self.now();
        let defaults = neural_defaults(input.node_type, input.subtype.as_deref());

        let mut temporal = TemporalModel::at_ingestion(now);
        temporal.event = input.event;

        let mut node = MemoryNode {
            id: new_node_id(),
            node_type: input.node_type,
            subtype: input.subtype,
            title: input.title,
            summary: input.summary,
            body: input.body.clone(),
            blocks: input.body.as_deref().map(|b| parse_markdown(b, now)),
            tags: input.tags,
            participants: input.participants,
            embedding: None,
            neural: NeuralState::new(defaults.stability, defaults.difficulty, now),
            lifecycle: Lifecycle::Active,
            extraction_depth: input.extraction_depth,
            temporal,
            provenance: Provenance {
                source: input.source.unwrap_or_else(|| "api".to_string()),
                source_type: input.source_type,
                source_episode: input.source_episode,
                chunk_position: input.chunk_position,
                created_at: now,
                confidence: 1.0,
                encrypted_payload: None,
                encryption_tier: None,
            },
            sync: SyncState::initial(now, "engine"),
            compression: None,
            cluster_id: input.cluster_id,
            pinned: false,
            starred: false,
        };

        if let Some(pipeline) = &self.pipeline {
            let context = self.context_for(&node);
            match pipeline
                .embed_node(&node, &context, &CancelToken::new())
                .await
            {
                Ok((embedding, _usage)) => node.embedding = Some(embedding),
                Err(error) => {
                    tracing::warn!(node = node.id.as_str(), "embedding deferred: {error}");
                    self.queue_backfill(&node.id);
                }
            }
        }

        self.store.put_node(&node)?;
        self.index_node(&node);

        if node.embedding.is_some() {
            self.run_similarity_pass(&node.id)?;
        }
        Ok(node)
    }

    /// Apply a partial update
    ///
    /// A body change produces an edit record with before/after snapshots and
    /// re-embeds the node. An explicit lifecycle in the patch is the one
    /// write that may reactivate a DORMANT node.
    pub async fn update_node(&self, id: &str, patch: UpdateNodePatch) -> Result<MemoryNode> {
        let mut node = self.store.get_node(id)?;
        let now = self.now();
        let body_changed = patch.body.is_some() && patch.body != node.body;

        if body_changed {
            let edit = EditRecord::body_change(
                node.id.clone(),
                serde_json::json!({ "body": &node.body, "blocks": &node.blocks }),
                serde_json::json!({ "body": &patch.body }),
                "engine",
                now,
            );
            self.store.record_edit(&edit)?;
        }

        if let Some(title) = patch.title {
            node.title = title;
        }
        if let Some(summary) = patch.summary {
            node.summary = Some(summary);
        }
        if let Some(body) = patch.body {
            node.blocks = Some(parse_markdown(&body, now));
            node.body = Some(body);
        }
        if let Some(tags) = patch.tags {
            node.tags = tags;
        }
        if let Some(lifecycle) = patch.lifecycle {
            node.lifecycle = lifecycle;
        }
        if let Some(cluster_id) = patch.cluster_id {
            node.cluster_id = Some(cluster_id);
        }
        if let Some(pinned) = patch.pinned {
            node.pinned = pinned;
        }
        if let Some(starred) = patch.starred {
            node.starred = starred;
        }

        node.sync.version += 1;
        node.sync.last_modified = now;
        node.sync.last_modifier = "engine".to_string();

        if body_changed {
            if let Some(pipeline) = &self.pipeline {
                let context = self.context_for(&node);
                match pipeline
                    .embed_node(&node, &context, &CancelToken::new())
                    .await
                {
                    Ok((embedding, _)) => node.embedding = Some(embedding),
                    Err(error) => {
                        tracing::warn!(node = id, "re-embedding deferred: {error}");
                        self.queue_backfill(id);
                    }
                }
            }
        }

        self.store.put_node(&node)?;
        self.index_node(&node);

        if body_changed && node.embedding.is_some() {
            self.run_similarity_pass(&node.id)?;
        }
        Ok(node)
    }

    /// Fetch a node, applying the forgetting curve
    ///
    /// A direct GET is a successful recall: stability grows using the
    /// pre-access retrievability and the access counters move. A persisted
    /// DORMANT lifecycle survives the read untouched.
    pub fn get_node(&self, id: &str) -> Result<MemoryNode> {
        let mut node = self.store.get_node(id)?;
        let now = self.now();

        let outcome = recall(&mut node.neural, node.lifecycle, now, DEFAULT_GRADE);
        node.lifecycle = outcome.lifecycle;
        self.store
            .raise_neural(id, &node.neural, node.lifecycle)?;
        Ok(node)
    }

    /// Delete a node, its edges, and its index entry
    pub fn delete_node(&self, id: &str) -> Result<()> {
        self.store.delete_node(id)?;
        self.bm25.write().expect("bm25 lock").remove(id);
        Ok(())
    }

    /// List nodes with transiently computed lifecycles
    ///
    /// Listing is a scan, not a recall: retrievability and the implied band
    /// are computed for display but nothing is persisted and stability does
    /// not grow.
    pub fn list_nodes(&self, filters: &NodeFilters, limit: usize) -> Result<Vec<MemoryNode>> {
        let now = self.now();
        let mut nodes = self.store.list_nodes(filters, limit)?;
        for node in &mut nodes {
            let elapsed = crate::clock::days_between(node.neural.last_accessed, now);
            let r = retrievability(node.neural.stability, elapsed);
            node.neural.retrievability = r;
            node.lifecycle = fsrs::read_lifecycle(node.lifecycle, r);
        }
        Ok(nodes)
    }

    // ========================================================================
    // EDGE OPERATIONS
    // ========================================================================

    /// Create a weighted edge between two stored nodes
    pub fn create_edge(
        &self,
        source: &str,
        target: &str,
        edge_type: EdgeType,
        creation_source: crate::memory::EdgeCreationSource,
        base_weight: Option<f64>,
    ) -> Result<MemoryEdge> {
        // Fail fast with NotFound instead of a generic constraint error
        self.store.get_node(source)?;
        self.store.get_node(target)?;

        let edge = match creation_source {
            crate::memory::EdgeCreationSource::User => {
                create_user_edge(source, target, edge_type, base_weight, self.now())?
            }
            _ => create_weighted_edge(
                source,
                target,
                edge_type,
                creation_source,
                base_weight,
                self.now(),
            ),
        };
        self.store.put_edge(&edge)?;
        Ok(edge)
    }

    /// Edges incident to a node, with lazy co-activation decay applied to
    /// the returned view (persisted during maintenance sweeps)
    pub fn get_edges_for(&self, node_id: &str, direction: Direction) -> Result<Vec<MemoryEdge>> {
        let now = self.now();
        let mut edges = self.store.edges_for(node_id, direction)?;
        for edge in &mut edges {
            touch_coactivation_decay(edge, now);
        }
        Ok(edges)
    }

    // ========================================================================
    // RETRIEVAL
    // ========================================================================

    /// The public retrieval call
    pub async fn search(&self, request: SearchRequest, cancel: &CancelToken) -> Result<SearchResponse> {
        if !(1..=100).contains(&request.limit) {
            return Err(EngramError::Validation(format!(
                "limit must be in 1..=100, got {}",
                request.limit
            )));
        }
        if request.query.trim().is_empty() {
            return Err(EngramError::Validation("query must not be empty".to_string()));
        }

        let started_at = self.now();
        let analysis = analyze_query(&request.query, started_at);
        let mut filters = request.filters.clone().unwrap_or_default();
        if filters.time_range.is_none() {
            filters.time_range = analysis.time_range;
        }

        match self
            .search_inner(&request, &analysis, &filters, started_at, cancel)
            .await
        {
            Ok(response) => Ok(response),
            Err(EngramError::Validation(message)) => Err(EngramError::Validation(message)),
            Err(EngramError::Cancelled) => Err(EngramError::Cancelled),
            Err(error) => {
                tracing::warn!("retrieval failed, taking lexical fallback: {error}");
                self.fallback_response(&request, &analysis, &filters, started_at)
            }
        }
    }

    async fn search_inner(
        &self,
        request: &SearchRequest,
        analysis: &QueryAnalysis,
        filters: &NodeFilters,
        started_at: DateTime<Utc>,
        cancel: &CancelToken,
    ) -> Result<SearchResponse> {
        let metrics_in = GraphMetrics::from_counts(
            self.store.count_nodes()?,
            self.store.count_edges()?,
        );
        let plan = budget::plan(
            &metrics_in,
            analysis.query_type,
            request.thoroughness,
            request.operation,
        );

        // Query embedding: skipped for purely temporal queries, degraded to
        // BM25-only when the chain cannot answer
        let mut disqualifier: Option<String> = None;
        let query_vector: Option<Vec<f32>> = if analysis.purely_temporal {
            disqualifier = Some("purely_temporal".to_string());
            None
        } else if plan.budget.max_api_calls == 0 {
            disqualifier = Some("api_budget".to_string());
            None
        } else {
            match &self.pipeline {
                None => {
                    disqualifier = Some("no_provider".to_string());
                    None
                }
                Some(pipeline) => match pipeline.embed_query(&analysis.original, cancel).await {
                    Ok(embedding) => Some(embedding.vector),
                    Err(EngramError::Cancelled) => return Err(EngramError::Cancelled),
                    Err(error) => {
                        tracing::warn!("query embedding failed, BM25-only seeding: {error}");
                        disqualifier = Some("provider_degraded".to_string());
                        None
                    }
                },
            }
        };
        let used_embeddings = query_vector.is_some();

        // Seeding pool from both modalities
        let pool = plan.limits.entry_points as usize * SEED_POOL_FACTOR;
        let seed_query = if analysis.cleaned.is_empty() {
            analysis.original.as_str()
        } else {
            analysis.cleaned.as_str()
        };
        let lexical: Vec<(String, f64)> = {
            let index = self.bm25.read().expect("bm25 lock");
            index
                .search(seed_query, filters, pool)
                .into_iter()
                .map(|hit| (hit.node_id, hit.score))
                .collect()
        };
        let dense: Vec<(String, f64)> = match &query_vector {
            Some(vector) => self
                .store
                .vector_search(&VectorQuery {
                    embedding: truncate_to(vector, COMPARISON_DIMENSIONS),
                    limit: pool,
                    min_score: 0.0,
                    filters: filters.clone(),
                })?
                .into_iter()
                .map(|hit| (hit.node_id, hit.score))
                .collect(),
            None => Vec::new(),
        };

        let threshold = if used_embeddings {
            self.hybrid.seed_threshold_dense
        } else {
            self.hybrid.seed_threshold_lexical
        };
        let seeds = fuse_seeds(
            &dense,
            &lexical,
            self.hybrid.dense_weight,
            self.hybrid.lexical_weight,
            threshold,
            plan.limits.entry_points as usize,
        );

        let qcs = QueryClassification {
            query_type: analysis.query_type,
            confidence: analysis.confidence,
            used_embeddings,
            disqualified: disqualifier.as_ref().map(|_| true),
            disqualifier_category: disqualifier,
        };

        // Empty seed set: an empty result, not an exhaustion
        if seeds.is_empty() {
            return Ok(SearchResponse {
                data: vec![],
                count: 0,
                metrics: SearchMetrics {
                    time_ms: (self.now() - started_at).num_milliseconds().max(0) as u64,
                    ..Default::default()
                },
                qcs,
                partial: None,
            });
        }

        // Cluster routing prunes the hop frontier
        let routing = match &query_vector {
            Some(vector) => route(vector, &self.clusters.centroids()),
            None => ClusterRouting {
                strategy: RoutingStrategy::AllClusters,
                clusters_to_search: vec![],
                affinities: vec![],
            },
        };

        // Spread activation
        let graph = StoreGraph::new(self.store.as_ref());
        let lexical_map: HashMap<String, f64> = lexical.iter().cloned().collect();
        let dense_map: HashMap<String, f64> = dense.iter().cloned().collect();
        let weights = self.signal_weights;
        let probe = move |activations: &ActivationMap| {
            // Cheap confidence probe over the signals already in hand;
            // recency/authority/affinity are left at zero, so this only
            // under-estimates and never terminates too early
            activations
                .iter()
                .map(|(id, activation)| {
                    let breakdown = SignalBreakdown {
                        semantic: dense_map.get(id).copied().unwrap_or(0.0),
                        lexical: lexical_map.get(id).copied().unwrap_or(0.0),
                        graph: *activation,
                        ..Default::default()
                    };
                    breakdown.composite(&weights)
                })
                .fold(0.0, f64::max)
        };

        let seeds_count = seeds.len();
        let clock = Arc::clone(&self.clock);
        let outcome = spread(
            &graph,
            SpreadParams {
                seeds,
                limits: plan.limits,
                budget: plan.budget,
                quality_target: plan.quality_target,
                routing: &routing,
                cancel,
                started_at,
            },
            &move || clock.now(),
            &probe,
        );

        self.assemble_response(
            request,
            filters,
            started_at,
            &plan,
            &routing,
            outcome,
            qcs,
            seeds_count,
            query_vector.as_deref(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_response(
        &self,
        request: &SearchRequest,
        filters: &NodeFilters,
        started_at: DateTime<Utc>,
        plan: &budget::BudgetPlan,
        routing: &ClusterRouting,
        outcome: SpreadOutcome,
        qcs: QueryClassification,
        seeds: usize,
        query_vector: Option<&[f32]>,
    ) -> Result<SearchResponse> {
        let now = self.now();
        let lexical_map: HashMap<String, f64> = {
            let index = self.bm25.read().expect("bm25 lock");
            index
                .search(&request.query, filters, outcome.activations.len().max(1))
                .into_iter()
                .map(|hit| (hit.node_id, hit.score))
                .collect()
        };

        // Candidate assembly: post-hoc filters, then the six signals
        let mut candidates: Vec<(MemoryNode, CandidateSignals)> = Vec::new();
        for (node_id, activation) in &outcome.activations {
            let Ok(node) = self.store.get_node(node_id) else {
                continue;
            };
            if !filters.matches(&node) {
                continue;
            }

            // Semantic: cosine between query and node embeddings over their
            // common Matryoshka prefix; zero when either is absent
            let semantic = match (&node.embedding, query_vector) {
                (Some(embedding), Some(query)) => {
                    let k = query.len().min(embedding.vector.len());
                    if k == 0 {
                        0.0
                    } else {
                        cosine_similarity(
                            &truncate_to(query, k),
                            &truncate_to(&embedding.vector, k),
                        )
                        .map(|sim| f64::from(sim).max(0.0))
                        .unwrap_or(0.0)
                    }
                }
                _ => 0.0,
            };
            let age_days = crate::clock::days_between(node.primary_timestamp(), now);
            let affinity = node
                .cluster_id
                .as_deref()
                .map(|c| routing.affinity_of(c))
                .unwrap_or(0.0);

            let breakdown = SignalBreakdown {
                semantic,
                lexical: lexical_map.get(node_id).copied().unwrap_or(0.0),
                graph: *activation,
                recency: crate::search::recency_signal(age_days),
                authority: crate::search::authority_signal(node.neural.access_count),
                affinity,
            };
            candidates.push((
                node.clone(),
                CandidateSignals {
                    node_id: node_id.clone(),
                    stability: node.neural.stability,
                    breakdown,
                },
            ));
        }

        let mut nodes_by_id: HashMap<String, MemoryNode> = candidates
            .iter()
            .map(|(node, _)| (node.id.clone(), node.clone()))
            .collect();
        let ranked = rank(
            candidates.into_iter().map(|(_, signals)| signals).collect(),
            &self.signal_weights,
            request.limit,
        );

        // Side effects on read: access counters, stability growth, session
        // recording, cluster access events
        let mut session = Session::start(started_at);
        let mut data: Vec<ScoredNode> = Vec::new();
        for ranked_candidate in ranked {
            let Some(mut node) = nodes_by_id.remove(&ranked_candidate.node_id) else {
                continue;
            };
            let outcome_recall = recall(&mut node.neural, node.lifecycle, now, DEFAULT_GRADE);
            node.lifecycle = outcome_recall.lifecycle;
            self.store
                .raise_neural(&node.id, &node.neural, node.lifecycle)?;
            session.record_access(&node.id, node.cluster_id.clone(), now);
            self.clusters
                .record_access(&node.id, node.cluster_id.as_deref());

            data.push(ScoredNode {
                node,
                score: ranked_candidate.score,
                breakdown: ranked_candidate.breakdown,
                primary_signal: ranked_candidate.primary_signal,
            });
        }
        if !data.is_empty() {
            self.store.put_session(&session)?;
        }

        let partial = if outcome.cancelled {
            let best = data.iter().map(|s| s.score).fold(0.0, f64::max);
            Some(BudgetExhaustion::new(
                ExhaustedResource::Cancelled,
                best,
                plan.quality_target.confidence,
                0.0,
            ))
        } else {
            outcome.exhaustion.clone()
        };

        let metrics = SearchMetrics {
            hops_executed: outcome.hops_executed,
            nodes_activated: outcome.activations.len(),
            seeds,
            time_ms: (now - started_at).num_milliseconds().max(0) as u64,
            used_fallback: false,
            routing_strategy: Some(routing.strategy),
            session_id: (!data.is_empty()).then(|| session.id.clone()),
        };

        let breakdowns: Vec<(String, SignalBreakdown)> = data
            .iter()
            .map(|scored| (scored.node.id.clone(), scored.breakdown))
            .collect();
        self.telemetry.record_search(&metrics, &breakdowns);

        Ok(SearchResponse {
            count: data.len(),
            data,
            metrics,
            qcs,
            partial,
        })
    }

    fn fallback_response(
        &self,
        request: &SearchRequest,
        analysis: &QueryAnalysis,
        filters: &NodeFilters,
        started_at: DateTime<Utc>,
    ) -> Result<SearchResponse> {
        let snapshot = self.store.list_nodes(&NodeFilters::default(), usize::MAX)?;
        let ids = substring_fallback(snapshot.iter(), &request.query, filters, request.limit);

        let mut data = Vec::new();
        for id in ids {
            if let Ok(node) = self.store.get_node(&id) {
                data.push(ScoredNode {
                    node,
                    score: 0.0,
                    breakdown: SignalBreakdown::default(),
                    primary_signal: Signal::Lexical,
                });
            }
        }

        let metrics = SearchMetrics {
            time_ms: (self.now() - started_at).num_milliseconds().max(0) as u64,
            used_fallback: true,
            ..Default::default()
        };
        self.telemetry.record_search(&metrics, &[]);

        Ok(SearchResponse {
            count: data.len(),
            data,
            metrics,
            qcs: QueryClassification {
                query_type: analysis.query_type,
                confidence: analysis.confidence,
                used_embeddings: false,
                disqualified: Some(true),
                disqualifier_category: Some("fallback".to_string()),
            },
            partial: None,
        })
    }

    // ========================================================================
    // ENGAGEMENT
    // ========================================================================

    /// Signal dwell on a node returned by a previous retrieval
    ///
    /// Dwell at or above 5 seconds counts as engaged. Every edge between the
    /// node and the other nodes accessed in the same session records the
    /// activation; provisional edges may promote. Writes go through the
    /// per-edge CAS and retry on contention.
    pub fn record_engagement(
        &self,
        session_id: &str,
        node_id: &str,
        dwell_seconds: u64,
    ) -> Result<()> {
        let session = self.store.get_session(session_id)?;
        let engaged = dwell_seconds >= ENGAGED_DWELL_SECONDS;
        let now = self.now();

        let peers: Vec<&str> = session
            .accesses
            .iter()
            .map(|a| a.node_id.as_str())
            .filter(|id| *id != node_id)
            .collect();

        let edges = self.store.edges_for(node_id, Direction::Both)?;
        for edge in edges {
            let Some(far) = edge.other_end(node_id) else {
                continue;
            };
            if !peers.contains(&far) {
                continue;
            }
            self.activate_edge_cas(&edge.id, engaged, now)?;
        }
        Ok(())
    }

    /// CAS retry loop around `record_activation`
    fn activate_edge_cas(&self, edge_id: &str, engaged: bool, now: DateTime<Utc>) -> Result<()> {
        const MAX_RETRIES: u32 = 8;
        for _ in 0..MAX_RETRIES {
            let mut edge = self.store.get_edge(edge_id)?;
            let expected = edge.version;
            touch_coactivation_decay(&mut edge, now);
            record_activation(&mut edge, engaged, now);
            if self.store.compare_and_swap_edge(edge_id, expected, &edge)? {
                return Ok(());
            }
        }
        Err(EngramError::TransientIo(format!(
            "edge {edge_id} stayed contended through {MAX_RETRIES} CAS attempts"
        )))
    }

    // ========================================================================
    // SESSIONS AND TEMPORAL EDGES
    // ========================================================================

    /// Close a session and derive its temporal edges
    ///
    /// Within-session adjacency first, then continuation edges against the
    /// recent sessions whose clusters overlap inside the 24-hour window.
    pub fn close_session(&self, session_id: &str) -> Result<usize> {
        let mut session = self.store.get_session(session_id)?;
        session.close();
        self.store.put_session(&session)?;

        let mut edges = crate::weights::session_adjacency_edges(&session);
        for earlier in self.store.recent_sessions(RECENT_SESSION_WINDOW)? {
            if earlier.id == session.id {
                continue;
            }
            edges.extend(crate::weights::continuation_edges(&earlier, &session));
        }

        let mut created = 0;
        for edge in edges {
            if self.store.put_edge(&edge).is_ok() {
                created += 1;
            }
        }
        Ok(created)
    }

    // ========================================================================
    // MAINTENANCE SWEEPS
    // ========================================================================

    /// Recompute lifecycle bands from retrievability and persist demotions
    ///
    /// Promotion never happens here; only an explicit patch reactivates.
    pub fn run_decay_sweep(&self) -> Result<u64> {
        let now = self.now();
        let nodes = self.store.list_nodes(&NodeFilters::default(), usize::MAX)?;
        let mut demoted = 0;

        for node in nodes {
            if !matches!(node.lifecycle, Lifecycle::Active | Lifecycle::Weak) {
                continue;
            }
            let elapsed = crate::clock::days_between(node.neural.last_accessed, now);
            let r = retrievability(node.neural.stability, elapsed);
            let band = fsrs::lifecycle_band(r);
            let demotion = matches!(
                (node.lifecycle, band),
                (Lifecycle::Active, Lifecycle::Weak)
                    | (Lifecycle::Active, Lifecycle::Dormant)
                    | (Lifecycle::Weak, Lifecycle::Dormant)
            );
            if demotion {
                let mut neural = node.neural.clone();
                neural.retrievability = r;
                self.store.raise_neural(&node.id, &neural, band)?;
                demoted += 1;
            }
        }
        if demoted > 0 {
            tracing::info!(demoted, "decay sweep demoted nodes");
        }
        Ok(demoted)
    }

    /// Expire provisional edges and persist co-activation time decay
    pub fn run_edge_maintenance(&self) -> Result<u64> {
        let now = self.now();
        let mut removed = 0;

        for edge in self.store.all_edges()? {
            if !expire_or_promote(&edge, now) {
                self.store.delete_edge(&edge.id)?;
                removed += 1;
                continue;
            }
            let mut decayed = edge.clone();
            if touch_coactivation_decay(&mut decayed, now) > 0 {
                // Best effort: a concurrent writer already decayed or
                // strengthened the edge, skip it this sweep
                let _ = self
                    .store
                    .compare_and_swap_edge(&edge.id, edge.version, &decayed)?;
            }
        }
        if removed > 0 {
            tracing::info!(removed, "edge maintenance expired provisional edges");
        }
        Ok(removed)
    }

    /// Compare a node's fresh embedding to recent peers; create/refresh
    /// similarity edges, mark stale ones, report dedup candidates
    pub fn run_similarity_pass(&self, node_id: &str) -> Result<Vec<String>> {
        let node = self.store.get_node(node_id)?;
        let Some(embedding) = &node.embedding else {
            return Ok(vec![]);
        };

        let peers = self.store.recent_embedded_nodes(RECENT_NODE_WINDOW + 1)?;
        let existing: Vec<MemoryEdge> = self
            .store
            .edges_for(node_id, Direction::Both)?
            .into_iter()
            .filter(|e| e.edge_type == EdgeType::SimilarTo)
            .collect();

        let review = review_embedding(node_id, &embedding.vector, &peers, &existing);

        for peer in &review.edges_to_upsert {
            match existing
                .iter()
                .find(|e| e.other_end(node_id) == Some(peer.node_id.as_str()))
            {
                Some(edge) => {
                    // Refresh the base weight to the new similarity
                    let mut refreshed = edge.clone();
                    refreshed.weights.base_weight = peer.similarity;
                    let _ = self
                        .store
                        .compare_and_swap_edge(&edge.id, edge.version, &refreshed)?;
                }
                None => {
                    let edge = create_weighted_edge(
                        node_id,
                        peer.node_id.clone(),
                        EdgeType::SimilarTo,
                        crate::memory::EdgeCreationSource::Similarity,
                        Some(peer.similarity),
                        self.now(),
                    );
                    self.store.put_edge(&edge)?;
                }
            }
        }
        for stale_id in &review.stale_edge_ids {
            self.store.delete_edge(stale_id)?;
        }

        Ok(review
            .dedup_candidates
            .into_iter()
            .map(|peer| peer.node_id)
            .collect())
    }

    /// Compress eligible dormant nodes into a summary node
    ///
    /// Importance is approximated by the authority signal (saturating
    /// access count); pinned and starred nodes are exempt regardless.
    pub fn run_compression_pass(&self) -> Result<u64> {
        let now = self.now();
        let dormant = self.store.list_nodes(
            &NodeFilters {
                lifecycle: Some(vec![Lifecycle::Dormant]),
                ..Default::default()
            },
            usize::MAX,
        )?;

        let mut compressed = 0;
        for node in dormant {
            let edges = self.store.edges_for(&node.id, Direction::Both)?;
            let importance = crate::search::authority_signal(node.neural.access_count);
            if compression_eligibility(&node, importance, &edges, now)
                != CompressionDecision::Eligible
            {
                continue;
            }

            let candidate = build_candidate(&node, &edges);
            let summary_body = node.summary.clone().unwrap_or_else(|| node.title.clone());

            // The fold removes the body; the edit record is what restore
            // reads back within the restorability window
            let edit = EditRecord::body_change(
                node.id.clone(),
                serde_json::json!({ "body": &node.body, "blocks": &node.blocks }),
                serde_json::json!({ "body": null }),
                "compaction",
                now,
            );
            self.store.record_edit(&edit)?;

            // The summary node that absorbs the original
            let defaults = neural_defaults(crate::memory::NodeType::Summary, None);
            let summary = MemoryNode {
                id: new_node_id(),
                node_type: crate::memory::NodeType::Summary,
                subtype: Some("compression".to_string()),
                title: format!("Summary of {}", node.title),
                summary: Some(summary_body.clone()),
                body: Some(summary_body),
                blocks: None,
                tags: node.tags.clone(),
                participants: node.participants.clone(),
                embedding: node.embedding.clone(),
                neural: NeuralState::new(defaults.stability, defaults.difficulty, now),
                lifecycle: Lifecycle::Active,
                extraction_depth: node.extraction_depth,
                temporal: node.temporal.clone(),
                provenance: Provenance {
                    source: format!("compression:{}", node.id),
                    source_type: Some("compression".to_string()),
                    source_episode: None,
                    chunk_position: None,
                    created_at: now,
                    confidence: node.provenance.confidence,
                    encrypted_payload: None,
                    encryption_tier: None,
                },
                sync: SyncState::initial(now, "compaction"),
                compression: None,
                cluster_id: node.cluster_id.clone(),
                pinned: false,
                starred: false,
            };
            self.store.put_node(&summary)?;
            self.index_node(&summary);

            // The summary inherits the strongest original connection
            if let Some(weight) = candidate.inherited_weight {
                if let Some(record) = candidate
                    .records
                    .iter()
                    .find(|r| (r.original_weight - weight).abs() < f64::EPSILON)
                {
                    let inherited = create_weighted_edge(
                        summary.id.clone(),
                        record.target.clone(),
                        crate::memory::EdgeType::Summarizes,
                        crate::memory::EdgeCreationSource::Extraction,
                        Some(weight),
                        now,
                    );
                    let _ = self.store.put_edge(&inherited);
                }
            }

            // Fold the original: body replaced by the summary reference
            let mut folded = node.clone();
            folded.body = None;
            folded.blocks = None;
            folded.lifecycle = Lifecycle::Compressed;
            folded.compression = Some(crate::memory::CompressionState {
                compressed_into: summary.id.clone(),
                compressed_at: now,
                restorable_until: restorable_until(now),
            });
            folded.sync.version += 1;
            folded.sync.last_modified = now;
            self.store.put_node(&folded)?;
            self.index_node(&folded);

            compressed += 1;
        }
        if compressed > 0 {
            tracing::info!(compressed, "compression pass folded nodes");
        }
        Ok(compressed)
    }

    /// Restore a compressed node while its window is open
    pub fn restore_node(&self, id: &str) -> Result<MemoryNode> {
        let mut node = self.store.get_node(id)?;
        let Some(compression) = node.compression.clone() else {
            return Err(EngramError::Validation(format!("node {id} is not compressed")));
        };
        if !crate::weights::restore_window_open(compression.restorable_until, self.now()) {
            return Err(EngramError::Validation(format!(
                "node {id} is past its restorable window"
            )));
        }

        let edits = self.store.edits_for(id, 1)?;
        node.body = edits
            .first()
            .and_then(|edit| edit.before.get("body"))
            .and_then(|body| body.as_str())
            .map(|s| s.to_string());
        node.compression = None;
        node.lifecycle = Lifecycle::Dormant;
        node.sync.version += 1;
        node.sync.last_modified = self.now();
        self.store.put_node(&node)?;
        self.index_node(&node);
        Ok(node)
    }

    /// Queue nodes whose embeddings are stale for re-embedding
    ///
    /// Triggers: missing embedding, context hash drift, or a provisional
    /// embedding once the primary provider answers again. Queued nodes are
    /// processed by `run_embedding_backfill`.
    pub async fn run_reembedding_sweep(&self) -> Result<usize> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(0);
        };
        let primary_healthy = pipeline.retry_manager().primary_is_healthy().await;

        let mut queued = 0;
        for node in self.store.list_nodes(&NodeFilters::default(), usize::MAX)? {
            let context = self.context_for(&node);
            let kind = crate::embeddings::ContextKind::select(
                node.node_type,
                node.provenance.source_type.as_deref(),
            );
            let built =
                crate::embeddings::build_context(kind, &context, &node.searchable_text());
            if EmbeddingPipeline::needs_reembedding(&node, &built.hash, primary_healthy, false) {
                self.queue_backfill(&node.id);
                queued += 1;
            }
        }
        if queued > 0 {
            tracing::info!(queued, "re-embedding sweep queued stale embeddings");
        }
        Ok(queued)
    }

    /// Drain the embedding backfill queue, embedding up to `batch` nodes
    pub async fn run_embedding_backfill(&self, batch: usize) -> Result<usize> {
        let Some(pipeline) = &self.pipeline else {
            return Ok(0);
        };
        let mut processed = 0;

        while processed < batch {
            let Some(node_id) = self.backfill.lock().expect("backfill lock").pop_front() else {
                break;
            };
            let Ok(mut node) = self.store.get_node(&node_id) else {
                continue;
            };
            let context = self.context_for(&node);
            match pipeline
                .embed_node(&node, &context, &CancelToken::new())
                .await
            {
                Ok((embedding, _)) => {
                    node.embedding = Some(embedding);
                    self.store.put_node(&node)?;
                    self.run_similarity_pass(&node_id)?;
                    processed += 1;
                }
                Err(error) => {
                    tracing::warn!(node = node_id.as_str(), "backfill embedding failed: {error}");
                    self.queue_backfill(&node_id);
                    break;
                }
            }
        }
        Ok(processed)
    }

    /// Queue a node for low-priority embedding; overflow drops the oldest
    fn queue_backfill(&self, node_id: &str) {
        let mut queue = self.backfill.lock().expect("backfill lock");
        if queue.len() >= BACKFILL_QUEUE_CAPACITY {
            let dropped = queue.pop_front();
            tracing::warn!(?dropped, "backfill queue full, dropping oldest");
        }
        queue.push_back(node_id.to_string());
    }

    fn context_for(&self, node: &MemoryNode) -> ContextInput {
        let cluster = node.cluster_id.as_ref().and_then(|id| {
            self.clusters
                .centroids()
                .into_iter()
                .find(|c| &c.id == id)
        });
        // Extraction provenance: resolve the source episode's title so the
        // prefix carries where the concept came from
        let source_episode_title = node
            .provenance
            .source_episode
            .as_deref()
            .and_then(|episode_id| self.store.get_node(episode_id).ok())
            .map(|episode| episode.title);

        ContextInput {
            title: node.title.clone(),
            cluster_name: cluster.as_ref().map(|c| c.name.clone()),
            cluster_description: None,
            cluster_keywords: vec![],
            source_episode_title,
            chunk_position: node
                .provenance
                .chunk_position
                .map(|position| (position.index, position.total)),
            event_time: node.temporal.event.as_ref().map(|e| e.timestamp),
            participants: node.participants.clone(),
        }
    }

    // ========================================================================
    // STATISTICS
    // ========================================================================

    /// Aggregate statistics over the graph
    pub fn stats(&self) -> Result<MemoryStats> {
        let nodes = self.store.list_nodes(&NodeFilters::default(), usize::MAX)?;
        let mut stats = MemoryStats {
            total_nodes: nodes.len() as i64,
            total_edges: self.store.count_edges()? as i64,
            ..Default::default()
        };
        for node in &nodes {
            match node.lifecycle {
                Lifecycle::Active => stats.active_nodes += 1,
                Lifecycle::Weak => stats.weak_nodes += 1,
                Lifecycle::Dormant => stats.dormant_nodes += 1,
                Lifecycle::Compressed | Lifecycle::Restorable => stats.compressed_nodes += 1,
            }
            if node.embedding.is_some() {
                stats.nodes_with_embeddings += 1;
            }
            let created = node.provenance.created_at;
            stats.oldest_node = Some(stats.oldest_node.map_or(created, |t| t.min(created)));
            stats.newest_node = Some(stats.newest_node.map_or(created, |t| t.max(created)));
        }
        Ok(stats)
    }

    /// Graph metrics for budgeting
    pub fn graph_metrics(&self) -> Result<GraphMetrics> {
        Ok(GraphMetrics::from_counts(
            self.store.count_nodes()?,
            self.store.count_edges()?,
        ))
    }

    /// Rebuild the lexical index from the store (startup)
    pub fn rebuild_index(&self) -> Result<usize> {
        let nodes = self.store.list_nodes(&NodeFilters::default(), usize::MAX)?;
        let count = nodes.len();
        for node in &nodes {
            self.index_node(node);
        }
        tracing::info!(count, "lexical index rebuilt");
        Ok(count)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{EmbeddingProvider, ProviderError, ProviderTier, RetryManager, RetryPolicy};
    use crate::clock::FakeClock;
    use crate::memory::CreateNodeInput;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use chrono::{Duration, TimeZone};

    /// Deterministic provider: one axis per vocabulary word
    struct KeywordProvider;

    const VOCAB: &[&str] = &["rust", "ownership", "cooking", "pasta", "kubernetes", "incident"];

    #[async_trait]
    impl EmbeddingProvider for KeywordProvider {
        async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
            Ok(texts
                .iter()
                .map(|text| {
                    let lower = text.to_lowercase();
                    VOCAB
                        .iter()
                        .map(|word| lower.matches(word).count() as f32)
                        .collect()
                })
                .collect())
        }

        fn model_id(&self) -> &str {
            "keyword-test-model"
        }

        fn dimensions(&self) -> usize {
            VOCAB.len()
        }
    }

    fn test_clock() -> Arc<FakeClock> {
        Arc::new(FakeClock::at(
            Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap(),
        ))
    }

    fn engine_with_embeddings(clock: Arc<FakeClock>) -> MemoryEngine {
        let retry = Arc::new(RetryManager::new(
            vec![(ProviderTier::Primary, Arc::new(KeywordProvider) as _)],
            RetryPolicy::default(),
        ));
        let pipeline = Arc::new(EmbeddingPipeline::new(retry, clock.clone()));
        MemoryEngine::new(Arc::new(MemoryStore::new()), clock).with_pipeline(pipeline)
    }

    fn engine_without_embeddings(clock: Arc<FakeClock>) -> MemoryEngine {
        MemoryEngine::new(Arc::new(MemoryStore::new()), clock)
    }

    fn input(title: &str, body: &str) -> CreateNodeInput {
        CreateNodeInput {
            node_type: crate::memory::NodeType::Concept,
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
            cluster_id: None,
            extraction_depth: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_create_embeds_and_indexes() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        let node = engine
            .create_node(input("Rust ownership", "ownership and borrowing in rust"))
            .await
            .unwrap();

        assert!(node.embedding.is_some());
        let embedding = node.embedding.as_ref().unwrap();
        assert_eq!(embedding.version, 1);
        assert!(!embedding.provisional);
        assert!(!embedding.context_prefix.is_empty());
        assert!(node.blocks.is_some());
    }

    #[tokio::test]
    async fn test_episode_prefix_carries_participants_and_event_time() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock.clone());

        let mut episode = input("Planning sync", "discussed the rust migration");
        episode.node_type = crate::memory::NodeType::Episode;
        episode.participants = vec!["Ada".to_string(), "Lin".to_string()];
        episode.event = Some(crate::memory::EventTime {
            timestamp: clock.now(),
            confidence: 0.9,
            source: crate::memory::EventTimeSource::Explicit,
        });

        let node = engine.create_node(episode).await.unwrap();
        let prefix = &node.embedding.as_ref().unwrap().context_prefix;
        assert!(prefix.contains("Planning sync"));
        assert!(prefix.contains("Ada, Lin"));
        assert!(prefix.contains("2026-06-01"));
    }

    #[tokio::test]
    async fn test_extracted_concept_prefix_names_source_episode() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        let mut episode = input("Incident review", "kubernetes outage walkthrough");
        episode.node_type = crate::memory::NodeType::Episode;
        let episode = engine.create_node(episode).await.unwrap();

        let mut concept = input("Rollback procedure", "how we roll deployments back");
        concept.source_episode = Some(episode.id.clone());
        let concept = engine.create_node(concept).await.unwrap();

        let prefix = &concept.embedding.as_ref().unwrap().context_prefix;
        assert!(prefix.contains("extracted from \"Incident review\""));
    }

    #[tokio::test]
    async fn test_chunk_prefix_carries_position() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        let mut chunk = input("Q3 report", "revenue grew across segments");
        chunk.node_type = crate::memory::NodeType::Archive;
        chunk.source_type = Some("chunk".to_string());
        chunk.chunk_position = Some(crate::memory::ChunkPosition { index: 1, total: 5 });

        let node = engine.create_node(chunk).await.unwrap();
        let prefix = &node.embedding.as_ref().unwrap().context_prefix;
        assert!(prefix.contains("chunk 2 of 5"));
    }

    #[tokio::test]
    async fn test_get_node_grows_stability_and_preserves_dormant() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock.clone());

        let node = engine.create_node(input("decay target", "some body")).await.unwrap();
        let s0 = node.neural.stability;

        // Force the node dormant, as a decay sweep would
        engine
            .update_node(
                &node.id,
                UpdateNodePatch {
                    lifecycle: Some(Lifecycle::Dormant),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        clock.advance(Duration::days(30));
        let fetched = engine.get_node(&node.id).unwrap();

        // Stability grew from the recall but DORMANT stuck
        assert!(fetched.neural.stability >= s0);
        assert_eq!(fetched.lifecycle, Lifecycle::Dormant);
        assert_eq!(engine.store().get_node(&node.id).unwrap().lifecycle, Lifecycle::Dormant);

        // An explicit patch is the one path back to ACTIVE
        let reactivated = engine
            .update_node(
                &node.id,
                UpdateNodePatch {
                    lifecycle: Some(Lifecycle::Active),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(reactivated.lifecycle, Lifecycle::Active);
    }

    #[tokio::test]
    async fn test_body_update_records_edit() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock);

        let node = engine.create_node(input("editable", "original body")).await.unwrap();
        engine
            .update_node(
                &node.id,
                UpdateNodePatch {
                    body: Some("replaced body".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let edits = engine.store().edits_for(&node.id, 10).unwrap();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].before["body"], "original body");
        assert_eq!(edits[0].after["body"], "replaced body");
    }

    #[tokio::test]
    async fn test_search_semantic_only_match() {
        // A query that shares no words with the node's title/body tokens in
        // the lexical sense still finds it through the dense channel
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        engine
            .create_node(input("Ownership rules", "rust ownership borrowing"))
            .await
            .unwrap();
        engine
            .create_node(input("Dinner plans", "cooking pasta tonight"))
            .await
            .unwrap();

        let response = engine
            .search(
                SearchRequest {
                    query: "rust ownership".to_string(),
                    filters: None,
                    limit: 5,
                    thoroughness: None,
                    operation: None,
                },
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert!(response.count >= 1);
        assert_eq!(response.data[0].node.title, "Ownership rules");
        assert!(response.qcs.used_embeddings);
        assert!(response.data[0].breakdown.semantic > 0.5);
        // Signals stay in the unit interval
        for scored in &response.data {
            assert!((0.0..=1.0).contains(&scored.score));
        }
    }

    #[tokio::test]
    async fn test_search_respects_limit_bounds() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock);

        for limit in [0, 101] {
            let err = engine
                .search(
                    SearchRequest {
                        query: "anything".to_string(),
                        filters: None,
                        limit,
                        thoroughness: None,
                        operation: None,
                    },
                    &CancelToken::new(),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, EngramError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_search_empty_seeds_returns_empty() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock);
        engine.create_node(input("unrelated", "nothing to see")).await.unwrap();

        let response = engine
            .search(
                SearchRequest {
                    query: "zzz qqq www".to_string(),
                    filters: None,
                    limit: 5,
                    thoroughness: None,
                    operation: None,
                },
                &CancelToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(response.count, 0);
        assert!(response.partial.is_none());
        assert!(!response.qcs.used_embeddings);
    }

    #[tokio::test]
    async fn test_search_writes_access_side_effects() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        let node = engine
            .create_node(input("Kubernetes incident", "kubernetes incident postmortem"))
            .await
            .unwrap();
        let s0 = engine.store().get_node(&node.id).unwrap().neural.stability;

        let response = engine
            .search(
                SearchRequest {
                    query: "kubernetes incident".to_string(),
                    filters: None,
                    limit: 5,
                    thoroughness: None,
                    operation: None,
                },
                &CancelToken::new(),
            )
            .await
            .unwrap();
        assert!(response.count >= 1);
        assert!(response.metrics.session_id.is_some());

        let after = engine.store().get_node(&node.id).unwrap();
        assert!(after.neural.stability >= s0);
        assert_eq!(after.neural.access_count, 1);
    }

    #[tokio::test]
    async fn test_engagement_promotes_provisional_edge() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let a = engine.create_node(input("a", "alpha")).await.unwrap();
        let b = engine.create_node(input("b", "beta")).await.unwrap();
        let edge = engine
            .create_edge(
                &a.id,
                &b.id,
                EdgeType::TemporalAdjacent,
                crate::memory::EdgeCreationSource::Temporal,
                None,
            )
            .unwrap();
        assert_eq!(edge.status, crate::memory::EdgeStatus::Provisional);

        // A session in which both nodes were accessed
        let mut session = Session::start(clock.now());
        session.record_access(&a.id, None, clock.now());
        session.record_access(&b.id, None, clock.now());
        engine.store().put_session(&session).unwrap();

        for _ in 0..3 {
            engine.record_engagement(&session.id, &a.id, 6).unwrap();
        }

        let promoted = engine.store().get_edge(&edge.id).unwrap();
        assert_eq!(promoted.status, crate::memory::EdgeStatus::Confirmed);
        assert!(promoted.weights.coactivation_bonus > 0.0);
    }

    #[tokio::test]
    async fn test_short_dwell_counts_as_ignored() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let a = engine.create_node(input("a", "alpha")).await.unwrap();
        let b = engine.create_node(input("b", "beta")).await.unwrap();
        let edge = engine
            .create_edge(
                &a.id,
                &b.id,
                EdgeType::RelatesTo,
                crate::memory::EdgeCreationSource::Extraction,
                Some(0.5),
            )
            .unwrap();

        let mut session = Session::start(clock.now());
        session.record_access(&a.id, None, clock.now());
        session.record_access(&b.id, None, clock.now());
        engine.store().put_session(&session).unwrap();

        engine.record_engagement(&session.id, &a.id, 2).unwrap();
        let after = engine.store().get_edge(&edge.id).unwrap();
        assert_eq!(after.neural.consecutive_ignored, 1);
        assert_eq!(after.weights.coactivation_bonus, 0.0);
    }

    #[tokio::test]
    async fn test_close_session_creates_temporal_edges() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let a = engine.create_node(input("a", "alpha")).await.unwrap();
        let b = engine.create_node(input("b", "beta")).await.unwrap();

        let mut session = Session::start(clock.now());
        session.record_access(&a.id, None, clock.now());
        session.record_access(&b.id, None, clock.now() + Duration::minutes(10));
        engine.store().put_session(&session).unwrap();

        let created = engine.close_session(&session.id).unwrap();
        assert_eq!(created, 1);

        let edges = engine.store().edges_for(&a.id, Direction::Both).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::TemporalAdjacent);
    }

    #[tokio::test]
    async fn test_close_session_derives_continuation_edges() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let mut input_a = input("morning topic", "alpha");
        input_a.cluster_id = Some("cluster-x".to_string());
        let mut input_b = input("evening topic", "beta");
        input_b.cluster_id = Some("cluster-x".to_string());
        let a = engine.create_node(input_a).await.unwrap();
        let b = engine.create_node(input_b).await.unwrap();

        let mut morning = Session::start(clock.now());
        morning.record_access(&a.id, Some("cluster-x".to_string()), clock.now());
        engine.store().put_session(&morning).unwrap();
        engine.close_session(&morning.id).unwrap();

        clock.advance(Duration::hours(8));
        let mut evening = Session::start(clock.now());
        evening.record_access(&b.id, Some("cluster-x".to_string()), clock.now());
        engine.store().put_session(&evening).unwrap();

        let created = engine.close_session(&evening.id).unwrap();
        assert_eq!(created, 1);

        let edges = engine.store().edges_for(&b.id, Direction::Both).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].edge_type, EdgeType::TemporalContinuation);
        assert!((edges[0].weights.base_weight - 0.30).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_decay_sweep_demotes_but_never_promotes() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let node = engine.create_node(input("fading", "old knowledge")).await.unwrap();
        clock.advance(Duration::days(120));

        let demoted = engine.run_decay_sweep().unwrap();
        assert_eq!(demoted, 1);
        let after = engine.store().get_node(&node.id).unwrap();
        assert_eq!(after.lifecycle, Lifecycle::Dormant);

        // A second sweep leaves it alone
        assert_eq!(engine.run_decay_sweep().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_compression_and_restore_round_trip() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let node = engine
            .create_node(input("ancient standup", "routine status notes"))
            .await
            .unwrap();

        // Long-dormant and unimportant
        engine
            .update_node(
                &node.id,
                UpdateNodePatch {
                    lifecycle: Some(Lifecycle::Dormant),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        clock.advance(Duration::days(90));

        let compressed = engine.run_compression_pass().unwrap();
        assert_eq!(compressed, 1);

        let folded = engine.store().get_node(&node.id).unwrap();
        assert_eq!(folded.lifecycle, Lifecycle::Compressed);
        assert!(folded.body.is_none());
        let state = folded.compression.as_ref().unwrap();
        assert!(engine.store().get_node(&state.compressed_into).is_ok());

        // Restore within the window brings the body back
        let restored = engine.restore_node(&node.id).unwrap();
        assert_eq!(restored.body.as_deref(), Some("routine status notes"));
        assert_eq!(restored.lifecycle, Lifecycle::Dormant);

        // Pinned nodes are never compressed
        let pinned = engine.create_node(input("pinned", "keep me")).await.unwrap();
        engine
            .update_node(
                &pinned.id,
                UpdateNodePatch {
                    lifecycle: Some(Lifecycle::Dormant),
                    pinned: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        clock.advance(Duration::days(90));
        engine.run_compression_pass().unwrap();
        assert_eq!(
            engine.store().get_node(&pinned.id).unwrap().lifecycle,
            Lifecycle::Dormant
        );
    }

    #[tokio::test]
    async fn test_edge_maintenance_expires_provisional() {
        let clock = test_clock();
        let engine = engine_without_embeddings(clock.clone());

        let a = engine.create_node(input("a", "alpha")).await.unwrap();
        let b = engine.create_node(input("b", "beta")).await.unwrap();
        engine
            .create_edge(
                &a.id,
                &b.id,
                EdgeType::TemporalAdjacent,
                crate::memory::EdgeCreationSource::Temporal,
                None,
            )
            .unwrap();

        clock.advance(Duration::days(31));
        let removed = engine.run_edge_maintenance().unwrap();
        assert_eq!(removed, 1);
        assert_eq!(engine.store().count_edges().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reembedding_sweep_skips_fresh_embeddings() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        engine
            .create_node(input("stable", "rust ownership notes"))
            .await
            .unwrap();

        // Fresh primary embedding with an unchanged context: nothing to do
        assert_eq!(engine.run_reembedding_sweep().await.unwrap(), 0);
        assert_eq!(engine.run_embedding_backfill(10).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_similarity_pass_creates_edges() {
        let clock = test_clock();
        let engine = engine_with_embeddings(clock);

        // Vocabulary counts put the pair at cosine ~0.94: inside the edge
        // band, below the dedup threshold
        engine
            .create_node(input("Alpha", "rust rust rust rust ownership"))
            .await
            .unwrap();
        let second = engine
            .create_node(input("Beta", "rust rust rust ownership ownership"))
            .await
            .unwrap();

        let edges = engine.store().edges_for(&second.id, Direction::Both).unwrap();
        assert!(edges.iter().any(|e| e.edge_type == EdgeType::SimilarTo));
        let similar = edges
            .iter()
            .find(|e| e.edge_type == EdgeType::SimilarTo)
            .unwrap();
        assert!(similar.weights.base_weight >= 0.90);
        assert!(similar.weights.base_weight < 0.95);
    }
}
