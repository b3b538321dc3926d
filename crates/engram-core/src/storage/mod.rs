//! Storage adapters
//!
//! The engine is library-shaped: a durable ordered store is assumed and
//! abstracted behind `StorageAdapter`. Two implementations ship here - a
//! SQLite adapter for durability and an in-memory adapter that backs unit
//! tests and small graphs.

mod memory_store;
mod migrations;
mod sqlite;

pub use memory_store::MemoryStore;
pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::memory::{
    Direction, EditRecord, Lifecycle, MemoryEdge, MemoryNode, NeuralState, NodeFilters, Session,
};

// ============================================================================
// VECTOR SEARCH TYPES
// ============================================================================

/// A dense similarity query against the store
#[derive(Debug, Clone)]
pub struct VectorQuery {
    /// Query vector
    pub embedding: Vec<f32>,
    /// Maximum hits
    pub limit: usize,
    /// Minimum similarity score
    pub min_score: f64,
    /// Node filters applied before scoring
    pub filters: NodeFilters,
}

/// A dense similarity hit
#[derive(Debug, Clone)]
pub struct VectorHit {
    /// Matching node id
    pub node_id: String,
    /// Node type
    pub node_type: crate::memory::NodeType,
    /// Node title
    pub title: String,
    /// Node summary
    pub summary: Option<String>,
    /// Cosine distance (1 - score)
    pub distance: f64,
    /// Cosine similarity in [0, 1]
    pub score: f64,
}

// ============================================================================
// ADAPTER TRAIT
// ============================================================================

/// The durable store the engine runs against
///
/// Reads require no lock from the caller's perspective; each retrieval sees
/// a consistent snapshot. Edge writes go through compare-and-swap on the
/// stored version so concurrent weight updates never clobber each other.
/// Node neural updates go through `raise_neural`, which keeps the higher
/// stability rather than last-write-wins.
pub trait StorageAdapter: Send + Sync {
    // ---- nodes ----

    /// Insert or replace a node
    fn put_node(&self, node: &MemoryNode) -> Result<()>;

    /// Fetch a node; `NotFound` when absent, never a silent default
    fn get_node(&self, id: &str) -> Result<MemoryNode>;

    /// Delete a node, cascading its edges
    fn delete_node(&self, id: &str) -> Result<()>;

    /// List nodes matching the filters, newest first
    fn list_nodes(&self, filters: &NodeFilters, limit: usize) -> Result<Vec<MemoryNode>>;

    /// The most recently embedded nodes, newest first: (id, vector)
    fn recent_embedded_nodes(&self, window: usize) -> Result<Vec<(String, Vec<f32>)>>;

    /// Total node count
    fn count_nodes(&self) -> Result<u64>;

    /// Merge neural state, keeping the higher stability
    ///
    /// Two concurrent recalls must resolve to the larger grown stability,
    /// never a lost update.
    fn raise_neural(&self, id: &str, candidate: &NeuralState, lifecycle: Lifecycle) -> Result<()>;

    // ---- edges ----

    /// Insert a new edge (version 0)
    fn put_edge(&self, edge: &MemoryEdge) -> Result<()>;

    /// Fetch an edge; `NotFound` when absent
    fn get_edge(&self, id: &str) -> Result<MemoryEdge>;

    /// Delete an edge
    fn delete_edge(&self, id: &str) -> Result<()>;

    /// Edges incident to a node in the given direction
    fn edges_for(&self, node_id: &str, direction: Direction) -> Result<Vec<MemoryEdge>>;

    /// Every edge, for maintenance sweeps
    fn all_edges(&self) -> Result<Vec<MemoryEdge>>;

    /// Compare-and-swap an edge on its stored version
    ///
    /// Returns false (and writes nothing) when the stored version moved;
    /// the caller re-reads and retries.
    fn compare_and_swap_edge(
        &self,
        id: &str,
        expected_version: u64,
        edge: &MemoryEdge,
    ) -> Result<bool>;

    /// Total edge count
    fn count_edges(&self) -> Result<u64>;

    // ---- sessions ----

    /// Insert or replace a session
    fn put_session(&self, session: &Session) -> Result<()>;

    /// Fetch a session; `NotFound` when absent
    fn get_session(&self, id: &str) -> Result<Session>;

    /// The most recently started sessions, newest first
    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>>;

    // ---- edit records ----

    /// Append an edit record
    fn record_edit(&self, edit: &EditRecord) -> Result<()>;

    /// Edit records for a node, newest first
    fn edits_for(&self, node_id: &str, limit: usize) -> Result<Vec<EditRecord>>;

    // ---- dense search ----

    /// Dense similarity search over stored embeddings
    fn vector_search(&self, query: &VectorQuery) -> Result<Vec<VectorHit>>;

    // ---- persisted configuration ----

    /// Fetch a persisted configuration document
    fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Store a persisted configuration document
    fn put_config(&self, key: &str, value: &serde_json::Value) -> Result<()>;

    // ---- admin ----

    /// Current schema version
    fn schema_version(&self) -> Result<u32>;

    /// Apply pending migrations; returns the number applied
    fn run_migrations(&self) -> Result<u32>;

    /// Liveness check
    fn health_check(&self) -> Result<()>;

    /// Flush buffered writes
    fn sync(&self) -> Result<()>;
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Linear-scan vector search shared by the adapters
///
/// Scores over the common Matryoshka prefix so mixed-dimension archives
/// still match.
pub(crate) fn scan_vector_search(
    nodes: impl Iterator<Item = MemoryNode>,
    query: &VectorQuery,
) -> Vec<VectorHit> {
    use crate::mathx::{cosine_similarity, truncate_to};

    let mut hits: Vec<VectorHit> = nodes
        .filter(|node| query.filters.matches(node))
        .filter_map(|node| {
            let embedding = node.embedding.as_ref()?;
            let k = query.embedding.len().min(embedding.vector.len());
            if k == 0 {
                return None;
            }
            let q = truncate_to(&query.embedding, k);
            let v = truncate_to(&embedding.vector, k);
            let score = f64::from(cosine_similarity(&q, &v).ok()?).max(0.0);
            (score >= query.min_score).then(|| VectorHit {
                node_id: node.id.clone(),
                node_type: node.node_type,
                title: node.title.clone(),
                summary: node.summary.clone(),
                distance: 1.0 - score,
                score,
            })
        })
        .collect();

    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.node_id.cmp(&b.node_id))
    });
    hits.truncate(query.limit);
    hits
}
