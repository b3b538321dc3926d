//! Memory module - Core types of the graph
//!
//! Nodes, edges, typed content blocks, and access sessions. Node neural
//! state is driven by the forgetting curve in `crate::fsrs`; edge weights
//! are maintained by `crate::weights`.

mod blocks;
mod edge;
mod node;
mod session;

pub use blocks::{parse_markdown, render_markdown, Block, BlockType};
pub use edge::{
    new_edge_id, Direction, EdgeCreationSource, EdgeNeural, EdgeStatus, EdgeType, MemoryEdge,
    WeightComponents, MAX_COACTIVATION_BONUS, MAX_LEARNED_ADJUSTMENT, MAX_WEIGHT, MIN_WEIGHT,
};
pub use node::{
    new_node_id, ChunkPosition, CompressionState, ContentTime, ContentTimeKind, CreateNodeInput,
    EventTime, EventTimeSource, ExtractionDepth, IngestionTime, Lifecycle, MemoryNode,
    NeuralState, NodeEmbedding, NodeFilters, NodeType, Provenance, SyncState, SyncStatus,
    TemporalModel, TimeRange, UpdateNodePatch,
};
pub use session::{
    new_session_id, Session, SessionAccess, SESSION_IDLE_TIMEOUT_MINUTES,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// EDIT RECORDS
// ============================================================================

/// Undo record produced when a node's content body changes
///
/// Stores JSON-shaped before/after snapshots so an undo can restore exactly
/// what was replaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditRecord {
    /// Record identifier
    pub id: String,
    /// The edited node
    pub node_id: String,
    /// JSON snapshot before the edit
    pub before: serde_json::Value,
    /// JSON snapshot after the edit
    pub after: serde_json::Value,
    /// Who made the edit
    pub editor: String,
    /// When the edit happened
    pub edited_at: DateTime<Utc>,
}

impl EditRecord {
    /// Build an edit record for a body change
    pub fn body_change(
        node_id: impl Into<String>,
        before: serde_json::Value,
        after: serde_json::Value,
        editor: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("edit-{}", uuid::Uuid::new_v4()),
            node_id: node_id.into(),
            before,
            after,
            editor: editor.into(),
            edited_at: at,
        }
    }
}

// ============================================================================
// GRAPH STATISTICS
// ============================================================================

/// Aggregate statistics over the memory graph
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// Total number of nodes
    pub total_nodes: i64,
    /// Total number of edges
    pub total_edges: i64,
    /// Nodes per lifecycle band
    pub active_nodes: i64,
    /// Nodes currently WEAK
    pub weak_nodes: i64,
    /// Nodes currently DORMANT
    pub dormant_nodes: i64,
    /// Nodes compressed into summaries
    pub compressed_nodes: i64,
    /// Nodes carrying an embedding
    pub nodes_with_embeddings: i64,
    /// Timestamp of the oldest node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_node: Option<DateTime<Utc>>,
    /// Timestamp of the newest node
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_node: Option<DateTime<Utc>>,
}
