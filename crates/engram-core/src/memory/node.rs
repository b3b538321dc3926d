//! Memory Node - The fundamental unit of the graph
//!
//! Each node carries:
//! - Typed content (title, summary, body, typed blocks)
//! - Neural state driving the forgetting curve
//! - A four-type temporal model (ingestion, event, content times, patterns)
//! - Embedding metadata with Matryoshka-truncatable vectors
//! - Provenance, sync bookkeeping, and optional compression state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::blocks::Block;

// ============================================================================
// NODE TYPES
// ============================================================================

/// Types of memory nodes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A distilled concept or abstract idea
    #[default]
    Concept,
    /// An event or experience tied to a moment in time
    Episode,
    /// A cluster aggregate node
    Cluster,
    /// A summary produced by compression
    Summary,
    /// Raw archived material
    Archive,
    /// A stored query
    Query,
}

impl NodeType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Concept => "concept",
            NodeType::Episode => "episode",
            NodeType::Cluster => "cluster",
            NodeType::Summary => "summary",
            NodeType::Archive => "archive",
            NodeType::Query => "query",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "concept" => NodeType::Concept,
            "episode" => NodeType::Episode,
            "cluster" => NodeType::Cluster,
            "summary" => NodeType::Summary,
            "archive" => NodeType::Archive,
            "query" => NodeType::Query,
            _ => NodeType::Concept,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Lifecycle {
    /// Retrievability at or above 0.5
    #[default]
    Active,
    /// Retrievability in [0.1, 0.5)
    Weak,
    /// Retrievability below 0.1; only an explicit write reactivates
    Dormant,
    /// Body replaced by a reference into a summary node
    Compressed,
    /// Compressed but still inside the restorability window
    Restorable,
}

impl Lifecycle {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Active => "ACTIVE",
            Lifecycle::Weak => "WEAK",
            Lifecycle::Dormant => "DORMANT",
            Lifecycle::Compressed => "COMPRESSED",
            Lifecycle::Restorable => "RESTORABLE",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Lifecycle::Active,
            "WEAK" => Lifecycle::Weak,
            "DORMANT" => Lifecycle::Dormant,
            "COMPRESSED" => Lifecycle::Compressed,
            "RESTORABLE" => Lifecycle::Restorable,
            _ => Lifecycle::Active,
        }
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How deep extraction went when the node was created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionDepth {
    /// Core extraction - headline knowledge
    #[default]
    Core,
    /// Detail extraction - supporting material
    Detail,
}

// ============================================================================
// NEURAL STATE
// ============================================================================

/// Per-node forgetting-curve state
///
/// Retrievability is computed lazily from `stability` and `last_accessed`;
/// the field here is only a cache of the last computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeuralState {
    /// Memory stability in days (>= 0.1)
    pub stability: f64,
    /// Inherent difficulty (1.0 = easy, 10.0 = hard)
    pub difficulty: f64,
    /// Cached retrievability in [0, 1]
    pub retrievability: f64,
    /// Number of successful recalls
    pub access_count: u32,
    /// When the node was last accessed
    pub last_accessed: DateTime<Utc>,
}

impl NeuralState {
    /// Create fresh neural state at the given instant
    pub fn new(stability: f64, difficulty: f64, at: DateTime<Utc>) -> Self {
        Self {
            stability: stability.max(crate::fsrs::MIN_STABILITY),
            difficulty: difficulty.clamp(crate::fsrs::MIN_DIFFICULTY, crate::fsrs::MAX_DIFFICULTY),
            retrievability: 1.0,
            access_count: 0,
            last_accessed: at,
        }
    }
}

// ============================================================================
// TEMPORAL MODEL
// ============================================================================

/// Where an event timestamp came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventTimeSource {
    /// Explicitly present in the source material
    Explicit,
    /// Stated by the user
    UserStated,
    /// Inferred from context
    Inferred,
    /// Defaulted to ingestion time
    Default,
}

/// Resolved event time with confidence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// When the event happened
    pub timestamp: DateTime<Utc>,
    /// Confidence in the resolution, [0, 1]
    pub confidence: f64,
    /// Provenance of the timestamp
    pub source: EventTimeSource,
}

/// Kind of a time reference found inside content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentTimeKind {
    /// Relative reference ("yesterday", "last week")
    Relative,
    /// Historical reference ("in 1969")
    Historical,
    /// Absolute reference (ISO dates)
    Absolute,
    /// A range of time
    Range,
}

/// A time reference resolved out of content text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentTime {
    /// The original reference text
    pub original_text: String,
    /// The resolved timestamp
    pub resolved: DateTime<Utc>,
    /// Reference kind
    pub kind: ContentTimeKind,
    /// Confidence in the resolution, [0, 1]
    pub confidence: f64,
}

/// When content was ingested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestionTime {
    /// Ingestion instant (UTC)
    pub timestamp: DateTime<Utc>,
    /// IANA timezone the content arrived from
    pub timezone: String,
}

/// Four-type temporal model: ingestion (always), event, content times, patterns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalModel {
    /// Always present: when the node was ingested
    pub ingestion: IngestionTime,
    /// When the described event happened, if known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EventTime>,
    /// Time references resolved out of the content
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content_times: Vec<ContentTime>,
    /// Learned reference patterns (open-keyed, evolves independently)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_patterns: Option<serde_json::Value>,
}

impl TemporalModel {
    /// Temporal model with only an ingestion timestamp
    pub fn at_ingestion(timestamp: DateTime<Utc>) -> Self {
        Self {
            ingestion: IngestionTime {
                timestamp,
                timezone: "UTC".to_string(),
            },
            event: None,
            content_times: Vec::new(),
            reference_patterns: None,
        }
    }
}

// ============================================================================
// EMBEDDING METADATA
// ============================================================================

/// A node's dense embedding plus the context that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeEmbedding {
    /// The embedding vector
    pub vector: Vec<f32>,
    /// Declared dimensionality; always equals `vector.len()`
    pub dimensions: usize,
    /// Model identifier that produced the vector
    pub model: String,
    /// The text actually prepended for embedding
    pub context_prefix: String,
    /// Stable hash of prefix + content, for change detection
    pub context_hash: String,
    /// When the embedding was computed
    pub created_at: DateTime<Utc>,
    /// True when a non-primary model produced the embedding
    pub provisional: bool,
    /// Monotonically increasing embedding version, starts at 1
    pub version: u32,
}

// ============================================================================
// PROVENANCE / SYNC / COMPRESSION
// ============================================================================

/// Position of a chunk inside its source document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkPosition {
    /// Zero-based chunk index
    pub index: usize,
    /// Total chunks in the document
    pub total: usize,
}

/// Where the node's content came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provenance {
    /// Source descriptor (URL, conversation id, import path)
    pub source: String,
    /// Source-type hint for context-prefix selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Episode node the content was extracted from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_episode: Option<String>,
    /// Chunk position when the content is a document chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_position: Option<ChunkPosition>,
    /// When provenance was recorded
    pub created_at: DateTime<Utc>,
    /// Confidence in the extraction, [0, 1]
    pub confidence: f64,
    /// Encrypted payload, when the source is protected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_payload: Option<String>,
    /// Encryption tier for the payload
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_tier: Option<String>,
}

/// Sync status of a replicated node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    /// In sync with the backend
    #[default]
    Synced,
    /// Local changes not yet pushed
    Pending,
    /// Divergent edits detected
    Conflict,
}

/// Version and modification bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    /// Monotonic version counter
    pub version: i64,
    /// Last modification instant
    pub last_modified: DateTime<Utc>,
    /// Who made the last modification
    pub last_modifier: String,
    /// Current sync status
    pub sync_status: SyncStatus,
}

impl SyncState {
    /// Initial sync state for a freshly created node
    pub fn initial(at: DateTime<Utc>, modifier: impl Into<String>) -> Self {
        Self {
            version: 1,
            last_modified: at,
            last_modifier: modifier.into(),
            sync_status: SyncStatus::Synced,
        }
    }
}

/// Compression bookkeeping for a node folded into a summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionState {
    /// Summary node the content was folded into
    pub compressed_into: String,
    /// When compression happened
    pub compressed_at: DateTime<Utc>,
    /// Last instant the original can be restored
    pub restorable_until: DateTime<Utc>,
}

// ============================================================================
// MEMORY NODE
// ============================================================================

/// A node in the memory graph
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    /// Opaque identifier with a stable `node-` prefix
    pub id: String,
    /// Node type
    pub node_type: NodeType,
    /// Free-form subtype
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Title of the node
    pub title: String,
    /// Optional condensed summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Optional full body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Optional typed block content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocks: Option<Vec<Block>>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Participants, for episode nodes
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub participants: Vec<String>,
    /// Dense embedding, absent until computed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<NodeEmbedding>,
    /// Forgetting-curve state
    pub neural: NeuralState,
    /// Lifecycle state
    pub lifecycle: Lifecycle,
    /// Extraction depth
    pub extraction_depth: ExtractionDepth,
    /// Four-type temporal model
    pub temporal: TemporalModel,
    /// Provenance record
    pub provenance: Provenance,
    /// Version/sync bookkeeping
    pub sync: SyncState,
    /// Compression bookkeeping, present once compressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compression: Option<CompressionState>,
    /// Primary cluster membership
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,
    /// Pinned by the user - exempt from compression
    #[serde(default)]
    pub pinned: bool,
    /// Starred by the user - exempt from compression
    #[serde(default)]
    pub starred: bool,
}

/// Mint a node identifier
pub fn new_node_id() -> String {
    format!("node-{}", Uuid::new_v4())
}

impl MemoryNode {
    /// The node's primary timestamp: event time when present, else ingestion
    pub fn primary_timestamp(&self) -> DateTime<Utc> {
        self.temporal
            .event
            .as_ref()
            .map(|e| e.timestamp)
            .unwrap_or(self.temporal.ingestion.timestamp)
    }

    /// Concatenated searchable text (title, summary, body)
    pub fn searchable_text(&self) -> String {
        let mut parts = vec![self.title.clone()];
        if let Some(summary) = &self.summary {
            parts.push(summary.clone());
        }
        if let Some(body) = &self.body {
            parts.push(body.clone());
        }
        parts.join("\n")
    }

    /// Whether the node's embedding declaration is internally consistent
    pub fn embedding_is_consistent(&self) -> bool {
        self.embedding
            .as_ref()
            .is_none_or(|e| e.vector.len() == e.dimensions)
    }
}

// ============================================================================
// INPUT TYPES
// ============================================================================

/// Input for creating a node
///
/// Uses `deny_unknown_fields` to prevent field injection at the API boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateNodeInput {
    /// Node type
    #[serde(default)]
    pub node_type: NodeType,
    /// Free-form subtype
    #[serde(default)]
    pub subtype: Option<String>,
    /// Title
    pub title: String,
    /// Condensed summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Full body (markdown; parsed into blocks on create)
    #[serde(default)]
    pub body: Option<String>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Source descriptor
    #[serde(default)]
    pub source: Option<String>,
    /// Source type hint for context-prefix selection
    #[serde(default)]
    pub source_type: Option<String>,
    /// Episode node the content was extracted from
    #[serde(default)]
    pub source_episode: Option<String>,
    /// Chunk position when the content is a document chunk
    #[serde(default)]
    pub chunk_position: Option<ChunkPosition>,
    /// Participants, for episode nodes
    #[serde(default)]
    pub participants: Vec<String>,
    /// Event time, when known
    #[serde(default)]
    pub event: Option<EventTime>,
    /// Primary cluster
    #[serde(default)]
    pub cluster_id: Option<String>,
    /// Extraction depth
    #[serde(default)]
    pub extraction_depth: ExtractionDepth,
}

/// Partial update for a node; `None` fields are untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UpdateNodePatch {
    /// Replace the title
    #[serde(default)]
    pub title: Option<String>,
    /// Replace the summary
    #[serde(default)]
    pub summary: Option<String>,
    /// Replace the body (triggers an edit record and re-embedding)
    #[serde(default)]
    pub body: Option<String>,
    /// Replace the tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Explicitly set the lifecycle (the only path that reactivates DORMANT)
    #[serde(default)]
    pub lifecycle: Option<Lifecycle>,
    /// Replace the primary cluster
    #[serde(default)]
    pub cluster_id: Option<String>,
    /// Pin or unpin
    #[serde(default)]
    pub pinned: Option<bool>,
    /// Star or unstar
    #[serde(default)]
    pub starred: Option<bool>,
}

/// Inclusive time range filter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    /// Range start (inclusive); open when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    /// Range end (inclusive); open when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Whether an instant falls inside the range
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| t >= s) && self.end.is_none_or(|e| t <= e)
    }
}

/// Filters shared by list and search operations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NodeFilters {
    /// Restrict to these node types
    #[serde(default)]
    pub types: Option<Vec<NodeType>>,
    /// Restrict to these lifecycles
    #[serde(default)]
    pub lifecycle: Option<Vec<Lifecycle>>,
    /// Restrict to these clusters
    #[serde(default)]
    pub clusters: Option<Vec<String>>,
    /// Restrict to this primary-timestamp range
    #[serde(default)]
    pub time_range: Option<TimeRange>,
}

impl NodeFilters {
    /// Whether a node passes every present filter
    pub fn matches(&self, node: &MemoryNode) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&node.node_type) {
                return false;
            }
        }
        if let Some(lifecycles) = &self.lifecycle {
            if !lifecycles.contains(&node.lifecycle) {
                return false;
            }
        }
        if let Some(clusters) = &self.clusters {
            match &node.cluster_id {
                Some(c) if clusters.contains(c) => {}
                _ => return false,
            }
        }
        if let Some(range) = &self.time_range {
            if !range.contains(node.primary_timestamp()) {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// TESTS
// ============================================================================
