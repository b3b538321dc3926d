//! # Engram Core
//!
//! Memory dynamics and retrieval engine for a personal memory graph. Typed
//! content nodes connected by weighted edges, governed by cognitively
//! inspired dynamics:
//!
//! - **Forgetting curves**: per-node stability, difficulty, and lazily
//!   computed retrievability drive ACTIVE / WEAK / DORMANT lifecycles
//! - **Contextual embeddings**: typed context prefixes, Matryoshka
//!   truncation, and a provider fallback chain with explicit retry states
//! - **Spreading activation search**: BM25 + dense seeding, edge-weighted
//!   multi-hop traversal under an adaptive budget, and a six-signal
//!   composite re-ranker
//! - **Co-activation learning**: edges strengthen with engagement, erode
//!   when ignored, promote from provisional to confirmed, and decay with
//!   disuse
//!
//! Retrieval is a read that also writes: it grows stability on the returned
//! nodes, records session accesses for temporal edge derivation, and routes
//! access events into cluster affinity learning.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use engram_core::{CancelToken, MemoryEngine, SearchRequest};
//!
//! let engine = MemoryEngine::new(store, clock).with_pipeline(pipeline);
//!
//! let node = engine.create_node(CreateNodeInput {
//!     title: "Borrow checker".into(),
//!     body: Some("Ownership rules prevent data races.".into()),
//!     ..Default::default()
//! }).await?;
//!
//! let results = engine.search(SearchRequest {
//!     query: "how does rust prevent data races".into(),
//!     filters: None,
//!     limit: 10,
//!     thoroughness: None,
//!     operation: None,
//! }, &CancelToken::new()).await?;
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod budget;
pub mod cancel;
pub mod clock;
pub mod clusters;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod fsrs;
pub mod index;
pub mod mathx;
pub mod memory;
pub mod search;
pub mod similarity;
pub mod storage;
pub mod weights;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Memory types
pub use memory::{
    Block, BlockType, ChunkPosition, ContentTime, ContentTimeKind, CreateNodeInput, Direction,
    EdgeCreationSource, EdgeStatus, EdgeType, EditRecord, EventTime, EventTimeSource,
    ExtractionDepth, Lifecycle, MemoryEdge, MemoryNode, MemoryStats, NodeEmbedding, NodeFilters,
    NodeType, Session, TimeRange, UpdateNodePatch, WeightComponents,
};

// Forgetting-curve state machine
pub use fsrs::{lifecycle_band, neural_defaults, recall, retrievability, RecallOutcome};

// Embedding pipeline
pub use embeddings::{
    truncate_to_matryoshka, ContextInput, ContextKind, EmbeddingPipeline, EmbeddingProvider,
    ProviderError, ProviderTier, RetryManager, RetryPolicy, RetryState,
};

// Retrieval
pub use budget::{
    BudgetExhaustion, BudgetPlan, ExhaustedResource, GraphMetrics, OperationKey, QueryType,
    Thoroughness,
};
pub use clusters::{ClusterRef, ClusterRouting, RoutingStrategy};
pub use search::{Signal, SignalBreakdown, SignalWeights};

// Engine and collaborators
pub use engine::{
    ClusterSource, MemoryEngine, NoopTelemetry, QueryClassification, ScoredNode, SearchMetrics,
    SearchRequest, SearchResponse, StaticClusters, TelemetrySink,
};

// Storage
pub use storage::{MemoryStore, SqliteStore, StorageAdapter, VectorHit, VectorQuery};

// Configuration
pub use config::{
    load_config, AbsConfig, FallbackConfig, HybridWeightsConfig, SimilarityConfig, VersionedConfig,
};

// Primitives
pub use cancel::CancelToken;
pub use clock::{Clock, FakeClock, SystemClock};
pub use error::{EngramError, Result};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding dimensionality of the primary model
pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = embeddings::DEFAULT_DIMENSIONS;

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CancelToken, Clock, CreateNodeInput, EngramError, Lifecycle, MemoryEngine, MemoryNode,
        MemoryStore, NodeFilters, NodeType, Result, SearchRequest, SearchResponse, SqliteStore,
        StorageAdapter, Thoroughness, UpdateNodePatch,
    };
}
