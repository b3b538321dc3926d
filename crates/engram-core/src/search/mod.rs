//! Spreading Activation Search
//!
//! Query analysis, BM25 + dense seeding, multi-hop activation spreading
//! under the adaptive budget, the six-signal composite re-ranker, and the
//! lexical substring fallback.

mod fallback;
mod query;
mod ranker;
mod spreading;

pub use fallback::substring_fallback;
pub use query::{analyze_query, QueryAnalysis, FILLER_WORDS};
pub use ranker::{
    authority_signal, rank, recency_signal, CandidateSignals, RankedCandidate, Signal,
    SignalBreakdown, SignalWeights, AUTHORITY_SATURATION, RECENCY_TAU_DAYS,
};
pub use spreading::{
    fuse_seeds, hop_discount, spread, ActivationMap, GraphAccess, SpreadOutcome, SpreadParams,
    Traversal, DENSE_FUSION_WEIGHT, FRONTIER_CUTOFF, LEXICAL_FUSION_WEIGHT, PER_NODE_EDGE_CAP,
    SEED_THRESHOLD_DENSE, SEED_THRESHOLD_LEXICAL, SPREAD_DELTA_CUTOFF,
};
