//! Edge weighting and co-activation learning
//!
//! Typed base weights, engaged/ignored activation accounting, provisional
//! promotion and expiry, lazy time-based decay, session-derived temporal
//! edges, and compression of long-dormant nodes into summaries.

mod coactivation;
mod compression;
mod temporal;

pub use coactivation::{
    create_user_edge, create_weighted_edge, expire_or_promote, record_activation,
    touch_coactivation_decay, ActivationEffect, COACTIVATION_DECAY_FACTOR,
    COACTIVATION_DECAY_INTERVAL_DAYS, ENGAGED_DWELL_SECONDS, IGNORES_BEFORE_DECAY,
    PROMOTION_ACTIVATIONS, PROVISIONAL_TTL_DAYS, USER_EDGE_DEFAULT_WEIGHT,
    USER_STRENGTH_MAX, USER_STRENGTH_MIN,
};
pub use compression::{
    build_candidate, compression_eligibility, restorable_until, restore_window_open,
    CompressionCandidate, CompressionDecision, CompressionRecord, COMPRESSION_DORMANT_DAYS,
    COMPRESSION_IMPORTANCE_CEILING, RESTORABLE_DAYS, STRONG_EDGE_THRESHOLD,
    SUMMARY_INHERIT_FLOOR,
};
pub use temporal::{
    continuation_edges, session_adjacency_edges, temporal_adjacent_weight,
    CONTINUATION_BASE_WEIGHT, CONTINUATION_WINDOW_HOURS, TEMPORAL_ADJACENT_MAX_MINUTES,
    TEMPORAL_DECAY_MINUTES, TEMPORAL_WEIGHT_FLOOR,
};
