//! Co-activation learning on edges
//!
//! Edges strengthen when the user engages with the far node (dwell >= 5 s or
//! an explicit interaction) and erode when activations keep getting ignored.
//! Provisional edges promote to confirmed on the third engaged activation
//! and expire after 30 days otherwise. The co-activation bonus also decays
//! on its own every 60 days of disuse; the decay is applied lazily on read.

use chrono::{DateTime, Duration, Utc};

use crate::clock::days_between;
use crate::error::{EngramError, Result};
use crate::memory::{
    new_edge_id, EdgeCreationSource, EdgeNeural, EdgeStatus, EdgeType, MemoryEdge,
    WeightComponents,
};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Dwell seconds at which an activation counts as engaged
pub const ENGAGED_DWELL_SECONDS: u64 = 5;
/// Engaged activations required to promote a provisional edge
pub const PROMOTION_ACTIVATIONS: u32 = 3;
/// Days a provisional edge lives without promotion
pub const PROVISIONAL_TTL_DAYS: i64 = 30;
/// Consecutive ignores that trigger a bonus decay
pub const IGNORES_BEFORE_DECAY: u32 = 3;
/// Multiplier applied to the bonus on ignore-decay and time-decay
pub const COACTIVATION_DECAY_FACTOR: f64 = 0.95;
/// Days of disuse per lazy time-decay step
pub const COACTIVATION_DECAY_INTERVAL_DAYS: f64 = 60.0;
/// Default weight of a user-created edge
pub const USER_EDGE_DEFAULT_WEIGHT: f64 = 0.90;
/// Lower clamp of user-supplied strength
pub const USER_STRENGTH_MIN: f64 = 0.50;
/// Upper clamp of user-supplied strength
pub const USER_STRENGTH_MAX: f64 = 1.00;

// ============================================================================
// EDGE CREATION
// ============================================================================

/// Create a weighted edge with zeroed learned/co-activation components
///
/// `base_weight` overrides the type table when given (similarity edges store
/// the measured similarity). Edges from extraction and users are confirmed;
/// everything else starts provisional with a 30-day expiry.
pub fn create_weighted_edge(
    source: impl Into<String>,
    target: impl Into<String>,
    edge_type: EdgeType,
    creation_source: EdgeCreationSource,
    base_weight: Option<f64>,
    now: DateTime<Utc>,
) -> MemoryEdge {
    let status = match creation_source {
        EdgeCreationSource::Extraction | EdgeCreationSource::User => EdgeStatus::Confirmed,
        EdgeCreationSource::Similarity
        | EdgeCreationSource::Temporal
        | EdgeCreationSource::Coactivation => EdgeStatus::Provisional,
    };
    let expires_at = match status {
        EdgeStatus::Provisional => Some(now + Duration::days(PROVISIONAL_TTL_DAYS)),
        EdgeStatus::Confirmed => None,
    };

    MemoryEdge {
        id: new_edge_id(),
        edge_type,
        source: source.into(),
        target: target.into(),
        bidirectional: true,
        weights: WeightComponents::from_base(base_weight.unwrap_or(edge_type.base_weight())),
        status,
        created_at: now,
        expires_at,
        creation_source,
        neural: EdgeNeural::default(),
        version: 0,
    }
}

/// Create a user edge, validating type and clamping strength
///
/// Users may only create `user_linked` and `relates_to` edges. A supplied
/// strength is clamped to [0.50, 1.00]; the default is 0.90.
pub fn create_user_edge(
    source: impl Into<String>,
    target: impl Into<String>,
    edge_type: EdgeType,
    strength: Option<f64>,
    now: DateTime<Utc>,
) -> Result<MemoryEdge> {
    if !matches!(edge_type, EdgeType::UserLinked | EdgeType::RelatesTo) {
        return Err(EngramError::Validation(format!(
            "user edges must be user_linked or relates_to, got {edge_type}"
        )));
    }
    let weight = strength
        .map(|s| s.clamp(USER_STRENGTH_MIN, USER_STRENGTH_MAX))
        .unwrap_or(USER_EDGE_DEFAULT_WEIGHT);

    Ok(create_weighted_edge(
        source,
        target,
        edge_type,
        EdgeCreationSource::User,
        Some(weight),
        now,
    ))
}

// ============================================================================
// ACTIVATION ACCOUNTING
// ============================================================================

/// What a recorded activation did to the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationEffect {
    /// Bonus grew
    Strengthened,
    /// Ignore counted, no decay yet
    IgnoreCounted,
    /// Third consecutive ignore decayed the bonus
    Decayed,
    /// Provisional edge promoted to confirmed
    Promoted,
}

/// Record an engaged or ignored activation on an edge
///
/// Engaged: the bonus grows by `0.10 * (1 - effective_weight)` - strong
/// edges saturate, weak edges learn fast. Ignored three times in a row: the
/// bonus decays by 5% and the streak resets.
pub fn record_activation(edge: &mut MemoryEdge, engaged: bool, now: DateTime<Utc>) -> ActivationEffect {
    edge.neural.activation_count = edge.neural.activation_count.saturating_add(1);
    edge.neural.last_activated = Some(now);

    if engaged {
        let delta = 0.10 * (1.0 - edge.effective_weight());
        edge.weights.add_coactivation(delta);
        edge.neural.consecutive_ignored = 0;
        edge.neural.co_activation_count = edge.neural.co_activation_count.saturating_add(1);
        edge.neural.last_co_activation = Some(now);

        if edge.status == EdgeStatus::Provisional
            && edge.neural.co_activation_count >= PROMOTION_ACTIVATIONS
        {
            edge.status = EdgeStatus::Confirmed;
            edge.expires_at = None;
            return ActivationEffect::Promoted;
        }
        ActivationEffect::Strengthened
    } else {
        edge.neural.consecutive_ignored = edge.neural.consecutive_ignored.saturating_add(1);
        if edge.neural.consecutive_ignored >= IGNORES_BEFORE_DECAY {
            edge.weights.decay_coactivation(COACTIVATION_DECAY_FACTOR);
            edge.neural.consecutive_ignored = 0;
            ActivationEffect::Decayed
        } else {
            ActivationEffect::IgnoreCounted
        }
    }
}

/// Apply lazy time-based decay to the co-activation bonus
///
/// One 5% decay step per full 60 days since the last co-activation. Returns
/// the number of steps applied so callers know whether to persist.
pub fn touch_coactivation_decay(edge: &mut MemoryEdge, now: DateTime<Utc>) -> u32 {
    let Some(last) = edge.neural.last_co_activation.or(edge.neural.last_activated) else {
        return 0;
    };
    let elapsed = days_between(last, now);
    let steps = (elapsed / COACTIVATION_DECAY_INTERVAL_DAYS).floor() as u32;
    for _ in 0..steps {
        edge.weights.decay_coactivation(COACTIVATION_DECAY_FACTOR);
    }
    steps
}

/// Resolve a provisional edge's fate at `now`
///
/// Returns true when the edge should be kept (already confirmed, not yet
/// expired, or past expiry but with enough engaged activations), false when
/// it expired with fewer than 3 and should be removed.
pub fn expire_or_promote(edge: &MemoryEdge, now: DateTime<Utc>) -> bool {
    match edge.status {
        EdgeStatus::Confirmed => true,
        EdgeStatus::Provisional => match edge.expires_at {
            Some(expiry) => now < expiry || edge.neural.co_activation_count >= PROMOTION_ACTIVATIONS,
            None => true,
        },
    }
}

// ============================================================================
// TESTS
// ============================================================================
