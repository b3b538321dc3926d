//! Temporal edges from sessions
//!
//! Two nodes accessed close together in one session become temporally
//! adjacent; overlapping clusters across nearby sessions continue a topic.

use chrono::Duration;

use crate::memory::{EdgeCreationSource, EdgeType, MemoryEdge, Session};

use super::coactivation::create_weighted_edge;

/// Maximum minutes between accesses for a `temporal_adjacent` edge
pub const TEMPORAL_ADJACENT_MAX_MINUTES: f64 = 120.0;
/// Exponential decay constant for adjacency weight, in minutes
pub const TEMPORAL_DECAY_MINUTES: f64 = 30.0;
/// Weight floor of adjacency edges inside the window
pub const TEMPORAL_WEIGHT_FLOOR: f64 = 0.20;
/// Base weight of `temporal_continuation` edges
pub const CONTINUATION_BASE_WEIGHT: f64 = 0.30;
/// Window for cross-session continuation, in hours
pub const CONTINUATION_WINDOW_HOURS: i64 = 24;

// ============================================================================
// WEIGHT CURVE
// ============================================================================

/// Adjacency weight for two accesses `delta_minutes` apart
///
/// `max(0.20, exp(-dt/30))` inside the 120-minute window; `None` beyond it.
/// Non-increasing in `delta_minutes` over [0, 120].
pub fn temporal_adjacent_weight(delta_minutes: f64) -> Option<f64> {
    if !(0.0..=TEMPORAL_ADJACENT_MAX_MINUTES).contains(&delta_minutes) {
        return None;
    }
    Some(TEMPORAL_WEIGHT_FLOOR.max((-delta_minutes / TEMPORAL_DECAY_MINUTES).exp()))
}

// ============================================================================
// SESSION EDGE DERIVATION
// ============================================================================

/// Derive `temporal_adjacent` edges from one session's access sequence
///
/// Consecutive-pair based: each access links to every prior access within
/// the 120-minute window, one edge per unordered node pair (first hit wins,
/// which is also the smallest gap for an ordered sequence).
pub fn session_adjacency_edges(session: &Session) -> Vec<MemoryEdge> {
    let mut edges = Vec::new();
    let mut seen_pairs: Vec<(String, String)> = Vec::new();

    for (index, access) in session.accesses.iter().enumerate() {
        for earlier in &session.accesses[..index] {
            if earlier.node_id == access.node_id {
                continue;
            }
            let delta_minutes =
                (access.accessed_at - earlier.accessed_at).num_seconds() as f64 / 60.0;
            let Some(weight) = temporal_adjacent_weight(delta_minutes) else {
                continue;
            };

            let pair = ordered_pair(&earlier.node_id, &access.node_id);
            if seen_pairs.contains(&pair) {
                continue;
            }
            seen_pairs.push(pair);

            edges.push(create_weighted_edge(
                earlier.node_id.clone(),
                access.node_id.clone(),
                EdgeType::TemporalAdjacent,
                EdgeCreationSource::Temporal,
                Some(weight),
                access.accessed_at,
            ));
        }
    }
    edges
}

/// Derive `temporal_continuation` edges for clusters shared by two sessions
///
/// Sessions whose starts fall within the 24-hour window and that touch an
/// overlapping cluster link that cluster's accessed nodes across sessions.
pub fn continuation_edges(earlier: &Session, later: &Session) -> Vec<MemoryEdge> {
    let gap = later.started_at - earlier.started_at;
    if gap < Duration::zero() || gap > Duration::hours(CONTINUATION_WINDOW_HOURS) {
        return Vec::new();
    }

    let earlier_clusters = earlier.clusters_touched();
    let shared: Vec<String> = later
        .clusters_touched()
        .into_iter()
        .filter(|c| earlier_clusters.contains(c))
        .collect();
    if shared.is_empty() {
        return Vec::new();
    }

    let mut edges = Vec::new();
    let mut seen_pairs: Vec<(String, String)> = Vec::new();

    for cluster in &shared {
        for from in earlier.accesses.iter().filter(|a| a.cluster_id.as_ref() == Some(cluster)) {
            for to in later.accesses.iter().filter(|a| a.cluster_id.as_ref() == Some(cluster)) {
                if from.node_id == to.node_id {
                    continue;
                }
                let pair = ordered_pair(&from.node_id, &to.node_id);
                if seen_pairs.contains(&pair) {
                    continue;
                }
                seen_pairs.push(pair);

                edges.push(create_weighted_edge(
                    from.node_id.clone(),
                    to.node_id.clone(),
                    EdgeType::TemporalContinuation,
                    EdgeCreationSource::Temporal,
                    Some(CONTINUATION_BASE_WEIGHT),
                    to.accessed_at,
                ));
            }
        }
    }
    edges
}

fn ordered_pair(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

// ============================================================================
// TESTS
// ============================================================================
