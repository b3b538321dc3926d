//! Similarity-edge maintenance
//!
//! When a node gains or refreshes an embedding it is compared against the
//! most recent peers using truncated 512-dim cosine similarity. Strong
//! matches become `similar_to` edges, near-duplicates are surfaced for a
//! dedup check (resolved elsewhere), and existing similarity edges whose
//! similarity has fallen go stale.

use crate::embeddings::COMPARISON_DIMENSIONS;
use crate::mathx::{cosine_similarity, truncate_to};
use crate::memory::{EdgeType, MemoryEdge};

/// Similarity at or above this creates or refreshes a `similar_to` edge
pub const SIMILARITY_EDGE_THRESHOLD: f64 = 0.90;
/// Similarity at or above this flags a dedup check instead
pub const DEDUP_CHECK_THRESHOLD: f64 = 0.95;
/// An existing similarity edge below this is marked stale
pub const STALE_EDGE_THRESHOLD: f64 = 0.80;
/// How many recent peers are compared on each new embedding
pub const RECENT_NODE_WINDOW: usize = 100;

// ============================================================================
// OUTCOME TYPES
// ============================================================================

/// A peer whose similarity crossed a maintenance threshold
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPeer {
    /// Peer node id
    pub node_id: String,
    /// Truncated-cosine similarity
    pub similarity: f64,
    /// Whether this pair should go to deduplication instead of edging
    pub should_check_dedup: bool,
}

/// What a maintenance pass decided for one node's new embedding
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimilarityOutcome {
    /// Peers that should get a `similar_to` edge with `base_weight = sim`
    pub edges_to_upsert: Vec<SimilarPeer>,
    /// Near-duplicates surfaced for the (out-of-scope) dedup resolver
    pub dedup_candidates: Vec<SimilarPeer>,
    /// Existing similarity edges that fell below the stale threshold
    pub stale_edge_ids: Vec<String>,
}

// ============================================================================
// MAINTENANCE
// ============================================================================

/// Compare a fresh embedding against recent peers and existing edges
///
/// `recent_peers` should be at most the `RECENT_NODE_WINDOW` most recent
/// embedded nodes (excluding the node itself); callers truncate the window,
/// this function truncates the vectors.
pub fn review_embedding(
    node_id: &str,
    vector: &[f32],
    recent_peers: &[(String, Vec<f32>)],
    existing_similarity_edges: &[MemoryEdge],
) -> SimilarityOutcome {
    let mut outcome = SimilarityOutcome::default();
    let truncated = truncate_to(vector, COMPARISON_DIMENSIONS);
    let mut peer_sims: Vec<(String, f64)> = Vec::new();

    for (peer_id, peer_vector) in recent_peers.iter().take(RECENT_NODE_WINDOW) {
        if peer_id == node_id {
            continue;
        }
        let peer_truncated = truncate_to(peer_vector, COMPARISON_DIMENSIONS);
        let Ok(sim) = cosine_similarity(&truncated, &peer_truncated) else {
            // Mixed-dimension peers (older models) cannot be compared
            tracing::debug!(peer = peer_id.as_str(), "skipping peer with mismatched dimensions");
            continue;
        };
        let sim = f64::from(sim);
        peer_sims.push((peer_id.clone(), sim));

        if sim >= DEDUP_CHECK_THRESHOLD {
            outcome.dedup_candidates.push(SimilarPeer {
                node_id: peer_id.clone(),
                similarity: sim,
                should_check_dedup: true,
            });
        } else if sim >= SIMILARITY_EDGE_THRESHOLD {
            outcome.edges_to_upsert.push(SimilarPeer {
                node_id: peer_id.clone(),
                similarity: sim,
                should_check_dedup: false,
            });
        }
    }

    // Re-examine existing similarity edges against the fresh vector
    for edge in existing_similarity_edges {
        if edge.edge_type != EdgeType::SimilarTo {
            continue;
        }
        let Some(peer_id) = edge.other_end(node_id) else {
            continue;
        };
        if let Some((_, sim)) = peer_sims.iter().find(|(id, _)| id.as_str() == peer_id) {
            if *sim < STALE_EDGE_THRESHOLD {
                outcome.stale_edge_ids.push(edge.id.clone());
            }
        }
    }

    outcome
}

// ============================================================================
// TESTS
// ============================================================================
