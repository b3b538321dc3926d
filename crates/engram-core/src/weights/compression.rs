//! Compression of long-dormant nodes
//!
//! Nodes that have been DORMANT for over 60 days, carry little importance,
//! and have almost no strong edges can be folded into a summary node. The
//! original's edges become compression records pointing into the summary,
//! which inherits the strongest original weight when it is strong enough.
//! Originals stay restorable for 365 days.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::days_between;
use crate::memory::{EdgeType, Lifecycle, MemoryEdge, MemoryNode};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Days a node must be dormant before compression is considered
pub const COMPRESSION_DORMANT_DAYS: f64 = 60.0;
/// Importance below which a node may compress
pub const COMPRESSION_IMPORTANCE_CEILING: f64 = 0.30;
/// Effective weight at or above which an edge counts as strong
pub const STRONG_EDGE_THRESHOLD: f64 = 0.70;
/// Days the original stays restorable after compression
pub const RESTORABLE_DAYS: i64 = 365;
/// Minimum original weight the summary inherits
pub const SUMMARY_INHERIT_FLOOR: f64 = 0.50;

// ============================================================================
// ELIGIBILITY
// ============================================================================

/// Why a node was ruled in or out of compression
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompressionDecision {
    /// All criteria met
    Eligible,
    /// Not dormant, or not dormant long enough
    NotDormantLongEnough,
    /// Importance too high to fold away
    TooImportant,
    /// Two or more strong edges anchor the node
    TooConnected,
    /// Pinned or starred by the user
    UserProtected,
    /// Accessed too recently
    RecentlyAccessed,
}

/// A node cleared for compression, with its edge inheritance precomputed
#[derive(Debug, Clone)]
pub struct CompressionCandidate {
    /// The node to compress
    pub node_id: String,
    /// Records replacing the original's edges
    pub records: Vec<CompressionRecord>,
    /// Weight the summary inherits, when >= the floor
    pub inherited_weight: Option<f64>,
}

/// Provenance of one edge folded into a summary
///
/// Enough to restore the original edge within the restorability window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionRecord {
    /// Source node of the original edge
    pub original_source: String,
    /// Far end of the original edge
    pub target: String,
    /// Type of the original edge
    pub original_type: EdgeType,
    /// Effective weight at compression time
    pub original_weight: f64,
}

/// Judge whether a node may be compressed
///
/// Criteria: DORMANT for more than 60 days since last access, importance
/// below the ceiling, fewer than 2 strong (>= 0.70) edges, and not pinned,
/// starred, or recently accessed.
pub fn compression_eligibility(
    node: &MemoryNode,
    importance: f64,
    edges: &[MemoryEdge],
    now: DateTime<Utc>,
) -> CompressionDecision {
    if node.pinned || node.starred {
        return CompressionDecision::UserProtected;
    }
    if node.lifecycle != Lifecycle::Dormant {
        return CompressionDecision::NotDormantLongEnough;
    }
    let dormant_days = days_between(node.neural.last_accessed, now);
    if dormant_days <= COMPRESSION_DORMANT_DAYS {
        return CompressionDecision::RecentlyAccessed;
    }
    if importance >= COMPRESSION_IMPORTANCE_CEILING {
        return CompressionDecision::TooImportant;
    }
    let strong_edges = edges
        .iter()
        .filter(|e| e.effective_weight() >= STRONG_EDGE_THRESHOLD)
        .count();
    if strong_edges >= 2 {
        return CompressionDecision::TooConnected;
    }
    CompressionDecision::Eligible
}

/// Build the compression candidate for an eligible node
///
/// The summary inherits the maximum original effective weight when that
/// maximum is at least 0.50; weaker connections die with the original.
pub fn build_candidate(node: &MemoryNode, edges: &[MemoryEdge]) -> CompressionCandidate {
    let records: Vec<CompressionRecord> = edges
        .iter()
        .filter_map(|edge| {
            edge.other_end(&node.id).map(|far| CompressionRecord {
                original_source: node.id.clone(),
                target: far.to_string(),
                original_type: edge.edge_type,
                original_weight: edge.effective_weight(),
            })
        })
        .collect();

    let inherited_weight = records
        .iter()
        .map(|r| r.original_weight)
        .fold(None::<f64>, |best, w| match best {
            Some(b) if b >= w => Some(b),
            _ => Some(w),
        })
        .filter(|w| *w >= SUMMARY_INHERIT_FLOOR);

    CompressionCandidate {
        node_id: node.id.clone(),
        records,
        inherited_weight,
    }
}

/// Restorable-until instant for a compression performed at `compressed_at`
pub fn restorable_until(compressed_at: DateTime<Utc>) -> DateTime<Utc> {
    compressed_at + Duration::days(RESTORABLE_DAYS)
}

/// Whether the restore window is still open at `now`
pub fn restore_window_open(restorable_until: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now <= restorable_until
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsrs::neural_defaults;
    use crate::memory::{
        new_node_id, EdgeCreationSource, ExtractionDepth, NeuralState, NodeType, Provenance,
        SyncState, TemporalModel,
    };
    use crate::weights::create_weighted_edge;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn dormant_node(last_accessed: DateTime<Utc>) -> MemoryNode {
        let defaults = neural_defaults(NodeType::Episode, None);
        let mut neural = NeuralState::new(defaults.stability, defaults.difficulty, last_accessed);
        neural.last_accessed = last_accessed;
        MemoryNode {
            id: new_node_id(),
            node_type: NodeType::Episode,
            subtype: None,
            title: "Old standup".to_string(),
            summary: None,
            body: Some("Routine status round".to_string()),
            blocks: None,
            tags: vec![],
            participants: vec![],
            embedding: None,
            neural,
            lifecycle: Lifecycle::Dormant,
            extraction_depth: ExtractionDepth::Core,
            temporal: TemporalModel::at_ingestion(last_accessed),
            provenance: Provenance {
                source: "test".to_string(),
                source_type: None,
                source_episode: None,
                chunk_position: None,
                created_at: last_accessed,
                confidence: 1.0,
                encrypted_payload: None,
                encryption_tier: None,
            },
            sync: SyncState::initial(last_accessed, "test"),
            compression: None,
            cluster_id: None,
            pinned: false,
            starred: false,
        }
    }

    fn edge_with_weight(node: &MemoryNode, far: &str, weight: f64) -> MemoryEdge {
        create_weighted_edge(
            node.id.clone(),
            far,
            EdgeType::RelatesTo,
            EdgeCreationSource::Extraction,
            Some(weight),
            t0(),
        )
    }

    #[test]
    fn test_eligibility_happy_path() {
        let node = dormant_node(t0());
        let now = t0() + Duration::days(90);
        let decision = compression_eligibility(&node, 0.1, &[], now);
        assert_eq!(decision, CompressionDecision::Eligible);
    }

    #[test]
    fn test_eligibility_rejections() {
        let now = t0() + Duration::days(90);

        let mut pinned = dormant_node(t0());
        pinned.pinned = true;
        assert_eq!(
            compression_eligibility(&pinned, 0.1, &[], now),
            CompressionDecision::UserProtected
        );

        let mut active = dormant_node(t0());
        active.lifecycle = Lifecycle::Active;
        assert_eq!(
            compression_eligibility(&active, 0.1, &[], now),
            CompressionDecision::NotDormantLongEnough
        );

        let recent = dormant_node(t0());
        assert_eq!(
            compression_eligibility(&recent, 0.1, &[], t0() + Duration::days(30)),
            CompressionDecision::RecentlyAccessed
        );

        let important = dormant_node(t0());
        assert_eq!(
            compression_eligibility(&important, 0.8, &[], now),
            CompressionDecision::TooImportant
        );

        let anchored = dormant_node(t0());
        let edges = vec![
            edge_with_weight(&anchored, "node-x", 0.9),
            edge_with_weight(&anchored, "node-y", 0.75),
        ];
        assert_eq!(
            compression_eligibility(&anchored, 0.1, &edges, now),
            CompressionDecision::TooConnected
        );
    }

    #[test]
    fn test_candidate_inherits_max_strong_weight() {
        let node = dormant_node(t0());
        let edges = vec![
            edge_with_weight(&node, "node-x", 0.65),
            edge_with_weight(&node, "node-y", 0.45),
        ];

        let candidate = build_candidate(&node, &edges);
        assert_eq!(candidate.records.len(), 2);
        assert_eq!(candidate.inherited_weight, Some(0.65));
        assert!(candidate
            .records
            .iter()
            .all(|r| r.original_source == node.id));
    }

    #[test]
    fn test_weak_connections_do_not_inherit() {
        let node = dormant_node(t0());
        let edges = vec![edge_with_weight(&node, "node-x", 0.40)];

        let candidate = build_candidate(&node, &edges);
        assert_eq!(candidate.inherited_weight, None);
    }

    #[test]
    fn test_restore_window() {
        let compressed_at = t0();
        let until = restorable_until(compressed_at);
        assert_eq!(until, compressed_at + Duration::days(365));
        assert!(restore_window_open(until, compressed_at + Duration::days(364)));
        assert!(!restore_window_open(until, compressed_at + Duration::days(366)));
    }
}
