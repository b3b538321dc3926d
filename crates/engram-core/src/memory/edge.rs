//! Memory Edge - weighted, typed connections between nodes
//!
//! The stored representation keeps the three weight components separate;
//! the effective weight is always recomputed from them. This invariant is
//! what lets co-activation learning, decay, and imports all operate on the
//! same arithmetic without drifting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ============================================================================
// EDGE TYPES
// ============================================================================

/// Type of relationship between memory nodes
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Both endpoints describe the same entity
    SameEntity,
    /// Source summarizes target
    Summarizes,
    /// Explicitly linked by the user
    UserLinked,
    /// Source is a part of target
    PartOf,
    /// Source causes target
    Causes,
    /// Source was derived from target
    DerivedFrom,
    /// Source supports target
    Supports,
    /// Source contradicts target
    Contradicts,
    /// Embedding-similarity link
    SimilarTo,
    /// Generic relatedness
    RelatesTo,
    /// Accessed close together in one session
    TemporalAdjacent,
    /// Same topic continued across sessions
    TemporalContinuation,
}

impl EdgeType {
    /// Base weight for this edge type
    ///
    /// `similar_to` edges usually override this with the measured similarity
    /// at creation time.
    pub fn base_weight(&self) -> f64 {
        match self {
            EdgeType::SameEntity => 0.95,
            EdgeType::Summarizes => 0.95,
            EdgeType::UserLinked => 0.90,
            EdgeType::PartOf => 0.85,
            EdgeType::Causes => 0.80,
            EdgeType::DerivedFrom => 0.75,
            EdgeType::Supports => 0.70,
            EdgeType::Contradicts => 0.65,
            EdgeType::SimilarTo => 0.60,
            EdgeType::RelatesTo => 0.50,
            EdgeType::TemporalAdjacent => 0.40,
            EdgeType::TemporalContinuation => 0.30,
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::SameEntity => "same_entity",
            EdgeType::Summarizes => "summarizes",
            EdgeType::UserLinked => "user_linked",
            EdgeType::PartOf => "part_of",
            EdgeType::Causes => "causes",
            EdgeType::DerivedFrom => "derived_from",
            EdgeType::Supports => "supports",
            EdgeType::Contradicts => "contradicts",
            EdgeType::SimilarTo => "similar_to",
            EdgeType::RelatesTo => "relates_to",
            EdgeType::TemporalAdjacent => "temporal_adjacent",
            EdgeType::TemporalContinuation => "temporal_continuation",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "same_entity" => Some(EdgeType::SameEntity),
            "summarizes" => Some(EdgeType::Summarizes),
            "user_linked" => Some(EdgeType::UserLinked),
            "part_of" => Some(EdgeType::PartOf),
            "causes" => Some(EdgeType::Causes),
            "derived_from" => Some(EdgeType::DerivedFrom),
            "supports" => Some(EdgeType::Supports),
            "contradicts" => Some(EdgeType::Contradicts),
            "similar_to" => Some(EdgeType::SimilarTo),
            "relates_to" => Some(EdgeType::RelatesTo),
            "temporal_adjacent" => Some(EdgeType::TemporalAdjacent),
            "temporal_continuation" => Some(EdgeType::TemporalContinuation),
            _ => None,
        }
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// WEIGHT COMPONENTS
// ============================================================================

/// Lower bound of base and effective weights
pub const MIN_WEIGHT: f64 = 0.10;
/// Upper bound of base and effective weights
pub const MAX_WEIGHT: f64 = 1.00;
/// Bounds of the learned adjustment
pub const MAX_LEARNED_ADJUSTMENT: f64 = 0.30;
/// Upper bound of the co-activation bonus
pub const MAX_COACTIVATION_BONUS: f64 = 0.30;

/// The three authoritative weight components of an edge
///
/// `effective = clamp(base * (1 + learned) + coactivation, 0.10, 1.00)`.
/// The components are stored; the effective weight is derived, never stored
/// alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightComponents {
    /// Type-derived base weight in [0.10, 1.00]
    pub base_weight: f64,
    /// Learned adjustment in [-0.30, 0.30]
    pub learned_adjustment: f64,
    /// Co-activation bonus in [0, 0.30]
    pub coactivation_bonus: f64,
}

impl WeightComponents {
    /// Components for a fresh edge of the given base weight
    pub fn from_base(base_weight: f64) -> Self {
        Self {
            base_weight: base_weight.clamp(MIN_WEIGHT, MAX_WEIGHT),
            learned_adjustment: 0.0,
            coactivation_bonus: 0.0,
        }
    }

    /// Recompute the effective weight from the components
    pub fn effective(&self) -> f64 {
        (self.base_weight * (1.0 + self.learned_adjustment) + self.coactivation_bonus)
            .clamp(MIN_WEIGHT, MAX_WEIGHT)
    }

    /// Add to the co-activation bonus, clamped to its band
    pub fn add_coactivation(&mut self, delta: f64) {
        self.coactivation_bonus = (self.coactivation_bonus + delta).clamp(0.0, MAX_COACTIVATION_BONUS);
    }

    /// Multiply the co-activation bonus by a decay factor
    pub fn decay_coactivation(&mut self, factor: f64) {
        self.coactivation_bonus = (self.coactivation_bonus * factor).clamp(0.0, MAX_COACTIVATION_BONUS);
    }

    /// Set the learned adjustment, clamped to its band
    pub fn set_learned(&mut self, adjustment: f64) {
        self.learned_adjustment = adjustment.clamp(-MAX_LEARNED_ADJUSTMENT, MAX_LEARNED_ADJUSTMENT);
    }
}

// ============================================================================
// EDGE STATUS / PROVENANCE
// ============================================================================

/// Confirmation status of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EdgeStatus {
    /// Confirmed by repeated activation or a trusted source
    #[default]
    Confirmed,
    /// Unconfirmed; expires unless activated enough
    Provisional,
}

/// What created the edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeCreationSource {
    /// Content extraction
    Extraction,
    /// Embedding similarity maintenance
    Similarity,
    /// Session temporal adjacency
    Temporal,
    /// Explicit user action
    User,
    /// Co-activation learning
    Coactivation,
}

/// Per-edge activation bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeNeural {
    /// Edge stability (days)
    pub stability: f64,
    /// Last time the edge carried activation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activated: Option<DateTime<Utc>>,
    /// Engaged co-activations observed
    pub co_activation_count: u32,
    /// Last engaged co-activation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_co_activation: Option<DateTime<Utc>>,
    /// Consecutive ignored activations (hot counter, optimistic update)
    pub consecutive_ignored: u32,
    /// Total activations, engaged or not
    pub activation_count: u32,
}

impl Default for EdgeNeural {
    fn default() -> Self {
        Self {
            stability: 1.0,
            last_activated: None,
            co_activation_count: 0,
            last_co_activation: None,
            consecutive_ignored: 0,
            activation_count: 0,
        }
    }
}

// ============================================================================
// MEMORY EDGE
// ============================================================================

/// A weighted, typed edge between two memory nodes
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEdge {
    /// Opaque identifier with a stable `edge-` prefix
    pub id: String,
    /// Relationship type
    pub edge_type: EdgeType,
    /// Source node id
    pub source: String,
    /// Target node id
    pub target: String,
    /// Whether activation also flows target -> source
    pub bidirectional: bool,
    /// The three authoritative weight components
    pub weights: WeightComponents,
    /// Confirmation status
    pub status: EdgeStatus,
    /// When the edge was created
    pub created_at: DateTime<Utc>,
    /// Expiry for provisional edges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// What created the edge
    pub creation_source: EdgeCreationSource,
    /// Activation bookkeeping
    pub neural: EdgeNeural,
    /// Write version, bumped by the store on every successful write
    ///
    /// Compare-and-swap over (components, version) preserves the
    /// effective-weight invariant under concurrent writers.
    #[serde(default)]
    pub version: u64,
}

/// Mint an edge identifier
pub fn new_edge_id() -> String {
    format!("edge-{}", Uuid::new_v4())
}

impl MemoryEdge {
    /// The effective weight, recomputed from the stored components
    pub fn effective_weight(&self) -> f64 {
        self.weights.effective()
    }

    /// The node on the far side of the edge from `node_id`, if incident
    pub fn other_end(&self, node_id: &str) -> Option<&str> {
        if self.source == node_id {
            Some(&self.target)
        } else if self.target == node_id {
            Some(&self.source)
        } else {
            None
        }
    }
}

/// Traversal direction for edge queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Edges whose source is the node
    Outgoing,
    /// Edges whose target is the node
    Incoming,
    /// Both directions
    #[default]
    Both,
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_weight_table_ordering() {
        // Table anchors
        assert_eq!(EdgeType::SameEntity.base_weight(), 0.95);
        assert_eq!(EdgeType::Summarizes.base_weight(), 0.95);
        assert_eq!(EdgeType::UserLinked.base_weight(), 0.90);
        assert_eq!(EdgeType::PartOf.base_weight(), 0.85);
        assert_eq!(EdgeType::TemporalAdjacent.base_weight(), 0.40);
        assert_eq!(EdgeType::TemporalContinuation.base_weight(), 0.30);
    }

    #[test]
    fn test_edge_type_roundtrip() {
        for edge_type in [
            EdgeType::SameEntity,
            EdgeType::Summarizes,
            EdgeType::UserLinked,
            EdgeType::PartOf,
            EdgeType::SimilarTo,
            EdgeType::TemporalAdjacent,
            EdgeType::TemporalContinuation,
        ] {
            assert_eq!(EdgeType::parse_name(edge_type.as_str()), Some(edge_type));
        }
        assert_eq!(EdgeType::parse_name("nonsense"), None);
    }

    #[test]
    fn test_effective_weight_formula() {
        let mut weights = WeightComponents::from_base(0.50);
        assert_eq!(weights.effective(), 0.50);

        weights.set_learned(0.20);
        assert!((weights.effective() - 0.60).abs() < 1e-9);

        weights.add_coactivation(0.10);
        assert!((weights.effective() - 0.70).abs() < 1e-9);
    }

    #[test]
    fn test_effective_weight_clamps() {
        let mut weights = WeightComponents::from_base(0.95);
        weights.set_learned(0.30);
        weights.add_coactivation(0.30);
        assert_eq!(weights.effective(), MAX_WEIGHT);

        let mut low = WeightComponents::from_base(0.10);
        low.set_learned(-0.30);
        assert_eq!(low.effective(), MIN_WEIGHT);
    }

    #[test]
    fn test_component_band_clamps() {
        let mut weights = WeightComponents::from_base(0.50);
        weights.add_coactivation(5.0);
        assert_eq!(weights.coactivation_bonus, MAX_COACTIVATION_BONUS);

        weights.set_learned(-5.0);
        assert_eq!(weights.learned_adjustment, -MAX_LEARNED_ADJUSTMENT);

        // Base itself clamps
        assert_eq!(WeightComponents::from_base(7.0).base_weight, MAX_WEIGHT);
    }

    #[test]
    fn test_other_end() {
        let edge = MemoryEdge {
            id: new_edge_id(),
            edge_type: EdgeType::RelatesTo,
            source: "node-a".to_string(),
            target: "node-b".to_string(),
            bidirectional: true,
            weights: WeightComponents::from_base(0.5),
            status: EdgeStatus::Confirmed,
            created_at: Utc::now(),
            expires_at: None,
            creation_source: EdgeCreationSource::Extraction,
            neural: EdgeNeural::default(),
            version: 0,
        };

        assert_eq!(edge.other_end("node-a"), Some("node-b"));
        assert_eq!(edge.other_end("node-b"), Some("node-a"));
        assert_eq!(edge.other_end("node-c"), None);
    }
}
