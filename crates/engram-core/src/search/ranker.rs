//! Six-signal composite re-ranker
//!
//! Every candidate that survives spreading activation is scored on six
//! normalized signals. The composite is a fixed weighted sum; the component
//! with the largest weighted contribution is reported back as the primary
//! signal for transparency. Ties break on stability, then id.

use serde::{Deserialize, Serialize};

use crate::mathx::unit_clamp;

/// Recency time constant in days
pub const RECENCY_TAU_DAYS: f64 = 30.0;
/// Access count at which authority saturates
pub const AUTHORITY_SATURATION: f64 = 20.0;

// ============================================================================
// SIGNALS
// ============================================================================

/// The six re-rank signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Query-node embedding cosine
    Semantic,
    /// Normalized BM25
    Lexical,
    /// Final spreading activation
    Graph,
    /// Exponential age decay
    Recency,
    /// Saturating access count
    Authority,
    /// Cluster affinity to the query
    Affinity,
}

/// Fixed composite weights
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SignalWeights {
    /// Weight of the semantic signal
    pub semantic: f64,
    /// Weight of the lexical signal
    pub lexical: f64,
    /// Weight of the graph signal
    pub graph: f64,
    /// Weight of the recency signal
    pub recency: f64,
    /// Weight of the authority signal
    pub authority: f64,
    /// Weight of the affinity signal
    pub affinity: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            semantic: 0.25,
            lexical: 0.20,
            graph: 0.20,
            recency: 0.15,
            authority: 0.10,
            affinity: 0.10,
        }
    }
}

/// Per-candidate signal values, all in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalBreakdown {
    /// Query-node embedding cosine (0 when either is absent)
    pub semantic: f64,
    /// Normalized BM25
    pub lexical: f64,
    /// Final activation from spreading
    pub graph: f64,
    /// `exp(-age_days / tau)`
    pub recency: f64,
    /// `min(1, access_count / 20)`
    pub authority: f64,
    /// Cluster affinity of the node's primary cluster
    pub affinity: f64,
}

impl SignalBreakdown {
    /// Clamp every signal into [0, 1]
    pub fn normalized(mut self) -> Self {
        self.semantic = unit_clamp(self.semantic);
        self.lexical = unit_clamp(self.lexical);
        self.graph = unit_clamp(self.graph);
        self.recency = unit_clamp(self.recency);
        self.authority = unit_clamp(self.authority);
        self.affinity = unit_clamp(self.affinity);
        self
    }

    /// The weighted composite score
    pub fn composite(&self, weights: &SignalWeights) -> f64 {
        weights.semantic * self.semantic
            + weights.lexical * self.lexical
            + weights.graph * self.graph
            + weights.recency * self.recency
            + weights.authority * self.authority
            + weights.affinity * self.affinity
    }

    /// The signal with the largest weighted contribution
    pub fn primary_signal(&self, weights: &SignalWeights) -> Signal {
        let contributions = [
            (Signal::Semantic, weights.semantic * self.semantic),
            (Signal::Lexical, weights.lexical * self.lexical),
            (Signal::Graph, weights.graph * self.graph),
            (Signal::Recency, weights.recency * self.recency),
            (Signal::Authority, weights.authority * self.authority),
            (Signal::Affinity, weights.affinity * self.affinity),
        ];
        contributions
            .into_iter()
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(signal, _)| signal)
            .unwrap_or(Signal::Semantic)
    }
}

/// Recency signal from age in days
pub fn recency_signal(age_days: f64) -> f64 {
    (-age_days.max(0.0) / RECENCY_TAU_DAYS).exp()
}

/// Authority signal from access count
pub fn authority_signal(access_count: u32) -> f64 {
    (f64::from(access_count) / AUTHORITY_SATURATION).min(1.0)
}

// ============================================================================
// RANKING
// ============================================================================

/// A candidate entering the re-ranker
#[derive(Debug, Clone)]
pub struct CandidateSignals {
    /// Node id
    pub node_id: String,
    /// Node stability, for tie-breaking
    pub stability: f64,
    /// The six signal values
    pub breakdown: SignalBreakdown,
}

/// A ranked result
#[derive(Debug, Clone)]
pub struct RankedCandidate {
    /// Node id
    pub node_id: String,
    /// Composite score in [0, 1]
    pub score: f64,
    /// The component signals
    pub breakdown: SignalBreakdown,
    /// Largest-contribution component
    pub primary_signal: Signal,
}

/// Rank candidates by composite score
///
/// Ties break by higher stability, then lexicographically smaller id.
pub fn rank(
    candidates: Vec<CandidateSignals>,
    weights: &SignalWeights,
    limit: usize,
) -> Vec<RankedCandidate> {
    let mut scored: Vec<(f64, CandidateSignals)> = candidates
        .into_iter()
        .map(|candidate| {
            let breakdown = candidate.breakdown.normalized();
            let score = breakdown.composite(weights);
            (
                score,
                CandidateSignals {
                    breakdown,
                    ..candidate
                },
            )
        })
        .collect();

    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.stability
                    .partial_cmp(&a.stability)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.node_id.cmp(&b.node_id))
    });

    scored
        .into_iter()
        .take(limit)
        .map(|(score, candidate)| RankedCandidate {
            primary_signal: candidate.breakdown.primary_signal(weights),
            node_id: candidate.node_id,
            score,
            breakdown: candidate.breakdown,
        })
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
