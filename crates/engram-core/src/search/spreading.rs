//! Activation spreading
//!
//! Seeds from fused lexical + dense scores, then spreads activation across
//! weighted edges hop by hop. Each hop discounts contributions by
//! `0.5^(h-1)`, fans out over at most 20 edges per node (best first), and
//! admits new frontier nodes only when this hop moved them enough. The loop
//! stops on hop, node, or time exhaustion, on cancellation, or as soon as
//! the quality probe says the target is already met.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::budget::{
    AdaptiveLimits, BudgetExhaustion, ExhaustedResource, OperationBudget, QualityTarget,
};
use crate::cancel::CancelToken;
use crate::clusters::ClusterRouting;
use crate::mathx::unit_clamp;

/// Seed threshold when dense vectors participate
pub const SEED_THRESHOLD_DENSE: f64 = 0.15;
/// Seed threshold for BM25-only seeding
pub const SEED_THRESHOLD_LEXICAL: f64 = 0.05;
/// Dense share of the fused seed score
pub const DENSE_FUSION_WEIGHT: f64 = 0.7;
/// Lexical share of the fused seed score
pub const LEXICAL_FUSION_WEIGHT: f64 = 0.3;
/// Activation below which a node does not join the frontier
pub const FRONTIER_CUTOFF: f64 = 0.1;
/// Per-hop delta below which a target does not join the next frontier
pub const SPREAD_DELTA_CUTOFF: f64 = 0.05;
/// Edges considered per frontier node, best effective weight first
pub const PER_NODE_EDGE_CAP: usize = 20;

/// Node id -> accumulated activation
pub type ActivationMap = HashMap<String, f64>;

/// Hop discount schedule: `0.5^(h-1)`
pub fn hop_discount(hop: u32) -> f64 {
    0.5_f64.powi(hop.saturating_sub(1) as i32)
}

// ============================================================================
// GRAPH ACCESS
// ============================================================================

/// One traversable connection out of a node
#[derive(Debug, Clone)]
pub struct Traversal {
    /// The far node
    pub neighbor: String,
    /// Effective weight of the connecting edge
    pub weight: f64,
}

/// The view of the graph SSA traverses
///
/// Implementations return outgoing edges plus incoming bidirectional edges,
/// sorted by effective weight descending and capped at `cap`. Each retrieval
/// must see a consistent snapshot of weights and lifecycles.
pub trait GraphAccess {
    /// Traversable connections of a node, best first, at most `cap`
    fn connections(&self, node_id: &str, cap: usize) -> Vec<Traversal>;

    /// Primary cluster of a node, for routing pruning
    fn cluster_of(&self, node_id: &str) -> Option<String>;
}

// ============================================================================
// SEEDING
// ============================================================================

/// Fuse dense and lexical scores into seed activations
///
/// `fused = 0.7 * dense + 0.3 * bm25` per node (weights tunable); seeds
/// below the threshold are dropped and the survivors are capped at
/// `entry_points`, best first.
pub fn fuse_seeds(
    dense: &[(String, f64)],
    lexical: &[(String, f64)],
    dense_weight: f64,
    lexical_weight: f64,
    threshold: f64,
    entry_points: usize,
) -> Vec<(String, f64)> {
    let mut fused: HashMap<String, f64> = HashMap::new();
    for (id, score) in dense {
        *fused.entry(id.clone()).or_default() += dense_weight * score;
    }
    for (id, score) in lexical {
        *fused.entry(id.clone()).or_default() += lexical_weight * score;
    }

    let mut seeds: Vec<(String, f64)> = fused
        .into_iter()
        .filter(|(_, score)| *score >= threshold)
        .collect();
    seeds.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    seeds.truncate(entry_points);
    seeds
}

// ============================================================================
// SPREADING
// ============================================================================

/// Inputs to one spreading run
pub struct SpreadParams<'a> {
    /// Seed activations from fusion
    pub seeds: Vec<(String, f64)>,
    /// Structural limits from ABS
    pub limits: AdaptiveLimits,
    /// Resource budget from ABS
    pub budget: OperationBudget,
    /// Early-termination floor
    pub quality_target: QualityTarget,
    /// Cluster routing decision
    pub routing: &'a ClusterRouting,
    /// Cooperative cancellation
    pub cancel: &'a CancelToken,
    /// When the retrieval started, for the time budget
    pub started_at: DateTime<Utc>,
}

/// Result of one spreading run
#[derive(Debug, Clone)]
pub struct SpreadOutcome {
    /// Final activation per reached node
    pub activations: ActivationMap,
    /// Hops fully executed
    pub hops_executed: u32,
    /// Whether cancellation cut the run short
    pub cancelled: bool,
    /// Whether the quality target was met before exhaustion
    pub quality_met: bool,
    /// Exhaustion annotation when a resource ran out first
    pub exhaustion: Option<BudgetExhaustion>,
}

/// Spread activation from the seeds across the graph
///
/// `quality_probe` estimates the confidence of the current best candidates
/// (the re-ranker's composite for the running top-k); spreading stops early
/// once it reports the target confidence.
pub fn spread(
    graph: &dyn GraphAccess,
    params: SpreadParams<'_>,
    now_fn: &dyn Fn() -> DateTime<Utc>,
    quality_probe: &dyn Fn(&ActivationMap) -> f64,
) -> SpreadOutcome {
    let mut activations: ActivationMap = ActivationMap::new();
    let mut frontier: Vec<String> = Vec::new();

    for (id, score) in &params.seeds {
        activations.insert(id.clone(), unit_clamp(*score));
        if *score >= FRONTIER_CUTOFF {
            frontier.push(id.clone());
        }
    }

    let mut hops_executed = 0;
    let mut cancelled = false;
    let mut quality_met = false;
    let mut exhausted: Option<ExhaustedResource> = None;

    'hops: for hop in 1..=params.limits.max_hops {
        if frontier.is_empty() {
            break;
        }
        if params.cancel.is_cancelled() {
            cancelled = true;
            break;
        }
        let elapsed_ms = (now_fn() - params.started_at).num_milliseconds().max(0) as u64;
        if elapsed_ms >= params.budget.time_ms {
            exhausted = Some(ExhaustedResource::TimeLimitReached);
            break;
        }
        if quality_probe(&activations) >= params.quality_target.confidence {
            quality_met = true;
            break;
        }

        let discount = hop_discount(hop);
        let mut deltas: HashMap<String, f64> = HashMap::new();

        for source in &frontier {
            let source_activation = activations.get(source).copied().unwrap_or(0.0);
            for traversal in graph.connections(source, PER_NODE_EDGE_CAP) {
                if !params
                    .routing
                    .admits(graph.cluster_of(&traversal.neighbor).as_deref())
                {
                    continue;
                }
                let contribution = source_activation * traversal.weight * discount;
                if contribution <= 0.0 {
                    continue;
                }
                *deltas.entry(traversal.neighbor).or_default() += contribution;
            }
        }

        let mut next_frontier: Vec<String> = Vec::new();
        for (target, delta) in deltas {
            let entry = activations.entry(target.clone()).or_insert(0.0);
            *entry = unit_clamp(*entry + delta);
            if delta > SPREAD_DELTA_CUTOFF && *entry >= FRONTIER_CUTOFF {
                next_frontier.push(target);
            }

            if activations.len() as u64 >= params.limits.max_nodes.min(params.budget.max_nodes) {
                hops_executed = hop;
                exhausted = Some(ExhaustedResource::NodeLimitReached);
                break 'hops;
            }
        }

        hops_executed = hop;
        frontier = next_frontier;
    }

    // Final quality read for the exhaustion report
    let quality_achieved = quality_probe(&activations);
    if !quality_met {
        quality_met = quality_achieved >= params.quality_target.confidence;
    }

    // Running out of hops with unexplored frontier left is an exhaustion;
    // a dried-up frontier is ordinary completion
    if !quality_met
        && !cancelled
        && exhausted.is_none()
        && hops_executed == params.limits.max_hops
        && !frontier.is_empty()
    {
        exhausted = Some(ExhaustedResource::HopLimitReached);
    }

    let node_cap = params.limits.max_nodes.min(params.budget.max_nodes).max(1);
    let coverage_achieved = (activations.len() as f64 / node_cap as f64).min(1.0);

    let exhaustion = match exhausted {
        Some(resource) if !quality_met => Some(BudgetExhaustion::new(
            resource,
            quality_achieved,
            params.quality_target.confidence,
            coverage_achieved,
        )),
        _ => None,
    };

    SpreadOutcome {
        activations,
        hops_executed,
        cancelled,
        quality_met,
        exhaustion,
    }
}

// ============================================================================
// TESTS
// ============================================================================
