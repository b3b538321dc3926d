//! Adaptive Budget System (ABS)
//!
//! Turns graph size, query type, and user-selected thoroughness into
//! concrete limits for spreading activation: how many seeds, how many hops,
//! how many nodes, how much wall-clock, how many provider calls. Small
//! graphs get fixed cold-start limits; everything else scales with the
//! graph.

use serde::{Deserialize, Serialize};

/// Below this many nodes the system runs in cold-start mode
pub const COLD_START_NODE_THRESHOLD: u64 = 200;
/// Bounds of the adaptive entry-point count
pub const ENTRY_POINT_RANGE: (u32, u32) = (2, 8);
/// Bounds of the adaptive node cap
pub const MAX_NODES_RANGE: (u64, u64) = (50, 5000);

// ============================================================================
// INPUTS
// ============================================================================

/// Aggregate shape of the graph, consumed by adaptive scaling
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphMetrics {
    /// Total nodes
    pub total_nodes: u64,
    /// Total edges
    pub total_edges: u64,
    /// Edge density: edges / nodes^2
    pub density: f64,
    /// Average in-degree
    pub avg_in_degree: f64,
    /// Average out-degree
    pub avg_out_degree: f64,
}

impl GraphMetrics {
    /// Compute metrics from node and edge counts
    pub fn from_counts(total_nodes: u64, total_edges: u64) -> Self {
        let density = if total_nodes > 0 {
            total_edges as f64 / (total_nodes as f64 * total_nodes as f64)
        } else {
            0.0
        };
        let avg_degree = if total_nodes > 0 {
            total_edges as f64 / total_nodes as f64
        } else {
            0.0
        };
        Self {
            total_nodes,
            total_edges,
            density,
            avg_in_degree: avg_degree,
            avg_out_degree: avg_degree,
        }
    }
}

/// Classified query type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryType {
    /// Simple lookup of a known thing
    Lookup,
    /// Multi-fact reasoning
    Reasoning,
    /// Open-ended exploration
    Exploratory,
    /// Time-anchored retrieval
    Temporal,
}

impl QueryType {
    /// Node-cap fraction of the graph for this query type
    fn node_fraction(&self) -> f64 {
        match self {
            QueryType::Lookup => 0.02,
            QueryType::Reasoning | QueryType::Temporal => 0.05,
            QueryType::Exploratory => 0.10,
        }
    }

    /// Default operation key for this query type
    pub fn operation_key(&self) -> OperationKey {
        match self {
            QueryType::Lookup => OperationKey::Lookup,
            QueryType::Reasoning => OperationKey::Reasoning,
            QueryType::Exploratory => OperationKey::Exploration,
            QueryType::Temporal => OperationKey::TemporalScan,
        }
    }
}

/// Budgeted operation kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKey {
    /// Fast single-answer lookup
    Lookup,
    /// Reasoning retrieval
    Reasoning,
    /// Broad exploration
    Exploration,
    /// Time-anchored scan
    TemporalScan,
}

impl OperationKey {
    /// Base budget for this operation
    fn base_budget(&self) -> OperationBudget {
        match self {
            OperationKey::Lookup => OperationBudget {
                time_ms: 150,
                max_nodes: 200,
                max_api_calls: 1,
            },
            OperationKey::Reasoning => OperationBudget {
                time_ms: 400,
                max_nodes: 1000,
                max_api_calls: 2,
            },
            OperationKey::Exploration => OperationBudget {
                time_ms: 800,
                max_nodes: 2500,
                max_api_calls: 2,
            },
            OperationKey::TemporalScan => OperationBudget {
                time_ms: 300,
                max_nodes: 800,
                max_api_calls: 1,
            },
        }
    }

    /// Fixed cold-start budget for this operation
    fn cold_start_budget(&self) -> OperationBudget {
        OperationBudget {
            time_ms: 100,
            max_nodes: 50,
            max_api_calls: 1,
        }
    }
}

/// User-selected thoroughness multiplier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Thoroughness {
    /// Half the time and node budget
    Quick,
    /// Unmodified budget
    #[default]
    Balanced,
    /// Double the time and node budget
    Deep,
}

impl Thoroughness {
    /// Multiplier applied to time and node budgets (never to API calls)
    pub fn multiplier(&self) -> f64 {
        match self {
            Thoroughness::Quick => 0.5,
            Thoroughness::Balanced => 1.0,
            Thoroughness::Deep => 2.0,
        }
    }
}

// ============================================================================
// OUTPUTS
// ============================================================================

/// Resource ceilings for one operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationBudget {
    /// Wall-clock ceiling in milliseconds
    pub time_ms: u64,
    /// Node-visit ceiling
    pub max_nodes: u64,
    /// Provider call ceiling (binary concerns: never scaled)
    pub max_api_calls: u32,
}

/// Structural limits for spreading activation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptiveLimits {
    /// Seed-set size
    pub entry_points: u32,
    /// Maximum hops
    pub max_hops: u32,
    /// Maximum activated nodes
    pub max_nodes: u64,
}

/// Quality floor that permits early termination
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityTarget {
    /// Required top-result confidence
    pub confidence: f64,
    /// Required coverage of the allotted node budget
    pub min_coverage: f64,
}

impl QualityTarget {
    /// Per-query-type target table
    pub fn for_query_type(query_type: QueryType) -> Self {
        match query_type {
            QueryType::Lookup => QualityTarget {
                confidence: 0.80,
                min_coverage: 0.30,
            },
            QueryType::Reasoning => QualityTarget {
                confidence: 0.70,
                min_coverage: 0.50,
            },
            QueryType::Exploratory => QualityTarget {
                confidence: 0.60,
                min_coverage: 0.70,
            },
            QueryType::Temporal => QualityTarget {
                confidence: 0.70,
                min_coverage: 0.40,
            },
        }
    }
}

/// Full ABS decision for one retrieval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetPlan {
    /// Resource ceilings
    pub budget: OperationBudget,
    /// Structural limits
    pub limits: AdaptiveLimits,
    /// Early-termination floor
    pub quality_target: QualityTarget,
    /// Thoroughness that was applied
    pub thoroughness_applied: Thoroughness,
    /// Whether cold-start limits were used
    pub is_cold_start: bool,
    /// Human-readable account of the decision
    pub explanation: String,
}

/// Which resource ran out first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustedResource {
    /// Wall-clock budget spent
    TimeLimitReached,
    /// Node budget spent
    NodeLimitReached,
    /// Provider-call budget spent
    ApiCallLimitReached,
    /// Hop ceiling reached before quality
    HopLimitReached,
    /// Caller cancelled between hops
    Cancelled,
}

/// Returned when the budget ran out before the quality target was met
///
/// This is a partial result annotation, never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetExhaustion {
    /// The resource that ran out
    pub exhausted_resource: ExhaustedResource,
    /// Best confidence achieved
    pub quality_achieved: f64,
    /// Confidence that was required
    pub quality_target: f64,
    /// Coverage achieved
    pub coverage_achieved: f64,
    /// Always true
    pub partial: bool,
    /// Human-readable account
    pub explanation: String,
    /// What the user can do about it
    pub suggestion: String,
}

impl BudgetExhaustion {
    /// Build the annotation with its canonical explanation text
    pub fn new(
        exhausted_resource: ExhaustedResource,
        quality_achieved: f64,
        quality_target: f64,
        coverage_achieved: f64,
    ) -> Self {
        let explanation = format!(
            "Search stopped at {:.0}% confidence against a {:.0}% target",
            quality_achieved * 100.0,
            quality_target * 100.0
        );
        Self {
            exhausted_resource,
            quality_achieved,
            quality_target,
            coverage_achieved,
            partial: true,
            explanation,
            suggestion: "Try \"Search deeper\" or be more specific".to_string(),
        }
    }
}

// ============================================================================
// PLANNING
// ============================================================================

/// Produce the budget plan for one retrieval
pub fn plan(
    metrics: &GraphMetrics,
    query_type: QueryType,
    thoroughness: Option<Thoroughness>,
    operation_override: Option<OperationKey>,
) -> BudgetPlan {
    let thoroughness = thoroughness.unwrap_or_default();
    let operation = operation_override.unwrap_or_else(|| query_type.operation_key());
    let is_cold_start = metrics.total_nodes < COLD_START_NODE_THRESHOLD;

    let (limits, mut budget) = if is_cold_start {
        (
            AdaptiveLimits {
                entry_points: 2,
                max_hops: 2,
                max_nodes: 50,
            },
            operation.cold_start_budget(),
        )
    } else {
        (adaptive_limits(metrics, query_type), operation.base_budget())
    };

    // Thoroughness scales time and nodes; API calls stay binary
    let factor = thoroughness.multiplier();
    budget.time_ms = ((budget.time_ms as f64) * factor).round() as u64;
    budget.max_nodes = ((budget.max_nodes as f64) * factor).round() as u64;

    let explanation = if is_cold_start {
        format!(
            "Cold-start mode ({} nodes < {}): fixed limits, {} entry points, {} hops",
            metrics.total_nodes, COLD_START_NODE_THRESHOLD, limits.entry_points, limits.max_hops
        )
    } else {
        format!(
            "Adaptive mode: {} nodes at density {:.4} give {} entry points, {} hops, {} node cap",
            metrics.total_nodes, metrics.density, limits.entry_points, limits.max_hops,
            limits.max_nodes
        )
    };

    BudgetPlan {
        budget,
        limits,
        quality_target: QualityTarget::for_query_type(query_type),
        thoroughness_applied: thoroughness,
        is_cold_start,
        explanation,
    }
}

fn adaptive_limits(metrics: &GraphMetrics, query_type: QueryType) -> AdaptiveLimits {
    let entry_points = (metrics.total_nodes.max(1) as f64).log10().ceil() as u32;
    let entry_points = entry_points.clamp(ENTRY_POINT_RANGE.0, ENTRY_POINT_RANGE.1);

    let max_hops = if metrics.density < 0.001 {
        5
    } else if metrics.density < 0.01 {
        4
    } else if metrics.density < 0.05 {
        3
    } else {
        2
    };

    let raw = (metrics.total_nodes as f64 * query_type.node_fraction()).round() as u64;
    let max_nodes = raw.clamp(MAX_NODES_RANGE.0, MAX_NODES_RANGE.1);

    AdaptiveLimits {
        entry_points,
        max_hops,
        max_nodes,
    }
}

// ============================================================================
// TESTS
// ============================================================================
