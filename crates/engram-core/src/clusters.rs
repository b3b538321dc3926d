//! Cluster routing
//!
//! The retrieval engine consumes `{cluster, centroid}` pairs from the
//! cluster service and routes queries to the clusters they most resemble.
//! Routing prunes the hop frontier in spreading activation and supplies the
//! `affinity` re-rank signal.

use serde::{Deserialize, Serialize};

use crate::mathx::{cosine_similarity, truncate_to};

/// Minimum affinity for a cluster to participate in routing
pub const MIN_AFFINITY: f64 = 0.30;
/// Top-two affinity gap at or below which every cluster is searched
pub const SEARCH_ALL_GAP: f64 = 0.10;
/// Maximum clusters selected by the top-clusters strategy
pub const MAX_CLUSTERS: usize = 3;

// ============================================================================
// CLUSTER VIEW
// ============================================================================

/// The slice of a cluster the retrieval engine reads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    /// Cluster identifier
    pub id: String,
    /// Cluster display name
    pub name: String,
    /// Embedding-sized centroid
    pub centroid: Vec<f32>,
    /// Pinned clusters survive evolution
    #[serde(default)]
    pub pinned: bool,
    /// What created the cluster
    #[serde(default)]
    pub source: Option<String>,
    /// Number of member nodes
    #[serde(default)]
    pub node_count: u64,
}

// ============================================================================
// ROUTING
// ============================================================================

/// How retrieval should treat cluster membership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// No cluster stands out; search everything
    AllClusters,
    /// One clear cluster; restrict to it
    PrimaryOnly,
    /// A few clusters lead; restrict to the top ones
    TopClusters,
}

/// A routed cluster with its affinity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAffinity {
    /// Cluster id
    pub cluster_id: String,
    /// `max(0, cosine(query, centroid))`
    pub affinity: f64,
}

/// Routing decision for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRouting {
    /// Selected strategy
    pub strategy: RoutingStrategy,
    /// Clusters to search, best first (empty for `all_clusters`)
    pub clusters_to_search: Vec<ClusterAffinity>,
    /// Every affinity that survived the minimum, best first
    pub affinities: Vec<ClusterAffinity>,
}

impl ClusterRouting {
    /// Whether a node in `cluster_id` (or none) is inside the routed scope
    pub fn admits(&self, cluster_id: Option<&str>) -> bool {
        match self.strategy {
            RoutingStrategy::AllClusters => true,
            _ => match cluster_id {
                Some(id) => self
                    .clusters_to_search
                    .iter()
                    .any(|c| c.cluster_id == id),
                // Unclustered nodes stay reachable regardless of routing
                None => true,
            },
        }
    }

    /// Affinity of a specific cluster, zero when it did not survive routing
    pub fn affinity_of(&self, cluster_id: &str) -> f64 {
        self.affinities
            .iter()
            .find(|c| c.cluster_id == cluster_id)
            .map(|c| c.affinity)
            .unwrap_or(0.0)
    }
}

/// Route a query vector across the known cluster centroids
///
/// Affinity is `max(0, cosine(query, centroid))`, computed over the common
/// prefix when dimensionalities differ (Matryoshka property). Selection:
/// - nothing survives `MIN_AFFINITY` -> `all_clusters`
/// - one survives -> `primary_only`
/// - top-two gap <= `SEARCH_ALL_GAP` -> `all_clusters`
/// - otherwise -> `top_clusters` bounded by `MAX_CLUSTERS`
pub fn route(query: &[f32], clusters: &[ClusterRef]) -> ClusterRouting {
    let mut affinities: Vec<ClusterAffinity> = clusters
        .iter()
        .filter_map(|cluster| {
            let k = query.len().min(cluster.centroid.len());
            if k == 0 {
                return None;
            }
            let q = truncate_to(query, k);
            let c = truncate_to(&cluster.centroid, k);
            let cosine = cosine_similarity(&q, &c).ok()?;
            let affinity = f64::from(cosine).max(0.0);
            (affinity >= MIN_AFFINITY).then(|| ClusterAffinity {
                cluster_id: cluster.id.clone(),
                affinity,
            })
        })
        .collect();

    affinities.sort_by(|a, b| {
        b.affinity
            .partial_cmp(&a.affinity)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.cluster_id.cmp(&b.cluster_id))
    });

    let (strategy, clusters_to_search) = match affinities.len() {
        0 => (RoutingStrategy::AllClusters, Vec::new()),
        1 => (RoutingStrategy::PrimaryOnly, affinities.clone()),
        _ => {
            let gap = affinities[0].affinity - affinities[1].affinity;
            if gap <= SEARCH_ALL_GAP {
                (RoutingStrategy::AllClusters, Vec::new())
            } else {
                // Leaders only: clusters within the gap of the best one
                let floor = affinities[0].affinity - SEARCH_ALL_GAP;
                (
                    RoutingStrategy::TopClusters,
                    affinities
                        .iter()
                        .filter(|c| c.affinity >= floor)
                        .take(MAX_CLUSTERS)
                        .cloned()
                        .collect(),
                )
            }
        }
    };

    ClusterRouting {
        strategy,
        clusters_to_search,
        affinities,
    }
}

// ============================================================================
// TESTS
// ============================================================================
