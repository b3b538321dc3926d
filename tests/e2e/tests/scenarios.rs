//! End-to-end retrieval scenarios
//!
//! Each test walks one complete behavior through the public engine API:
//! cold-start budgeting, forgetting-curve decay, co-activation learning,
//! cluster-routed spreading, budget exhaustion, and similarity maintenance.

use chrono::Duration;
use engram_core::budget::{self, GraphMetrics};
use engram_core::{
    CancelToken, Clock, ClusterRef, Direction, EdgeCreationSource, EdgeType, ExhaustedResource,
    Lifecycle, QueryType, SearchRequest, Signal, Thoroughness, UpdateNodePatch,
};
use engram_e2e::{concept, concept_in_cluster, harness, harness_with_clusters, search};

// ============================================================================
// SCENARIO 1: COLD-START EXPLORATORY
// ============================================================================

#[test]
fn cold_start_plan_uses_fixed_limits() {
    // 150 nodes, exploratory, balanced
    let metrics = GraphMetrics::from_counts(150, 450);
    let plan = budget::plan(
        &metrics,
        QueryType::Exploratory,
        Some(Thoroughness::Balanced),
        None,
    );

    assert!(plan.is_cold_start);
    assert_eq!(plan.limits.max_nodes, 50);
    assert_eq!(plan.limits.entry_points, 2);
    assert_eq!(plan.limits.max_hops, 2);
}

#[tokio::test]
async fn cold_start_semantic_only_seed() {
    let h = harness();

    // A node reachable only through the dense channel: "dinner" shares an
    // axis with "pasta" but no token
    concept(&h.engine, "Weeknight meal", "pasta pasta pasta kubernetes").await;
    for i in 0..20 {
        concept(&h.engine, &format!("filler {i}"), "nothing relevant here").await;
    }

    let response = search(&h.engine, "dinner").await;

    assert_eq!(response.count, 1);
    let top = &response.data[0];
    assert_eq!(top.node.title, "Weeknight meal");
    assert!(top.breakdown.semantic > 0.85);
    assert_eq!(top.breakdown.lexical, 0.0);
    assert_eq!(top.primary_signal, Signal::Semantic);
    assert!(response.qcs.used_embeddings);
}

// ============================================================================
// SCENARIO 2: FORGETTING-CURVE DECAY
// ============================================================================

#[tokio::test]
async fn decay_bands_and_dormant_preservation() {
    let h = harness();
    let node = concept(&h.engine, "Fading fact", "rust ownership").await;

    // Concept default stability is 7 days; assert the bands relative to it
    // by reading the raw store value and asserting bands relatively instead
    let stability = h.engine.store().get_node(&node.id).unwrap().neural.stability;

    // Past ~0.7 stabilities of elapsed time retrievability drops under 0.5
    h.clock.advance(Duration::days((stability * 2.0) as i64));
    let listed = h
        .engine
        .list_nodes(&Default::default(), 100)
        .unwrap()
        .into_iter()
        .find(|n| n.id == node.id)
        .unwrap();
    assert_eq!(listed.lifecycle, Lifecycle::Weak);
    // Listing is a scan: nothing was persisted
    assert_eq!(
        h.engine.store().get_node(&node.id).unwrap().lifecycle,
        Lifecycle::Active
    );

    // Far beyond: dormant via the sweep, then a GET grows stability but
    // leaves DORMANT alone
    h.clock.advance(Duration::days((stability * 20.0) as i64));
    h.engine.run_decay_sweep().unwrap();
    assert_eq!(
        h.engine.store().get_node(&node.id).unwrap().lifecycle,
        Lifecycle::Dormant
    );

    let s_before = h.engine.store().get_node(&node.id).unwrap().neural.stability;
    let fetched = h.engine.get_node(&node.id).unwrap();
    assert!(fetched.neural.stability >= s_before);
    assert_eq!(fetched.lifecycle, Lifecycle::Dormant);

    // Only the explicit patch reactivates
    let patched = h
        .engine
        .update_node(
            &node.id,
            UpdateNodePatch {
                lifecycle: Some(Lifecycle::Active),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(patched.lifecycle, Lifecycle::Active);
}

// ============================================================================
// SCENARIO 3: CO-ACTIVATION STRENGTHENING
// ============================================================================

#[tokio::test]
async fn coactivation_strengthens_then_erodes() {
    let h = harness();
    let a = concept(&h.engine, "alpha", "rust things").await;
    let b = concept(&h.engine, "beta", "cooking things").await;

    let edge = h
        .engine
        .create_edge(
            &a.id,
            &b.id,
            EdgeType::RelatesTo,
            EdgeCreationSource::Extraction,
            Some(0.50),
        )
        .unwrap();
    assert!((edge.effective_weight() - 0.50).abs() < 1e-9);

    // A session in which both nodes surfaced
    let mut session = engram_core::Session::start(h.clock.now());
    session.record_access(&a.id, None, h.clock.now());
    session.record_access(&b.id, None, h.clock.now());
    h.engine.store().put_session(&session).unwrap();

    // First engagement: delta 0.10 * (1 - 0.50) = 0.05
    h.engine.record_engagement(&session.id, &a.id, 6).unwrap();
    let after_one = h.engine.store().get_edge(&edge.id).unwrap();
    assert!((after_one.weights.coactivation_bonus - 0.05).abs() < 1e-9);
    assert!((after_one.effective_weight() - 0.55).abs() < 1e-9);

    // Second: delta 0.10 * (1 - 0.55) = 0.045
    h.engine.record_engagement(&session.id, &a.id, 8).unwrap();
    let after_two = h.engine.store().get_edge(&edge.id).unwrap();
    assert!((after_two.weights.coactivation_bonus - 0.095).abs() < 1e-9);
    assert!((after_two.effective_weight() - 0.595).abs() < 1e-9);

    // Three straight ignores decay the bonus by 5%
    for _ in 0..3 {
        h.engine.record_engagement(&session.id, &a.id, 1).unwrap();
    }
    let after_ignores = h.engine.store().get_edge(&edge.id).unwrap();
    assert!((after_ignores.weights.coactivation_bonus - 0.095 * 0.95).abs() < 1e-9);
}

// ============================================================================
// SCENARIO 4: CLUSTER-ROUTED SPREADING
// ============================================================================

#[tokio::test]
async fn clear_primary_cluster_prunes_spread() {
    // Affinities against a "cooking" query: A = 0.8, B = 0.3; the 0.5 gap
    // selects top_clusters = [A]
    let clusters = vec![
        ClusterRef {
            id: "cluster-a".to_string(),
            name: "food".to_string(),
            centroid: vec![0.0, 0.8, 0.6],
            pinned: false,
            source: None,
            node_count: 5,
        },
        ClusterRef {
            id: "cluster-b".to_string(),
            name: "infra".to_string(),
            centroid: vec![0.0, 0.3, 0.954],
            pinned: false,
            source: None,
            node_count: 5,
        },
    ];
    let h = harness_with_clusters(clusters);

    let in_a = concept_in_cluster(&h.engine, "Pasta night", "pasta pasta", Some("cluster-a")).await;
    let in_b =
        concept_in_cluster(&h.engine, "Cluster upgrade", "kubernetes", Some("cluster-b")).await;
    h.engine
        .create_edge(
            &in_a.id,
            &in_b.id,
            EdgeType::RelatesTo,
            EdgeCreationSource::Extraction,
            Some(0.9),
        )
        .unwrap();

    let response = search(&h.engine, "cooking").await;

    assert_eq!(
        response.metrics.routing_strategy,
        Some(engram_core::RoutingStrategy::TopClusters)
    );
    assert!(response.data.iter().any(|s| s.node.id == in_a.id));
    // The strong edge into cluster B was pruned by routing
    assert!(!response.data.iter().any(|s| s.node.id == in_b.id));
}

// ============================================================================
// SCENARIO 5: BUDGET EXHAUSTION
// ============================================================================

#[tokio::test]
async fn node_limit_exhaustion_reports_partial() {
    let h = harness();

    // Adaptive mode needs >= 200 nodes; a branching hub graph overruns the
    // ~50-node cap before the quality target is reached
    let hub = concept(&h.engine, "Incident hub", "kubernetes incident outage").await;
    let mut spokes = Vec::new();
    for i in 0..20 {
        let spoke = concept(&h.engine, &format!("spoke {i}"), "plain filler body").await;
        h.engine
            .create_edge(
                &hub.id,
                &spoke.id,
                EdgeType::RelatesTo,
                EdgeCreationSource::Extraction,
                Some(0.9),
            )
            .unwrap();
        spokes.push(spoke);
    }
    for (i, spoke) in spokes.iter().enumerate() {
        for j in 0..3 {
            let leaf = concept(&h.engine, &format!("leaf {i}-{j}"), "plain filler body").await;
            h.engine
                .create_edge(
                    &spoke.id,
                    &leaf.id,
                    EdgeType::RelatesTo,
                    EdgeCreationSource::Extraction,
                    Some(0.9),
                )
                .unwrap();
        }
    }
    for i in 0..170 {
        concept(&h.engine, &format!("padding {i}"), "unrelated content").await;
    }

    let response = h
        .engine
        .search(
            SearchRequest {
                query: "kubernetes incident outage".to_string(),
                filters: None,
                limit: 10,
                thoroughness: None,
                operation: None,
            },
            &CancelToken::new(),
        )
        .await
        .unwrap();

    let partial = response.partial.expect("exhaustion annotation");
    assert!(partial.partial);
    assert_eq!(partial.exhausted_resource, ExhaustedResource::NodeLimitReached);
    assert!(partial.quality_achieved < partial.quality_target);
    assert!(partial.explanation.contains('%'));
    assert!(partial.suggestion.contains("Search deeper"));
    // The best candidates seen so far still come back
    assert!(response.count >= 1);
    assert_eq!(response.data[0].node.id, hub.id);
}

// ============================================================================
// SCENARIO 6: SIMILARITY MAINTENANCE
// ============================================================================

#[tokio::test]
async fn similarity_edge_created_then_staled_by_reembedding() {
    let h = harness();

    // Cross-group word counts put the pair near cosine 0.94
    let first = concept(&h.engine, "Alpha", "rust rust rust rust pasta").await;
    let second = concept(&h.engine, "Beta", "rust rust rust pasta pasta").await;

    let edges = h.engine.store().edges_for(&second.id, Direction::Both).unwrap();
    let similar = edges
        .iter()
        .find(|e| e.edge_type == EdgeType::SimilarTo)
        .expect("similarity edge");
    assert!(similar.weights.base_weight >= 0.90);
    assert!(similar.weights.base_weight < 0.95);
    let edge_id = similar.id.clone();

    // Rewriting one node onto a different topic re-embeds it; the pairwise
    // similarity collapses and the edge goes stale
    h.engine
        .update_node(
            &second.id,
            UpdateNodePatch {
                body: Some("cooking pasta dinner".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(h.engine.store().get_edge(&edge_id).is_err());
    let _ = first;
}
