//! Engine-level invariants
//!
//! Properties that must hold regardless of graph shape: weight
//! recomputability, clamps, block round-trips, fallback bounds, and
//! re-ranker normalization.

use engram_core::fsrs::{lifecycle_band, retrievability};
use engram_core::memory::{parse_markdown, render_markdown};
use engram_core::search::substring_fallback;
use engram_core::weights::temporal_adjacent_weight;
use engram_core::{
    Clock, Direction, EdgeCreationSource, EdgeType, NodeFilters, NodeType, UpdateNodePatch,
};
use engram_e2e::{concept, harness};

#[test]
fn retrievability_is_monotone_and_starts_at_one() {
    for stability in [0.1, 1.0, 5.0, 50.0] {
        assert_eq!(retrievability(stability, 0.0), 1.0);
        let mut prev = 1.0;
        for day in 1..=100 {
            let r = retrievability(stability, f64::from(day));
            assert!(r < prev);
            assert!((0.0..=1.0).contains(&r));
            prev = r;
        }
    }
}

#[test]
fn lifecycle_bands_partition_the_unit_interval() {
    for r in (0..=100).map(|i| f64::from(i) / 100.0) {
        let band = lifecycle_band(r);
        if r >= 0.5 {
            assert_eq!(band, engram_core::Lifecycle::Active);
        } else if r >= 0.1 {
            assert_eq!(band, engram_core::Lifecycle::Weak);
        } else {
            assert_eq!(band, engram_core::Lifecycle::Dormant);
        }
    }
}

#[tokio::test]
async fn edge_components_recompute_effective_weight() {
    let h = harness();
    let a = concept(&h.engine, "a", "rust").await;
    let b = concept(&h.engine, "b", "pasta").await;
    let edge = h
        .engine
        .create_edge(
            &a.id,
            &b.id,
            EdgeType::PartOf,
            EdgeCreationSource::Extraction,
            None,
        )
        .unwrap();

    // Stored components are the authoritative representation
    let stored = h.engine.store().get_edge(&edge.id).unwrap();
    let recomputed = (stored.weights.base_weight * (1.0 + stored.weights.learned_adjustment)
        + stored.weights.coactivation_bonus)
        .clamp(0.10, 1.00);
    assert_eq!(recomputed, stored.effective_weight());
    assert!((0.10..=1.00).contains(&stored.effective_weight()));
    assert!((0.0..=0.30).contains(&stored.weights.coactivation_bonus));
    assert!((-0.30..=0.30).contains(&stored.weights.learned_adjustment));
}

#[test]
fn temporal_adjacency_weight_curve_is_bounded() {
    // Non-increasing across the window, absent beyond it
    let mut prev = f64::INFINITY;
    for minute in 0..=120 {
        let w = temporal_adjacent_weight(f64::from(minute)).unwrap();
        assert!(w <= prev);
        assert!((0.20..=1.0).contains(&w));
        prev = w;
    }
    assert!(temporal_adjacent_weight(120.5).is_none());
    assert!(temporal_adjacent_weight(-1.0).is_none());
}

#[tokio::test]
async fn markdown_blocks_round_trip() {
    let h = harness();
    let body = "# Heading\n\nA paragraph\nwith two lines\n\n- item one\n- item two\n\n> a quote\n\n```\nfn main() {}\n```\n\n---";
    let node = concept(&h.engine, "structured", body).await;

    let blocks = node.blocks.expect("blocks parsed");
    let rendered = render_markdown(&blocks);
    let reparsed = parse_markdown(&rendered, engram_e2e::epoch());

    assert_eq!(blocks.len(), reparsed.len());
    for (original, round_tripped) in blocks.iter().zip(reparsed.iter()) {
        assert_eq!(original.block_type, round_tripped.block_type);
        assert_eq!(original.content.trim_end(), round_tripped.content.trim_end());
        assert_eq!(original.children.len(), round_tripped.children.len());
    }
}

#[tokio::test]
async fn fallback_respects_limit_and_filters() {
    let h = harness();
    for i in 0..12 {
        concept(&h.engine, &format!("postgres note {i}"), "tuning postgres").await;
    }
    let nodes = h.engine.list_nodes(&NodeFilters::default(), 1000).unwrap();

    let hits = substring_fallback(nodes.iter(), "postgres", &NodeFilters::default(), 5);
    assert_eq!(hits.len(), 5);

    let filters = NodeFilters {
        types: Some(vec![NodeType::Episode]),
        ..Default::default()
    };
    assert!(substring_fallback(nodes.iter(), "postgres", &filters, 5).is_empty());
}

#[tokio::test]
async fn reranker_outputs_stay_normalized() {
    let h = harness();
    concept(&h.engine, "Rust ownership", "rust ownership borrowing rust").await;
    concept(&h.engine, "Pasta dinner", "cooking pasta dinner").await;
    concept(&h.engine, "Incident log", "kubernetes incident").await;

    let response = engram_e2e::search(&h.engine, "rust borrowing").await;
    assert!(response.count >= 1);

    for scored in &response.data {
        let b = &scored.breakdown;
        for signal in [b.semantic, b.lexical, b.graph, b.recency, b.authority, b.affinity] {
            assert!((0.0..=1.0).contains(&signal), "signal out of range: {signal}");
        }
        assert!((0.0..=1.0).contains(&scored.score));
    }
}

#[tokio::test]
async fn dormant_node_never_reactivated_by_reads() {
    let h = harness();
    let node = concept(&h.engine, "sleeper", "rust ownership").await;

    h.engine
        .update_node(
            &node.id,
            UpdateNodePatch {
                lifecycle: Some(engram_core::Lifecycle::Dormant),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Direct GET, list, search: none of them may promote
    h.engine.get_node(&node.id).unwrap();
    h.engine.list_nodes(&NodeFilters::default(), 100).unwrap();
    engram_e2e::search(&h.engine, "rust ownership").await;

    assert_eq!(
        h.engine.store().get_node(&node.id).unwrap().lifecycle,
        engram_core::Lifecycle::Dormant
    );
}

#[tokio::test]
async fn provisional_edges_promote_or_expire() {
    let h = harness();
    let a = concept(&h.engine, "a", "rust").await;
    let b = concept(&h.engine, "b", "pasta").await;
    let c = concept(&h.engine, "c", "kubernetes").await;

    let promoted_edge = h
        .engine
        .create_edge(
            &a.id,
            &b.id,
            EdgeType::TemporalAdjacent,
            EdgeCreationSource::Temporal,
            None,
        )
        .unwrap();
    let doomed_edge = h
        .engine
        .create_edge(
            &a.id,
            &c.id,
            EdgeType::TemporalAdjacent,
            EdgeCreationSource::Temporal,
            None,
        )
        .unwrap();

    let mut session = engram_core::Session::start(h.clock.now());
    session.record_access(&a.id, None, h.clock.now());
    session.record_access(&b.id, None, h.clock.now());
    h.engine.store().put_session(&session).unwrap();

    // Three engaged activations promote a->b; a->c never activates
    for _ in 0..3 {
        h.engine.record_engagement(&session.id, &b.id, 10).unwrap();
    }

    h.clock.advance(chrono::Duration::days(31));
    h.engine.run_edge_maintenance().unwrap();

    let kept = h.engine.store().get_edge(&promoted_edge.id).unwrap();
    assert_eq!(kept.status, engram_core::EdgeStatus::Confirmed);
    assert!(h.engine.store().get_edge(&doomed_edge.id).is_err());

    let remaining = h.engine.store().edges_for(&a.id, Direction::Both).unwrap();
    assert_eq!(remaining.len(), 1);
}
