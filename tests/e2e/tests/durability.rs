//! The full engine over the SQLite adapter
//!
//! Everything the scenario tests exercise in memory must survive a trip
//! through the durable store, including a process-restart-shaped reopen.

use std::sync::Arc;

use engram_core::{
    Direction, EdgeCreationSource, EdgeType, NodeFilters, SqliteStore, StorageAdapter,
};
use engram_e2e::{concept, harness_with_store, search};

fn temp_db() -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engram.db");
    (dir, path)
}

#[tokio::test]
async fn search_works_over_sqlite() {
    let (_dir, path) = temp_db();
    let store = Arc::new(SqliteStore::open(Some(path)).unwrap());
    let h = harness_with_store(store, vec![]);

    concept(&h.engine, "Rust ownership", "rust ownership borrowing").await;
    concept(&h.engine, "Dinner", "cooking pasta").await;

    let response = search(&h.engine, "rust ownership").await;
    assert!(response.count >= 1);
    assert_eq!(response.data[0].node.title, "Rust ownership");
}

#[tokio::test]
async fn graph_survives_reopen() {
    let (_dir, path) = temp_db();

    let (node_id, edge_id);
    {
        let store = Arc::new(SqliteStore::open(Some(path.clone())).unwrap());
        let h = harness_with_store(store, vec![]);

        let a = concept(&h.engine, "persisted", "rust ownership").await;
        let b = concept(&h.engine, "neighbor", "rust borrowing").await;
        let edge = h
            .engine
            .create_edge(
                &a.id,
                &b.id,
                EdgeType::RelatesTo,
                EdgeCreationSource::Extraction,
                Some(0.6),
            )
            .unwrap();
        node_id = a.id;
        edge_id = edge.id;
    }

    // Reopen: a fresh adapter and engine over the same file
    let store = Arc::new(SqliteStore::open(Some(path)).unwrap());
    let h = harness_with_store(store, vec![]);
    h.engine.rebuild_index().unwrap();

    let node = h.engine.store().get_node(&node_id).unwrap();
    assert_eq!(node.title, "persisted");
    assert!(node.embedding.is_some());

    let edge = h.engine.store().get_edge(&edge_id).unwrap();
    assert!((edge.weights.base_weight - 0.6).abs() < 1e-9);

    // The rebuilt lexical index serves search again
    let response = search(&h.engine, "rust ownership").await;
    assert!(response.count >= 1);
}

#[tokio::test]
async fn stability_growth_persists_through_sqlite() {
    let (_dir, path) = temp_db();
    let store = Arc::new(SqliteStore::open(Some(path)).unwrap());
    let h = harness_with_store(store, vec![]);

    let node = concept(&h.engine, "accessed", "rust ownership").await;
    let s0 = h.engine.store().get_node(&node.id).unwrap().neural.stability;

    h.clock.advance(chrono::Duration::days(2));
    h.engine.get_node(&node.id).unwrap();

    let after = h.engine.store().get_node(&node.id).unwrap();
    assert!(after.neural.stability > s0);
    assert_eq!(after.neural.access_count, 1);
}

#[tokio::test]
async fn cascade_and_index_removal_over_sqlite() {
    let (_dir, path) = temp_db();
    let store = Arc::new(SqliteStore::open(Some(path)).unwrap());
    let h = harness_with_store(store, vec![]);

    let a = concept(&h.engine, "doomed", "rust ownership").await;
    let b = concept(&h.engine, "survivor", "rust borrowing").await;
    h.engine
        .create_edge(
            &a.id,
            &b.id,
            EdgeType::RelatesTo,
            EdgeCreationSource::Extraction,
            None,
        )
        .unwrap();

    h.engine.delete_node(&a.id).unwrap();

    assert!(h.engine.store().get_node(&a.id).is_err());
    assert!(h
        .engine
        .store()
        .edges_for(&b.id, Direction::Both)
        .unwrap()
        .is_empty());
    assert_eq!(h.engine.list_nodes(&NodeFilters::default(), 10).unwrap().len(), 1);

    // The deleted node no longer matches lexically
    let response = search(&h.engine, "doomed").await;
    assert_eq!(response.count, 0);
}

#[tokio::test]
async fn config_documents_round_trip_with_schema_version() {
    let (_dir, path) = temp_db();
    let store: Arc<dyn StorageAdapter> = Arc::new(SqliteStore::open(Some(path)).unwrap());

    let config = engram_core::HybridWeightsConfig::default();
    store
        .put_config("hybrid_weights", &serde_json::to_value(&config).unwrap())
        .unwrap();

    let raw = store.get_config("hybrid_weights").unwrap().unwrap();
    assert_eq!(raw["_schemaVersion"], 2);
    let loaded: engram_core::HybridWeightsConfig = engram_core::load_config(raw).unwrap();
    assert_eq!(loaded, config);

    // A v1 document on disk migrates on load
    let v1 = serde_json::json!({
        "_schemaVersion": 1,
        "denseWeight": 0.8,
        "lexicalWeight": 0.2
    });
    store.put_config("hybrid_weights", &v1).unwrap();
    let migrated: engram_core::HybridWeightsConfig =
        engram_core::load_config(store.get_config("hybrid_weights").unwrap().unwrap()).unwrap();
    assert_eq!(migrated.schema_version, 2);
    assert!((migrated.dense_weight - 0.8).abs() < 1e-12);
}
