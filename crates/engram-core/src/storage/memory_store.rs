//! In-memory storage adapter
//!
//! Backs unit tests and small ephemeral graphs. Honors the same contracts
//! as the durable adapter: NotFound errors, edge CAS on version, and
//! higher-stability-wins neural merges.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{EngramError, Result};
use crate::memory::{
    Direction, EditRecord, Lifecycle, MemoryEdge, MemoryNode, NeuralState, NodeFilters, Session,
};

use super::{scan_vector_search, StorageAdapter, VectorHit, VectorQuery};

/// Schema version reported by the in-memory adapter
const MEMORY_SCHEMA_VERSION: u32 = super::migrations::CURRENT_SCHEMA_VERSION;

#[derive(Default)]
struct Inner {
    nodes: HashMap<String, MemoryNode>,
    edges: HashMap<String, MemoryEdge>,
    sessions: HashMap<String, Session>,
    edits: Vec<EditRecord>,
    configs: HashMap<String, serde_json::Value>,
}

/// HashMap-backed storage adapter
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageAdapter for MemoryStore {
    fn put_node(&self, node: &MemoryNode) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.nodes.insert(node.id.clone(), node.clone());
        Ok(())
    }

    fn get_node(&self, id: &str) -> Result<MemoryNode> {
        let inner = self.inner.read().expect("store lock");
        inner
            .nodes
            .get(id)
            .cloned()
            .ok_or_else(|| EngramError::NotFound(format!("node {id}")))
    }

    fn delete_node(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        if inner.nodes.remove(id).is_none() {
            return Err(EngramError::NotFound(format!("node {id}")));
        }
        inner
            .edges
            .retain(|_, edge| edge.source != id && edge.target != id);
        Ok(())
    }

    fn list_nodes(&self, filters: &NodeFilters, limit: usize) -> Result<Vec<MemoryNode>> {
        let inner = self.inner.read().expect("store lock");
        let mut nodes: Vec<MemoryNode> = inner
            .nodes
            .values()
            .filter(|node| filters.matches(node))
            .cloned()
            .collect();
        nodes.sort_by(|a, b| {
            b.provenance
                .created_at
                .cmp(&a.provenance.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        nodes.truncate(limit);
        Ok(nodes)
    }

    fn recent_embedded_nodes(&self, window: usize) -> Result<Vec<(String, Vec<f32>)>> {
        let inner = self.inner.read().expect("store lock");
        let mut embedded: Vec<&MemoryNode> = inner
            .nodes
            .values()
            .filter(|node| node.embedding.is_some())
            .collect();
        embedded.sort_by(|a, b| {
            let a_at = a.embedding.as_ref().map(|e| e.created_at);
            let b_at = b.embedding.as_ref().map(|e| e.created_at);
            b_at.cmp(&a_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(embedded
            .into_iter()
            .take(window)
            .filter_map(|node| {
                node.embedding
                    .as_ref()
                    .map(|e| (node.id.clone(), e.vector.clone()))
            })
            .collect())
    }

    fn count_nodes(&self) -> Result<u64> {
        Ok(self.inner.read().expect("store lock").nodes.len() as u64)
    }

    fn raise_neural(&self, id: &str, candidate: &NeuralState, lifecycle: Lifecycle) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        let node = inner
            .nodes
            .get_mut(id)
            .ok_or_else(|| EngramError::NotFound(format!("node {id}")))?;

        // Keep the higher stability; take the rest from whichever is newer
        if candidate.stability >= node.neural.stability {
            node.neural.stability = candidate.stability;
            node.neural.difficulty = candidate.difficulty;
        }
        node.neural.access_count = node.neural.access_count.max(candidate.access_count);
        node.neural.last_accessed = node.neural.last_accessed.max(candidate.last_accessed);
        node.neural.retrievability = candidate.retrievability;
        node.lifecycle = lifecycle;
        Ok(())
    }

    fn put_edge(&self, edge: &MemoryEdge) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        if !inner.nodes.contains_key(&edge.source) || !inner.nodes.contains_key(&edge.target) {
            return Err(EngramError::Constraint(format!(
                "edge {} references unknown node",
                edge.id
            )));
        }
        inner.edges.insert(edge.id.clone(), edge.clone());
        Ok(())
    }

    fn get_edge(&self, id: &str) -> Result<MemoryEdge> {
        let inner = self.inner.read().expect("store lock");
        inner
            .edges
            .get(id)
            .cloned()
            .ok_or_else(|| EngramError::NotFound(format!("edge {id}")))
    }

    fn delete_edge(&self, id: &str) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner
            .edges
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| EngramError::NotFound(format!("edge {id}")))
    }

    fn edges_for(&self, node_id: &str, direction: Direction) -> Result<Vec<MemoryEdge>> {
        let inner = self.inner.read().expect("store lock");
        let mut edges: Vec<MemoryEdge> = inner
            .edges
            .values()
            .filter(|edge| match direction {
                Direction::Outgoing => edge.source == node_id,
                Direction::Incoming => edge.target == node_id,
                Direction::Both => edge.source == node_id || edge.target == node_id,
            })
            .cloned()
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(edges)
    }

    fn all_edges(&self) -> Result<Vec<MemoryEdge>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.edges.values().cloned().collect())
    }

    fn compare_and_swap_edge(
        &self,
        id: &str,
        expected_version: u64,
        edge: &MemoryEdge,
    ) -> Result<bool> {
        let mut inner = self.inner.write().expect("store lock");
        let stored = inner
            .edges
            .get_mut(id)
            .ok_or_else(|| EngramError::NotFound(format!("edge {id}")))?;
        if stored.version != expected_version {
            return Ok(false);
        }
        let mut next = edge.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(true)
    }

    fn count_edges(&self) -> Result<u64> {
        Ok(self.inner.read().expect("store lock").edges.len() as u64)
    }

    fn put_session(&self, session: &Session) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Session> {
        let inner = self.inner.read().expect("store lock");
        inner
            .sessions
            .get(id)
            .cloned()
            .ok_or_else(|| EngramError::NotFound(format!("session {id}")))
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let inner = self.inner.read().expect("store lock");
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.id.cmp(&b.id)));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn record_edit(&self, edit: &EditRecord) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.edits.push(edit.clone());
        Ok(())
    }

    fn edits_for(&self, node_id: &str, limit: usize) -> Result<Vec<EditRecord>> {
        let inner = self.inner.read().expect("store lock");
        let mut edits: Vec<EditRecord> = inner
            .edits
            .iter()
            .filter(|edit| edit.node_id == node_id)
            .cloned()
            .collect();
        edits.sort_by(|a, b| b.edited_at.cmp(&a.edited_at));
        edits.truncate(limit);
        Ok(edits)
    }

    fn vector_search(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
        let inner = self.inner.read().expect("store lock");
        Ok(scan_vector_search(inner.nodes.values().cloned(), query))
    }

    fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let inner = self.inner.read().expect("store lock");
        Ok(inner.configs.get(key).cloned())
    }

    fn put_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let mut inner = self.inner.write().expect("store lock");
        inner.configs.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn schema_version(&self) -> Result<u32> {
        Ok(MEMORY_SCHEMA_VERSION)
    }

    fn run_migrations(&self) -> Result<u32> {
        Ok(0)
    }

    fn health_check(&self) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
