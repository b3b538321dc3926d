//! SQLite storage adapter
//!
//! Durable adapter over rusqlite. Scalar and frequently-filtered fields get
//! real columns and indexes; nested structures (temporal model, provenance,
//! sync, edge bookkeeping) are JSON columns; embedding vectors are stored
//! as little-endian f32 blobs alongside their metadata.
//!
//! Separate reader/writer connections behind mutexes keep all methods on
//! `&self`, so the adapter is `Send + Sync` and shareable as `Arc<dyn
//! StorageAdapter>`.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{EngramError, Result};
use crate::memory::{
    Direction, EditRecord, Lifecycle, MemoryEdge, MemoryNode, NeuralState, NodeEmbedding,
    NodeFilters, NodeType, Session,
};

use super::{migrations, scan_vector_search, StorageAdapter, VectorHit, VectorQuery};

/// Durable SQLite-backed storage adapter
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl SqliteStore {
    /// Apply performance pragmas to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Open (or create) a store at the given path
    ///
    /// `None` resolves to the platform data directory.
    pub fn open(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => p,
            None => {
                let proj_dirs = ProjectDirs::from("dev", "engram", "core").ok_or_else(|| {
                    EngramError::StorageUnavailable(
                        "could not determine project directories".to_string(),
                    )
                })?;
                let data_dir = proj_dirs.data_dir();
                std::fs::create_dir_all(data_dir)?;
                data_dir.join("engram.db")
            }
        };

        let writer = Connection::open(&path)?;
        Self::configure_connection(&writer)?;
        migrations::apply_migrations(&writer)?;

        let reader = Connection::open(&path)?;
        Self::configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    fn writer(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.writer.lock().expect("writer lock")
    }

    fn reader(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.reader.lock().expect("reader lock")
    }
}

// ============================================================================
// ROW MAPPING
// ============================================================================

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Embedding metadata persisted next to the vector blob
#[derive(serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct EmbeddingMeta {
    dimensions: usize,
    model: String,
    context_prefix: String,
    context_hash: String,
    created_at: DateTime<Utc>,
    provisional: bool,
    version: u32,
}

fn node_to_row(node: &MemoryNode) -> Result<NodeRow> {
    let (embedding_blob, embedding_meta) = match &node.embedding {
        Some(embedding) => (
            Some(vector_to_blob(&embedding.vector)),
            Some(serde_json::to_string(&EmbeddingMeta {
                dimensions: embedding.dimensions,
                model: embedding.model.clone(),
                context_prefix: embedding.context_prefix.clone(),
                context_hash: embedding.context_hash.clone(),
                created_at: embedding.created_at,
                provisional: embedding.provisional,
                version: embedding.version,
            })?),
        ),
        None => (None, None),
    };

    Ok(NodeRow {
        blocks: node
            .blocks
            .as_ref()
            .map(|blocks| serde_json::to_string(blocks))
            .transpose()?,
        tags: serde_json::to_string(&node.tags)?,
        participants: serde_json::to_string(&node.participants)?,
        temporal: serde_json::to_string(&node.temporal)?,
        provenance: serde_json::to_string(&node.provenance)?,
        sync: serde_json::to_string(&node.sync)?,
        compression: node
            .compression
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?,
        embedding_blob,
        embedding_meta,
    })
}

struct NodeRow {
    blocks: Option<String>,
    tags: String,
    participants: String,
    temporal: String,
    provenance: String,
    sync: String,
    compression: Option<String>,
    embedding_blob: Option<Vec<u8>>,
    embedding_meta: Option<String>,
}

fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryNode> {
    let tags: String = row.get("tags")?;
    let participants: String = row.get("participants")?;
    let temporal: String = row.get("temporal")?;
    let provenance: String = row.get("provenance")?;
    let sync: String = row.get("sync")?;
    let blocks: Option<String> = row.get("blocks")?;
    let compression: Option<String> = row.get("compression")?;
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    let embedding_meta: Option<String> = row.get("embedding_meta")?;
    let node_type: String = row.get("node_type")?;
    let lifecycle: String = row.get("lifecycle")?;
    let extraction_depth: String = row.get("extraction_depth")?;

    let embedding = match (embedding_blob, embedding_meta) {
        (Some(blob), Some(meta_json)) => {
            let meta: EmbeddingMeta =
                serde_json::from_str(&meta_json).map_err(json_column_error)?;
            Some(NodeEmbedding {
                vector: blob_to_vector(&blob),
                dimensions: meta.dimensions,
                model: meta.model,
                context_prefix: meta.context_prefix,
                context_hash: meta.context_hash,
                created_at: meta.created_at,
                provisional: meta.provisional,
                version: meta.version,
            })
        }
        _ => None,
    };

    Ok(MemoryNode {
        id: row.get("id")?,
        node_type: NodeType::parse_name(&node_type),
        subtype: row.get("subtype")?,
        title: row.get("title")?,
        summary: row.get("summary")?,
        body: row.get("body")?,
        blocks: blocks
            .map(|b| serde_json::from_str(&b).map_err(json_column_error))
            .transpose()?,
        tags: serde_json::from_str(&tags).map_err(json_column_error)?,
        participants: serde_json::from_str(&participants).map_err(json_column_error)?,
        embedding,
        neural: NeuralState {
            stability: row.get("stability")?,
            difficulty: row.get("difficulty")?,
            retrievability: row.get("retrievability")?,
            access_count: row.get::<_, i64>("access_count")? as u32,
            last_accessed: row.get("last_accessed")?,
        },
        lifecycle: Lifecycle::parse_name(&lifecycle),
        extraction_depth: serde_json::from_value(serde_json::Value::String(extraction_depth))
            .map_err(json_column_error)?,
        temporal: serde_json::from_str(&temporal).map_err(json_column_error)?,
        provenance: serde_json::from_str(&provenance).map_err(json_column_error)?,
        sync: serde_json::from_str(&sync).map_err(json_column_error)?,
        compression: compression
            .map(|c| serde_json::from_str(&c).map_err(json_column_error))
            .transpose()?,
        cluster_id: row.get("cluster_id")?,
        pinned: row.get("pinned")?,
        starred: row.get("starred")?,
    })
}

fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryEdge> {
    let edge_type: String = row.get("edge_type")?;
    let status: String = row.get("status")?;
    let creation_source: String = row.get("creation_source")?;
    let neural: String = row.get("neural")?;

    Ok(MemoryEdge {
        id: row.get("id")?,
        edge_type: crate::memory::EdgeType::parse_name(&edge_type).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                rusqlite::types::Type::Text,
                format!("unknown edge type {edge_type}").into(),
            )
        })?,
        source: row.get("source")?,
        target: row.get("target")?,
        bidirectional: row.get("bidirectional")?,
        weights: crate::memory::WeightComponents {
            base_weight: row.get("base_weight")?,
            learned_adjustment: row.get("learned_adjustment")?,
            coactivation_bonus: row.get("coactivation_bonus")?,
        },
        status: serde_json::from_value(serde_json::Value::String(status))
            .map_err(json_column_error)?,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
        creation_source: serde_json::from_value(serde_json::Value::String(creation_source))
            .map_err(json_column_error)?,
        neural: serde_json::from_str(&neural).map_err(json_column_error)?,
        version: row.get::<_, i64>("version")? as u64,
    })
}

fn json_column_error(e: serde_json::Error) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

const NODE_COLUMNS: &str = "id, node_type, subtype, title, summary, body, blocks, tags, \
     participants, stability, difficulty, retrievability, access_count, last_accessed, \
     lifecycle, extraction_depth, temporal, provenance, sync, compression, cluster_id, pinned, \
     starred, created_at, embedding, embedding_meta";

const EDGE_COLUMNS: &str = "id, edge_type, source, target, bidirectional, base_weight, \
     learned_adjustment, coactivation_bonus, status, created_at, expires_at, creation_source, \
     neural, version";

fn enum_token<T: serde::Serialize>(value: &T) -> Result<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Err(EngramError::Internal(format!(
            "expected string-shaped enum, got {other}"
        ))),
    }
}

// ============================================================================
// ADAPTER IMPLEMENTATION
// ============================================================================

impl StorageAdapter for SqliteStore {
    fn put_node(&self, node: &MemoryNode) -> Result<()> {
        let row = node_to_row(node)?;
        let conn = self.writer();
        conn.execute(
            "INSERT OR REPLACE INTO nodes (
                id, node_type, subtype, title, summary, body, blocks, tags, participants,
                stability, difficulty, retrievability, access_count, last_accessed,
                lifecycle, extraction_depth, temporal, provenance, sync, compression,
                cluster_id, pinned, starred, created_at, embedding, embedding_meta
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                       ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26)",
            params![
                node.id,
                node.node_type.as_str(),
                node.subtype,
                node.title,
                node.summary,
                node.body,
                row.blocks,
                row.tags,
                row.participants,
                node.neural.stability,
                node.neural.difficulty,
                node.neural.retrievability,
                node.neural.access_count as i64,
                node.neural.last_accessed,
                node.lifecycle.as_str(),
                enum_token(&node.extraction_depth)?,
                row.temporal,
                row.provenance,
                row.sync,
                row.compression,
                node.cluster_id,
                node.pinned,
                node.starred,
                node.provenance.created_at,
                row.embedding_blob,
                row.embedding_meta,
            ],
        )?;
        Ok(())
    }

    fn get_node(&self, id: &str) -> Result<MemoryNode> {
        let conn = self.reader();
        conn.query_row(
            &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
            params![id],
            |row| row_to_node(row),
        )
        .optional()?
        .ok_or_else(|| EngramError::NotFound(format!("node {id}")))
    }

    fn delete_node(&self, id: &str) -> Result<()> {
        let conn = self.writer();
        let deleted = conn.execute("DELETE FROM nodes WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(EngramError::NotFound(format!("node {id}")));
        }
        Ok(())
    }

    fn list_nodes(&self, filters: &NodeFilters, limit: usize) -> Result<Vec<MemoryNode>> {
        // Filters are applied in Rust after a created_at-ordered scan; the
        // scalar filters could push down but the time-range filter reads the
        // JSON temporal column either way.
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes ORDER BY created_at DESC, id ASC"
        ))?;
        let nodes = stmt
            .query_map([], |row| row_to_node(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(nodes
            .into_iter()
            .filter(|node| filters.matches(node))
            .take(limit)
            .collect())
    }

    fn recent_embedded_nodes(&self, window: usize) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, embedding FROM nodes
             WHERE embedding IS NOT NULL
             ORDER BY json_extract(embedding_meta, '$.createdAt') DESC, id ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![window as i64], |row| {
                let id: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((id, blob_to_vector(&blob)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn count_nodes(&self) -> Result<u64> {
        let conn = self.reader();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM nodes", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn raise_neural(&self, id: &str, candidate: &NeuralState, lifecycle: Lifecycle) -> Result<()> {
        let conn = self.writer();
        let updated = conn.execute(
            "UPDATE nodes SET
                stability = CASE WHEN ?2 >= stability THEN ?2 ELSE stability END,
                difficulty = CASE WHEN ?2 >= stability THEN ?3 ELSE difficulty END,
                retrievability = ?4,
                access_count = MAX(access_count, ?5),
                last_accessed = MAX(last_accessed, ?6),
                lifecycle = ?7
             WHERE id = ?1",
            params![
                id,
                candidate.stability,
                candidate.difficulty,
                candidate.retrievability,
                candidate.access_count as i64,
                candidate.last_accessed,
                lifecycle.as_str(),
            ],
        )?;
        if updated == 0 {
            return Err(EngramError::NotFound(format!("node {id}")));
        }
        Ok(())
    }

    fn put_edge(&self, edge: &MemoryEdge) -> Result<()> {
        let conn = self.writer();
        let result = conn.execute(
            "INSERT OR REPLACE INTO edges (
                id, edge_type, source, target, bidirectional, base_weight,
                learned_adjustment, coactivation_bonus, status, created_at, expires_at,
                creation_source, neural, version
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                edge.id,
                edge.edge_type.as_str(),
                edge.source,
                edge.target,
                edge.bidirectional,
                edge.weights.base_weight,
                edge.weights.learned_adjustment,
                edge.weights.coactivation_bonus,
                enum_token(&edge.status)?,
                edge.created_at,
                edge.expires_at,
                enum_token(&edge.creation_source)?,
                serde_json::to_string(&edge.neural)?,
                edge.version as i64,
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, message))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(EngramError::Constraint(
                    message.unwrap_or_else(|| format!("edge {} references unknown node", edge.id)),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn get_edge(&self, id: &str) -> Result<MemoryEdge> {
        let conn = self.reader();
        conn.query_row(
            &format!("SELECT {EDGE_COLUMNS} FROM edges WHERE id = ?1"),
            params![id],
            |row| row_to_edge(row),
        )
        .optional()?
        .ok_or_else(|| EngramError::NotFound(format!("edge {id}")))
    }

    fn delete_edge(&self, id: &str) -> Result<()> {
        let conn = self.writer();
        let deleted = conn.execute("DELETE FROM edges WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(EngramError::NotFound(format!("edge {id}")));
        }
        Ok(())
    }

    fn edges_for(&self, node_id: &str, direction: Direction) -> Result<Vec<MemoryEdge>> {
        let clause = match direction {
            Direction::Outgoing => "source = ?1",
            Direction::Incoming => "target = ?1",
            Direction::Both => "source = ?1 OR target = ?1",
        };
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges WHERE {clause} ORDER BY id ASC"
        ))?;
        let edges = stmt
            .query_map(params![node_id], |row| row_to_edge(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn all_edges(&self) -> Result<Vec<MemoryEdge>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!("SELECT {EDGE_COLUMNS} FROM edges"))?;
        let edges = stmt
            .query_map([], |row| row_to_edge(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn compare_and_swap_edge(
        &self,
        id: &str,
        expected_version: u64,
        edge: &MemoryEdge,
    ) -> Result<bool> {
        let conn = self.writer();
        let updated = conn.execute(
            "UPDATE edges SET
                base_weight = ?3, learned_adjustment = ?4, coactivation_bonus = ?5,
                status = ?6, expires_at = ?7, neural = ?8, version = ?2 + 1
             WHERE id = ?1 AND version = ?2",
            params![
                id,
                expected_version as i64,
                edge.weights.base_weight,
                edge.weights.learned_adjustment,
                edge.weights.coactivation_bonus,
                enum_token(&edge.status)?,
                edge.expires_at,
                serde_json::to_string(&edge.neural)?,
            ],
        )?;
        if updated == 0 {
            // Distinguish a missing edge from a version conflict
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM edges WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(EngramError::NotFound(format!("edge {id}")));
            }
            return Ok(false);
        }
        Ok(true)
    }

    fn count_edges(&self) -> Result<u64> {
        let conn = self.reader();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn put_session(&self, session: &Session) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT OR REPLACE INTO sessions (id, started_at, ended_at, accesses)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                session.id,
                session.started_at,
                session.ended_at,
                serde_json::to_string(&session.accesses)?,
            ],
        )?;
        Ok(())
    }

    fn get_session(&self, id: &str) -> Result<Session> {
        let conn = self.reader();
        conn.query_row(
            "SELECT id, started_at, ended_at, accesses FROM sessions WHERE id = ?1",
            params![id],
            |row| {
                let accesses: String = row.get(3)?;
                Ok(Session {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    ended_at: row.get(2)?,
                    accesses: serde_json::from_str(&accesses).map_err(json_column_error)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| EngramError::NotFound(format!("session {id}")))
    }

    fn recent_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, started_at, ended_at, accesses FROM sessions
             ORDER BY started_at DESC, id ASC LIMIT ?1",
        )?;
        let sessions = stmt
            .query_map(params![limit as i64], |row| {
                let accesses: String = row.get(3)?;
                Ok(Session {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    ended_at: row.get(2)?,
                    accesses: serde_json::from_str(&accesses).map_err(json_column_error)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(sessions)
    }

    fn record_edit(&self, edit: &EditRecord) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT INTO edit_records (id, node_id, before, after, editor, edited_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edit.id,
                edit.node_id,
                serde_json::to_string(&edit.before)?,
                serde_json::to_string(&edit.after)?,
                edit.editor,
                edit.edited_at,
            ],
        )?;
        Ok(())
    }

    fn edits_for(&self, node_id: &str, limit: usize) -> Result<Vec<EditRecord>> {
        let conn = self.reader();
        let mut stmt = conn.prepare(
            "SELECT id, node_id, before, after, editor, edited_at
             FROM edit_records WHERE node_id = ?1
             ORDER BY edited_at DESC LIMIT ?2",
        )?;
        let edits = stmt
            .query_map(params![node_id, limit as i64], |row| {
                let before: String = row.get(2)?;
                let after: String = row.get(3)?;
                Ok(EditRecord {
                    id: row.get(0)?,
                    node_id: row.get(1)?,
                    before: serde_json::from_str(&before).map_err(json_column_error)?,
                    after: serde_json::from_str(&after).map_err(json_column_error)?,
                    editor: row.get(4)?,
                    edited_at: row.get(5)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edits)
    }

    fn vector_search(&self, query: &VectorQuery) -> Result<Vec<VectorHit>> {
        // Linear scan over embedded nodes. An ANN index can replace this
        // without touching callers.
        let conn = self.reader();
        let mut stmt = conn.prepare(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE embedding IS NOT NULL"
        ))?;
        let nodes = stmt
            .query_map([], |row| row_to_node(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(scan_vector_search(nodes.into_iter(), query))
    }

    fn get_config(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.reader();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM configs WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        value
            .map(|v| serde_json::from_str(&v).map_err(EngramError::from))
            .transpose()
    }

    fn put_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.writer();
        conn.execute(
            "INSERT OR REPLACE INTO configs (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))",
            params![key, serde_json::to_string(value)?],
        )?;
        Ok(())
    }

    fn schema_version(&self) -> Result<u32> {
        let conn = self.reader();
        Ok(migrations::get_current_version(&conn)?)
    }

    fn run_migrations(&self) -> Result<u32> {
        let conn = self.writer();
        Ok(migrations::apply_migrations(&conn)?)
    }

    fn health_check(&self) -> Result<()> {
        let conn = self.reader();
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let conn = self.writer();
        conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
