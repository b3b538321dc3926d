//! Database migrations
//!
//! Schema migration definitions for the SQLite adapter. Each migration is a
//! total step from version n to n+1; `apply_migrations` walks forward from
//! whatever version the database reports.

/// Schema version after every migration has applied
pub const CURRENT_SCHEMA_VERSION: u32 = 4;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: nodes, edges, sessions",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Edit records for body-change undo",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "Persisted per-tenant configuration documents",
        up: MIGRATION_V3_UP,
    },
    Migration {
        version: 4,
        description: "Episode participants for context prefixes",
        up: MIGRATION_V4_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    node_type TEXT NOT NULL DEFAULT 'concept',
    subtype TEXT,
    title TEXT NOT NULL,
    summary TEXT,
    body TEXT,
    blocks TEXT,              -- JSON: typed content blocks
    tags TEXT DEFAULT '[]',   -- JSON array

    -- Neural state (forgetting curve)
    stability REAL NOT NULL DEFAULT 1.0,
    difficulty REAL NOT NULL DEFAULT 5.0,
    retrievability REAL NOT NULL DEFAULT 1.0,
    access_count INTEGER NOT NULL DEFAULT 0,
    last_accessed TEXT NOT NULL,

    lifecycle TEXT NOT NULL DEFAULT 'ACTIVE',
    extraction_depth TEXT NOT NULL DEFAULT 'core',

    -- Four-type temporal model, provenance, sync bookkeeping
    temporal TEXT NOT NULL,   -- JSON
    provenance TEXT NOT NULL, -- JSON
    sync TEXT NOT NULL,       -- JSON
    compression TEXT,         -- JSON, present once compressed

    cluster_id TEXT,
    pinned INTEGER NOT NULL DEFAULT 0,
    starred INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,

    -- Embedding: vector as little-endian f32 blob, metadata as JSON
    embedding BLOB,
    embedding_meta TEXT
);

CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(node_type);
CREATE INDEX IF NOT EXISTS idx_nodes_lifecycle ON nodes(lifecycle);
CREATE INDEX IF NOT EXISTS idx_nodes_cluster ON nodes(cluster_id);
CREATE INDEX IF NOT EXISTS idx_nodes_created ON nodes(created_at);
CREATE INDEX IF NOT EXISTS idx_nodes_last_accessed ON nodes(last_accessed);

CREATE TABLE IF NOT EXISTS edges (
    id TEXT PRIMARY KEY,
    edge_type TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    bidirectional INTEGER NOT NULL DEFAULT 1,

    -- Authoritative weight components; effective weight is derived
    base_weight REAL NOT NULL,
    learned_adjustment REAL NOT NULL DEFAULT 0.0,
    coactivation_bonus REAL NOT NULL DEFAULT 0.0,

    status TEXT NOT NULL DEFAULT 'confirmed',
    created_at TEXT NOT NULL,
    expires_at TEXT,
    creation_source TEXT NOT NULL,
    neural TEXT NOT NULL,     -- JSON: activation bookkeeping
    version INTEGER NOT NULL DEFAULT 0,

    FOREIGN KEY (source) REFERENCES nodes(id) ON DELETE CASCADE,
    FOREIGN KEY (target) REFERENCES nodes(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target);
CREATE INDEX IF NOT EXISTS idx_edges_type ON edges(edge_type);
CREATE INDEX IF NOT EXISTS idx_edges_status ON edges(status);
CREATE INDEX IF NOT EXISTS idx_edges_expires ON edges(expires_at);

CREATE TABLE IF NOT EXISTS sessions (
    id TEXT PRIMARY KEY,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    accesses TEXT NOT NULL DEFAULT '[]'  -- JSON array of accesses
);

CREATE INDEX IF NOT EXISTS idx_sessions_started ON sessions(started_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Edit records
/// Body changes must leave an undo trail (JSON before/after snapshots)
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS edit_records (
    id TEXT PRIMARY KEY,
    node_id TEXT NOT NULL,
    before TEXT NOT NULL,  -- JSON snapshot
    after TEXT NOT NULL,   -- JSON snapshot
    editor TEXT NOT NULL,
    edited_at TEXT NOT NULL,
    FOREIGN KEY (node_id) REFERENCES nodes(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_edits_node ON edit_records(node_id);
CREATE INDEX IF NOT EXISTS idx_edits_at ON edit_records(edited_at);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Persisted configuration documents
/// Each document carries its own _schemaVersion inside the JSON
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS configs (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,   -- JSON document with _schemaVersion
    updated_at TEXT NOT NULL
);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// V4: Episode participants
/// Context prefixes fill a participants slot for episodes; the list needs
/// its own column next to tags
const MIGRATION_V4_UP: &str = r#"
ALTER TABLE nodes ADD COLUMN participants TEXT NOT NULL DEFAULT '[]';

UPDATE schema_version SET version = 4, applied_at = datetime('now');
"#;

/// Get current schema version from the database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations; returns how many were applied
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
