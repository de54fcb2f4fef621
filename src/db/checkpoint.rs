//! Checkpoint store — durable stage and state snapshots per document.
//!
//! One row per document, overwritten after every completed stage. Rows are
//! never deleted by the pipeline itself; clearing a row to force a
//! reprocess is an operator action.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::DatabaseError;
use crate::models::{DocumentState, Stage};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS checkpoints (
    document_id TEXT PRIMARY KEY,
    stage TEXT NOT NULL,
    state TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

/// Open (creating if needed) the checkpoint database at `path`.
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

/// In-memory database for tests.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    conn.execute_batch(SCHEMA)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    // Concurrent per-document workers share this database file; a busy
    // writer waits instead of failing.
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA busy_timeout=5000;",
    )?;
    Ok(())
}

/// A persisted checkpoint: the last completed stage and the full document
/// state as of that stage.
#[derive(Debug, Clone)]
pub struct CheckpointRecord {
    pub document_id: Uuid,
    pub stage: Stage,
    pub state: DocumentState,
    pub updated_at: String,
}

/// Handle on the checkpoint table. Each worker opens its own.
pub struct CheckpointStore {
    conn: Connection,
}

impl CheckpointStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: open_database(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: open_memory_database()?,
        })
    }

    /// Record `stage` as the last completed stage for this document,
    /// replacing any previous checkpoint.
    pub fn save(
        &self,
        document_id: &Uuid,
        stage: Stage,
        state: &DocumentState,
    ) -> Result<(), DatabaseError> {
        let state_json = serde_json::to_string(state)?;
        let now = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        self.conn.execute(
            "INSERT INTO checkpoints (document_id, stage, state, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(document_id) DO UPDATE SET
                 stage = excluded.stage,
                 state = excluded.state,
                 updated_at = excluded.updated_at",
            params![document_id.to_string(), stage.as_str(), state_json, now],
        )?;
        Ok(())
    }

    /// Load the checkpoint for `document_id`, if one exists.
    pub fn load(&self, document_id: &Uuid) -> Result<Option<CheckpointRecord>, DatabaseError> {
        let row = self
            .conn
            .query_row(
                "SELECT document_id, stage, state, updated_at
                 FROM checkpoints WHERE document_id = ?1",
                params![document_id.to_string()],
                |row| {
                    Ok(CheckpointRow {
                        document_id: row.get(0)?,
                        stage: row.get(1)?,
                        state: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()?;

        match row {
            Some(row) => Ok(Some(record_from_row(row)?)),
            None => Ok(None),
        }
    }
}

/// Raw row before enum and JSON decoding.
struct CheckpointRow {
    document_id: String,
    stage: String,
    state: String,
    updated_at: String,
}

fn record_from_row(row: CheckpointRow) -> Result<CheckpointRecord, DatabaseError> {
    let stage: Stage = row.stage.parse()?;
    let document_id = Uuid::parse_str(&row.document_id).map_err(|_| DatabaseError::InvalidEnum {
        field: "document_id".to_string(),
        value: row.document_id.clone(),
    })?;
    let state: DocumentState = serde_json::from_str(&row.state)?;
    Ok(CheckpointRecord {
        document_id,
        stage,
        state,
        updated_at: row.updated_at,
    })
}
