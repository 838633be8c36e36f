//! SQLite Snapshot Store
//!
//! File-based persistent storage using SQLite. One row per
//! `(document_id, revision)`; the payload column holds the codec output and
//! the remaining columns back listings without decoding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::codec;
use crate::domain::{DocumentSnapshot, SnapshotStore, SnapshotSummary};
use crate::error::{Result, StorageError};

#[derive(Clone)]
pub struct SqliteSnapshotStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSnapshotStore {
    /// Open (or create) a store at the given path
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        Self::with_connection(conn)
    }

    /// In-memory database (tests)
    pub fn new_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS document_snapshots (
                document_id TEXT NOT NULL,
                revision INTEGER NOT NULL,
                saved_at TEXT NOT NULL,
                checksum TEXT NOT NULL,
                feature_count INTEGER NOT NULL,
                shape_count INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (document_id, revision)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_snapshots_saved
             ON document_snapshots(document_id, saved_at)",
            [],
        )?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::database("SQLite connection lock poisoned"))
    }
}

/// SQLite INTEGER is signed
fn to_sql_revision(revision: u64) -> Result<i64> {
    i64::try_from(revision)
        .map_err(|_| StorageError::database(format!("Revision {revision} exceeds SQLite range")))
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn save_snapshot(&self, snapshot: &DocumentSnapshot) -> Result<()> {
        let payload = codec::encode(snapshot)?;
        // Checksum as stamped by the codec
        let stored = codec::decode(&payload)?;
        let revision = to_sql_revision(snapshot.revision)?;

        let conn = self.lock()?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT revision FROM document_snapshots WHERE document_id = ?1 AND revision = ?2",
                params![&snapshot.document_id, revision],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StorageError::conflict(&snapshot.document_id, snapshot.revision));
        }

        conn.execute(
            "INSERT INTO document_snapshots
                (document_id, revision, saved_at, checksum, feature_count, shape_count, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                &snapshot.document_id,
                revision,
                snapshot.saved_at,
                &stored.checksum,
                stored.statuses.len() as i64,
                stored.registry.shapes.len() as i64,
                &payload,
            ],
        )?;
        Ok(())
    }

    async fn get_snapshot(&self, document_id: &str, revision: u64) -> Result<DocumentSnapshot> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM document_snapshots WHERE document_id = ?1 AND revision = ?2",
                params![document_id, to_sql_revision(revision)?],
                |row| row.get(0),
            )
            .optional()?;
        let payload =
            payload.ok_or_else(|| StorageError::snapshot_not_found(document_id, Some(revision)))?;
        codec::decode(&payload)
    }

    async fn latest_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM document_snapshots
                 WHERE document_id = ?1
                 ORDER BY revision DESC
                 LIMIT 1",
                params![document_id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| StorageError::snapshot_not_found(document_id, None))?;
        codec::decode(&payload)
    }

    async fn list_snapshots(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotSummary>> {
        let conn = self.lock()?;
        // -1 = no limit
        let limit = limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX));
        let mut stmt = conn.prepare(
            "SELECT document_id, revision, saved_at, checksum, feature_count, shape_count
             FROM document_snapshots
             WHERE document_id = ?1
             ORDER BY revision DESC
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![document_id, limit], |row| {
            let revision: i64 = row.get(1)?;
            let saved_at: DateTime<Utc> = row.get(2)?;
            let feature_count: i64 = row.get(4)?;
            let shape_count: i64 = row.get(5)?;
            Ok(SnapshotSummary {
                document_id: row.get(0)?,
                revision: revision as u64,
                saved_at,
                checksum: row.get(3)?,
                feature_count: feature_count as usize,
                shape_count: shape_count as usize,
            })
        })?;

        let mut summaries = Vec::new();
        for row in rows {
            summaries.push(row?);
        }
        Ok(summaries)
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM document_snapshots WHERE document_id = ?1",
            params![document_id],
        )?;
        Ok(removed)
    }
}
