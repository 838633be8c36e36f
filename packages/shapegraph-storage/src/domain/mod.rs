//! Domain layer for document snapshots
//!
//! # Domain Models
//!
//! - `DocumentSnapshot`: one persisted revision of a body (identities,
//!   provenance and feature statuses; never geometry)
//! - `PersistedStatus`: a feature's `status` / `status_message` /
//!   `status_details` triple
//! - `SnapshotSummary`: listing row without the payload
//!
//! # Port Trait
//!
//! - `SnapshotStore`: primary storage abstraction
//!
//! # Examples
//!
//! ```rust,ignore
//! use shapegraph_storage::{DocumentSnapshot, SnapshotStore};
//!
//! async fn save_and_reload(store: impl SnapshotStore, body: &mut Body) -> Result<()> {
//!     let snapshot = DocumentSnapshot::capture("bracket", 7, body);
//!     store.save_snapshot(&snapshot).await?;
//!
//!     let latest = store.latest_snapshot("bracket").await?;
//!     latest.apply_to(body)?;
//!     body.rebuild_all()?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shapegraph_core::identity::RegistrySnapshot;
use shapegraph_core::{Body, FeatureId, FeatureStatus};

use crate::Result;

/// Current on-disk document format
pub const DOCUMENT_FORMAT_VERSION: u32 = 1;

/// Persisted status of one feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedStatus {
    pub feature_id: FeatureId,
    pub status: FeatureStatus,
}

/// One persisted revision of a body
///
/// Geometry is not stored: a loaded document is restored into a body and
/// rebuilt, which re-binds every persisted identity to fresh handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    /// Missing in payloads written before versioning
    #[serde(default)]
    pub format_version: u32,
    pub document_id: String,
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub registry: RegistrySnapshot,
    #[serde(default)]
    pub statuses: Vec<PersistedStatus>,
    /// SHA256 of the payload without this field; filled by the codec
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

impl DocumentSnapshot {
    pub fn new(
        document_id: impl Into<String>,
        revision: u64,
        registry: RegistrySnapshot,
        statuses: Vec<PersistedStatus>,
    ) -> Self {
        Self {
            format_version: DOCUMENT_FORMAT_VERSION,
            document_id: document_id.into(),
            revision,
            saved_at: Utc::now(),
            registry,
            statuses,
            checksum: String::new(),
        }
    }

    /// Snapshot a body's identities and statuses
    pub fn capture(document_id: impl Into<String>, revision: u64, body: &Body) -> Self {
        let statuses = body
            .statuses()
            .into_iter()
            .map(|(feature_id, status)| PersistedStatus { feature_id, status })
            .collect();
        Self::new(document_id, revision, body.registry().snapshot(), statuses)
    }

    /// Load identities and statuses into `body`; the next pass rebuilds from 0
    pub fn apply_to(&self, body: &mut Body) -> Result<()> {
        body.restore_registry(self.registry.clone())?;
        body.restore_statuses(
            self.statuses
                .iter()
                .map(|s| (s.feature_id.clone(), s.status.clone())),
        );
        Ok(())
    }

    pub fn summary(&self) -> SnapshotSummary {
        SnapshotSummary {
            document_id: self.document_id.clone(),
            revision: self.revision,
            saved_at: self.saved_at,
            checksum: self.checksum.clone(),
            feature_count: self.statuses.len(),
            shape_count: self.registry.shapes.len(),
        }
    }

    /// Features whose persisted status is not OK
    pub fn failing_features(&self) -> Vec<&FeatureId> {
        self.statuses
            .iter()
            .filter(|s| !s.status.is_ok())
            .map(|s| &s.feature_id)
            .collect()
    }
}

/// Snapshot listing row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotSummary {
    pub document_id: String,
    pub revision: u64,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub feature_count: usize,
    pub shape_count: usize,
}

// ═══════════════════════════════════════════════════════════════════════════
// Port Trait: SnapshotStore
// ═══════════════════════════════════════════════════════════════════════════

/// Document snapshot storage abstraction
///
/// Snapshots are immutable once saved: `(document_id, revision)` is the key.
///
/// # Implementations
///
/// - `InMemorySnapshotStore`: tests and ephemeral sessions
/// - `SqliteSnapshotStore`: SQLite adapter (`sqlite` feature)
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Save a new snapshot
    ///
    /// # Errors
    ///
    /// `ErrorKind::Conflict` if the revision already exists for the document
    async fn save_snapshot(&self, snapshot: &DocumentSnapshot) -> Result<()>;

    /// Get one revision
    ///
    /// # Errors
    ///
    /// `ErrorKind::SnapshotNotFound` if it doesn't exist
    async fn get_snapshot(&self, document_id: &str, revision: u64) -> Result<DocumentSnapshot>;

    /// Highest revision of a document
    async fn latest_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot>;

    /// Revisions of a document, newest first
    async fn list_snapshots(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotSummary>>;

    /// Delete every revision of a document; returns how many were removed
    async fn delete_document(&self, document_id: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapegraph_core::identity::REGISTRY_SNAPSHOT_VERSION;
    use shapegraph_core::{ErrorCode, ErrorEnvelope, FeatureRef};

    fn empty_registry() -> RegistrySnapshot {
        RegistrySnapshot {
            version: REGISTRY_SNAPSHOT_VERSION,
            shapes: Vec::new(),
            operations: Vec::new(),
        }
    }

    #[test]
    fn test_snapshot_new() {
        let snapshot = DocumentSnapshot::new("bracket", 3, empty_registry(), Vec::new());

        assert_eq!(snapshot.format_version, DOCUMENT_FORMAT_VERSION);
        assert_eq!(snapshot.document_id, "bracket");
        assert_eq!(snapshot.revision, 3);
        assert!(snapshot.checksum.is_empty());
    }

    #[test]
    fn test_summary_and_failing_features() {
        let failed = FeatureStatus::from_envelope(ErrorEnvelope::new(
            ErrorCode::OperationFailed,
            "radius too large",
            "fillet",
            FeatureRef::new("Fillet", FeatureId::new("fillet")),
        ));
        let snapshot = DocumentSnapshot::new(
            "bracket",
            1,
            empty_registry(),
            vec![
                PersistedStatus {
                    feature_id: FeatureId::new("box"),
                    status: FeatureStatus::ok(),
                },
                PersistedStatus {
                    feature_id: FeatureId::new("fillet"),
                    status: failed,
                },
            ],
        );

        let summary = snapshot.summary();
        assert_eq!(summary.feature_count, 2);
        assert_eq!(summary.shape_count, 0);
        assert_eq!(snapshot.failing_features(), vec![&FeatureId::new("fillet")]);
    }

    #[test]
    fn test_missing_format_version_defaults_to_zero() {
        let json = serde_json::json!({
            "document_id": "old",
            "revision": 1,
            "saved_at": "2024-01-01T00:00:00Z",
            "registry": { "version": 1, "shapes": [], "operations": [] }
        });
        let snapshot: DocumentSnapshot = serde_json::from_value(json).unwrap();
        assert_eq!(snapshot.format_version, 0);
        assert!(snapshot.statuses.is_empty());
    }
}
