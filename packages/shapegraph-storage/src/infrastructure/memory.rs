//! In-Memory Snapshot Store
//!
//! Keeps encoded payloads, so loads go through the same codec (checksum and
//! envelope migration) as the SQLite adapter.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::codec;
use crate::domain::{DocumentSnapshot, SnapshotStore, SnapshotSummary};
use crate::error::{Result, StorageError};

#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    payloads: Arc<RwLock<BTreeMap<(String, u64), String>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a raw payload as-is (imports, legacy fixtures)
    pub async fn insert_raw(&self, document_id: &str, revision: u64, payload: impl Into<String>) {
        self.payloads
            .write()
            .await
            .insert((document_id.to_string(), revision), payload.into());
    }

    pub async fn len(&self) -> usize {
        self.payloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payloads.read().await.is_empty()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save_snapshot(&self, snapshot: &DocumentSnapshot) -> Result<()> {
        let key = (snapshot.document_id.clone(), snapshot.revision);
        let mut payloads = self.payloads.write().await;
        if payloads.contains_key(&key) {
            return Err(StorageError::conflict(&snapshot.document_id, snapshot.revision));
        }
        payloads.insert(key, codec::encode(snapshot)?);
        Ok(())
    }

    async fn get_snapshot(&self, document_id: &str, revision: u64) -> Result<DocumentSnapshot> {
        let payloads = self.payloads.read().await;
        let payload = payloads
            .get(&(document_id.to_string(), revision))
            .ok_or_else(|| StorageError::snapshot_not_found(document_id, Some(revision)))?;
        codec::decode(payload)
    }

    async fn latest_snapshot(&self, document_id: &str) -> Result<DocumentSnapshot> {
        let payloads = self.payloads.read().await;
        let payload = payloads
            .range((document_id.to_string(), 0)..=(document_id.to_string(), u64::MAX))
            .next_back()
            .map(|(_, payload)| payload)
            .ok_or_else(|| StorageError::snapshot_not_found(document_id, None))?;
        codec::decode(payload)
    }

    async fn list_snapshots(
        &self,
        document_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<SnapshotSummary>> {
        let payloads = self.payloads.read().await;
        payloads
            .range((document_id.to_string(), 0)..=(document_id.to_string(), u64::MAX))
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .map(|(_, payload)| codec::decode(payload).map(|s| s.summary()))
            .collect()
    }

    async fn delete_document(&self, document_id: &str) -> Result<usize> {
        let mut payloads = self.payloads.write().await;
        let before = payloads.len();
        payloads.retain(|(doc, _), _| doc != document_id);
        Ok(before - payloads.len())
    }
}
