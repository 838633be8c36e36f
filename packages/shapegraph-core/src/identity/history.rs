//! Provenance log
//!
//! Arena of immutable [`OperationRecord`]s keyed by stable shape uuids, never by
//! kernel handles. One operation may consume many inputs (boolean union) and
//! produce many outputs, so the log forms a DAG; `consumers` indexes it for the
//! forward walk the history tier performs.

use crate::feature::FeatureId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRecord {
    pub operation_type: String,
    pub input_shape_ids: Vec<Uuid>,
    pub output_shape_ids: Vec<Uuid>,
    pub feature_id: FeatureId,
}

impl OperationRecord {
    pub fn new(
        operation_type: impl Into<String>,
        input_shape_ids: Vec<Uuid>,
        output_shape_ids: Vec<Uuid>,
        feature_id: FeatureId,
    ) -> Self {
        Self {
            operation_type: operation_type.into(),
            input_shape_ids,
            output_shape_ids,
            feature_id,
        }
    }
}

/// Position of a record in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpIndex(usize);

#[derive(Debug, Default)]
pub struct OperationLog {
    records: Vec<OperationRecord>,
    /// input uuid → records that consumed it
    consumers: HashMap<Uuid, Vec<OpIndex>>,
    /// Rebuilds replay the same operations; identical records are stored once
    seen: HashSet<OperationRecord>,
}

impl OperationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = OperationRecord>) -> Self {
        let mut log = Self::new();
        for record in records {
            log.append(record);
        }
        log
    }

    /// Append a record; `None` if an identical record is already logged
    pub fn append(&mut self, record: OperationRecord) -> Option<OpIndex> {
        if self.seen.contains(&record) {
            return None;
        }

        let idx = OpIndex(self.records.len());
        for input in &record.input_shape_ids {
            self.consumers.entry(*input).or_default().push(idx);
        }
        self.seen.insert(record.clone());
        self.records.push(record);
        Some(idx)
    }

    pub fn get(&self, idx: OpIndex) -> Option<&OperationRecord> {
        self.records.get(idx.0)
    }

    /// Direct successors: outputs of every operation that consumed `uuid`
    pub fn successors(&self, uuid: &Uuid) -> Vec<Uuid> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        for idx in self.consumers.get(uuid).into_iter().flatten() {
            for output in &self.records[idx.0].output_shape_ids {
                if output != uuid && seen.insert(*output) {
                    out.push(*output);
                }
            }
        }
        out
    }

    /// Transitive successors in BFS discovery order (excluding `uuid`)
    pub fn descendants(&self, uuid: &Uuid) -> Vec<Uuid> {
        let mut visited = HashSet::from([*uuid]);
        let mut queue = VecDeque::from([*uuid]);
        let mut out = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in self.successors(&current) {
                if visited.insert(next) {
                    out.push(next);
                    queue.push_back(next);
                }
            }
        }

        out
    }

    /// Drop every record produced by `feature_id` and reindex
    pub fn remove_feature(&mut self, feature_id: &FeatureId) -> usize {
        let before = self.records.len();
        let kept: Vec<OperationRecord> = self
            .records
            .drain(..)
            .filter(|r| &r.feature_id != feature_id)
            .collect();
        *self = Self::from_records(kept);
        before - self.records.len()
    }

    pub fn records(&self) -> &[OperationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
