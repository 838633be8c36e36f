//! Rebuild checkpoints
//!
//! A checkpoint marks "the history prefix up to this feature index is still
//! valid". It carries only a [`GeometryHash`]; the materialized solid itself is
//! owned by the body. Checkpoints are invalidated, never deleted, when a feature
//! at or after their index changes, and discarded as a whole when the feature
//! list is replaced.

use crate::feature::FeatureId;
use crate::kernel::{Point3, Solid};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Quantization step for hashed floats (model units)
const HASH_EPSILON: f64 = 1e-9;

/// Lightweight fingerprint of a solid: volume, counts, centroid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryHash {
    pub volume: f64,
    pub face_count: usize,
    pub edge_count: usize,
    pub centroid: Point3,
    /// blake3 over the quantized metrics, hex encoded
    pub digest: String,
}

impl GeometryHash {
    pub fn of(solid: &Solid) -> Self {
        let volume = solid.volume();
        let centroid = solid.centroid();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&quantize(volume).to_le_bytes());
        hasher.update(&(solid.face_count() as u64).to_le_bytes());
        hasher.update(&(solid.edge_count() as u64).to_le_bytes());
        for c in [centroid.x, centroid.y, centroid.z] {
            hasher.update(&quantize(c).to_le_bytes());
        }

        Self {
            volume,
            face_count: solid.face_count(),
            edge_count: solid.edge_count(),
            centroid,
            digest: hasher.finalize().to_hex().to_string(),
        }
    }

    pub fn matches(&self, other: &GeometryHash) -> bool {
        self.digest == other.digest
    }
}

fn quantize(value: f64) -> i64 {
    // -0.0 and 0.0 hash alike
    (value / HASH_EPSILON).round() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildCheckpoint {
    pub feature_index: usize,
    pub feature_id: FeatureId,
    pub geometry_hash: GeometryHash,
    pub is_valid: bool,
}

impl RebuildCheckpoint {
    pub fn new(feature_index: usize, feature_id: FeatureId, solid: &Solid) -> Self {
        Self {
            feature_index,
            feature_id,
            geometry_hash: GeometryHash::of(solid),
            is_valid: true,
        }
    }
}

/// Checkpoints of one body, keyed by feature index
#[derive(Debug, Clone, Default)]
pub struct CheckpointStore {
    checkpoints: BTreeMap<usize, RebuildCheckpoint>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a checkpoint, replacing any existing one at the same index
    pub fn save(&mut self, checkpoint: RebuildCheckpoint) {
        self.checkpoints.insert(checkpoint.feature_index, checkpoint);
    }

    pub fn get(&self, index: usize) -> Option<&RebuildCheckpoint> {
        self.checkpoints.get(&index)
    }

    /// Highest valid checkpoint strictly before `index`
    pub fn latest_valid_before(&self, index: usize) -> Option<&RebuildCheckpoint> {
        self.checkpoints
            .range(..index)
            .rev()
            .map(|(_, cp)| cp)
            .find(|cp| cp.is_valid)
    }

    /// Mark every checkpoint at or after `index` invalid; returns how many flipped
    pub fn invalidate_from(&mut self, index: usize) -> usize {
        let mut flipped = 0;
        for cp in self.checkpoints.range_mut(index..).map(|(_, cp)| cp) {
            if cp.is_valid {
                cp.is_valid = false;
                flipped += 1;
            }
        }
        flipped
    }

    /// Drop every checkpoint
    pub fn clear(&mut self) {
        self.checkpoints.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &RebuildCheckpoint> {
        self.checkpoints.values()
    }

    pub fn valid_count(&self) -> usize {
        self.checkpoints.values().filter(|cp| cp.is_valid).count()
    }

    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }
}
