//! Rebuild pass report and body statistics

use crate::feature::FeatureId;
use crate::identity::RegistryStats;
use serde::{Deserialize, Serialize};

/// Outcome of one rebuild pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RebuildReport {
    /// First feature index executed in this pass
    pub resumed_from: usize,
    pub executed: Vec<FeatureId>,
    /// Features before the resume point, served from the cache
    pub skipped: Vec<FeatureId>,
    pub blocked: Vec<FeatureId>,
    pub failed: Vec<FeatureId>,
    pub warnings: Vec<FeatureId>,
    pub checkpoints_created: Vec<usize>,
    /// New solid became visible
    pub committed: bool,
    pub duration_ms: u64,
}

impl RebuildReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }
}

/// Cumulative counters over a body's lifetime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BodyStats {
    pub rebuilds: u64,
    pub commits: u64,
    pub features_executed: u64,
    pub features_skipped: u64,
    /// Passes that resumed from a checkpoint instead of index 0
    pub checkpoint_resumes: u64,
    /// Resumes abandoned because the cached solid no longer matched its checkpoint
    pub checkpoint_mismatches: u64,
    pub finalize_failures: u64,
    pub checkpoints: usize,
    pub valid_checkpoints: usize,
    pub registry: RegistryStats,
    pub last_report: Option<RebuildReport>,
}
