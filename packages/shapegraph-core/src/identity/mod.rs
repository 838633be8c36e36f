//! Topological identity
//!
//! Stable names for faces, edges and vertices across destructive rebuilds:
//! [`ShapeId`] issuance, the provenance log and multi-tier resolution.

pub mod health;
pub mod history;
pub mod registry;
pub mod shape_id;

pub use health::{FeatureHealth, HealthReport, RefHealth, ResolutionMethod};
pub use history::{OpIndex, OperationLog, OperationRecord};
pub use registry::{
    IdentityRegistry, RegistrySnapshot, RegistryStats, Resolution, ResolutionCounters,
    ResolutionTier, ResolveFailure, ShapeRecord, REGISTRY_SNAPSHOT_VERSION,
};
pub use shape_id::{GeometryFingerprint, ShapeId, ShapeSlot};
