/*
 * Shapegraph Core - Parametric Model Consistency Layer
 *
 * Keeps a feature-based solid model consistent across edits.
 *
 * Architecture:
 * - Identity Registry (persistent names for faces/edges/vertices)
 * - Geometric Selector (re-matching when history is lost)
 * - Dependency Graph + Checkpoints (incremental resume)
 * - Rebuild Engine (transaction, rollback, fallback)
 * - Error Envelope (versioned status_details + migration)
 */

// Public modules
pub mod checkpoint;
pub mod config;
pub mod dependency_graph;
pub mod envelope;
pub mod error;
pub mod feature;
pub mod identity;
pub mod kernel;
pub mod rebuild;
pub mod selector;

// Re-exports
pub use checkpoint::{CheckpointStore, GeometryHash, RebuildCheckpoint};
pub use config::{ConfigError, DriftPolicy, EngineConfig, Preset, SelectorConfig};
pub use dependency_graph::{DeclaredDependency, DependencyGraph, DependencyKind, FeatureDependency};
pub use envelope::{
    classify_error_code, migrate_envelope, ErrorCode, ErrorEnvelope, FeatureRef, Severity,
    StatusClass, ENVELOPE_SCHEMA,
};
pub use error::{
    EnvelopeError, FinalizeError, GraphError, IdentityError, RebuildError, Result,
};
pub use feature::{
    Feature, FeatureId, FeatureOutput, FeatureState, FeatureStatus, ResolveContext, ResolvedRefs,
};
pub use identity::{
    GeometryFingerprint, HealthReport, IdentityRegistry, OperationRecord, RegistrySnapshot,
    ResolutionTier, ShapeId,
};
pub use kernel::{GeometryHandle, OpFailure, OpResult, ShapeType, Solid, SolidRef, TopoId};
pub use rebuild::{Body, BodyStats, CommittedSolidReader, Finalizer, RebuildReport};
pub use selector::GeometricSelector;
