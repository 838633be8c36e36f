use crate::config::ConfigError;
use crate::envelope::ErrorEnvelope;
use crate::feature::FeatureId;
use crate::kernel::ShapeType;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, RebuildError>;
pub type GraphResult<T> = std::result::Result<T, GraphError>;
pub type IdentityResult<T> = std::result::Result<T, IdentityError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Feature not found: {0}")]
    UnknownFeature(FeatureId),

    #[error("Feature already present: {0}")]
    DuplicateFeature(FeatureId),

    #[error("Index {index} out of range for {len} features")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Feature {feature} depends on unknown feature {upstream}")]
    UnknownDependency {
        feature: FeatureId,
        upstream: FeatureId,
    },

    #[error("Feature {feature} depends on {upstream}, which does not precede it")]
    ForwardReference {
        feature: FeatureId,
        upstream: FeatureId,
    },

    #[error("Dependency cycle detected at {feature}")]
    Cycle { feature: FeatureId },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum IdentityError {
    #[error("Unsupported registry snapshot version {found} (supported: {supported})")]
    UnsupportedSnapshotVersion { found: u32, supported: u32 },

    #[error("Duplicate shape uuid in snapshot: {0}")]
    DuplicateUuid(Uuid),

    #[error("Duplicate shape slot in snapshot: {feature_id}/{shape_type}#{local_index}")]
    DuplicateSlot {
        feature_id: FeatureId,
        shape_type: ShapeType,
        local_index: usize,
    },
}

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Envelope payload has no code")]
    MissingCode,

    #[error("Envelope payload is not a JSON object")]
    NotAnObject,
}

/// Failure of the post-loop materialization step
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{stage}: {message}")]
pub struct FinalizeError {
    pub stage: String,
    pub message: String,
}

impl FinalizeError {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RebuildError {
    #[error("Feature not found: {0}")]
    FeatureNotFound(FeatureId),

    #[error("Dependency graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Identity registry error: {0}")]
    Identity(#[from] IdentityError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Raised after the body has been rolled back to its committed solid
    #[error("Rebuild finalization failed: {source}")]
    FinalizeFailed {
        envelope: Box<ErrorEnvelope>,
        #[source]
        source: FinalizeError,
    },
}

impl RebuildError {
    /// CRITICAL envelope carried by a finalization failure
    pub fn envelope(&self) -> Option<&ErrorEnvelope> {
        match self {
            RebuildError::FinalizeFailed { envelope, .. } => Some(envelope),
            _ => None,
        }
    }
}
