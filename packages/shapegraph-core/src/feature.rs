//! Feature capability interface
//!
//! A feature (extrude, fillet, shell, ...) is anything that can
//! - declare its dependencies on earlier features,
//! - resolve its persisted shape references against the current solid,
//! - compute a new solid from its input, optionally with a fallback path.
//!
//! Features never register shapes themselves. They report which kernel ids in
//! their result are new ([`FeatureOutput::generated`]) and how input shapes map
//! to output shapes ([`FeatureOutput::history`]); the rebuild engine registers
//! and logs them only once the feature has succeeded.

use crate::dependency_graph::DeclaredDependency;
use crate::envelope::{ErrorCode, ErrorEnvelope, RefIndices, StatusClass};
use crate::identity::{IdentityRegistry, ResolutionTier, ResolveFailure, ShapeId};
use crate::kernel::{GeometryHandle, OpFailure, OpResult, Solid, SolidRef, TopoId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable feature identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(String);

impl FeatureId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FeatureId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FeatureId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Input → output mapping reported by a kernel operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShapeHistory {
    pub operation_type: String,
    pub inputs: Vec<TopoId>,
    pub outputs: Vec<TopoId>,
}

/// Result of a successful feature computation
#[derive(Debug, Clone)]
pub struct FeatureOutput {
    pub solid: SolidRef,
    /// Sub-shapes this feature created, in kernel order
    pub generated: Vec<TopoId>,
    pub history: Vec<ShapeHistory>,
}

impl FeatureOutput {
    pub fn new(solid: impl Into<SolidRef>) -> Self {
        Self {
            solid: solid.into(),
            generated: Vec::new(),
            history: Vec::new(),
        }
    }

    pub fn with_generated(mut self, generated: impl IntoIterator<Item = TopoId>) -> Self {
        self.generated.extend(generated);
        self
    }

    pub fn with_history(
        mut self,
        operation_type: impl Into<String>,
        inputs: Vec<TopoId>,
        outputs: Vec<TopoId>,
    ) -> Self {
        self.history.push(ShapeHistory {
            operation_type: operation_type.into(),
            inputs,
            outputs,
        });
        self
    }
}

/// Handles resolved for a feature's references, in reference order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs {
    pub handles: Vec<GeometryHandle>,
}

impl ResolvedRefs {
    pub fn topo_ids(&self) -> Vec<TopoId> {
        self.handles.iter().map(GeometryHandle::topo_id).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// What a feature's resolution pass amounted to
#[derive(Debug, Clone, Default)]
pub struct ResolutionSummary {
    /// Worst successful tier, `None` if every ref resolved cleanly (or none exist)
    pub degraded: Option<ResolutionTier>,
    pub failures: Vec<ResolveFailure>,
    /// Local indices of references that did not resolve cleanly
    pub refs: RefIndices,
}

/// Registry access for one feature's resolution pass; records every outcome
pub struct ResolveContext<'a> {
    registry: &'a mut IdentityRegistry,
    solid: &'a Solid,
    feature_id: &'a FeatureId,
    summary: ResolutionSummary,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        registry: &'a mut IdentityRegistry,
        solid: &'a Solid,
        feature_id: &'a FeatureId,
    ) -> Self {
        registry.reset_health(feature_id);
        Self {
            registry,
            solid,
            feature_id,
            summary: ResolutionSummary::default(),
        }
    }

    pub fn current_solid(&self) -> &Solid {
        self.solid
    }

    pub fn feature_id(&self) -> &FeatureId {
        self.feature_id
    }

    pub fn strict_mode(&self) -> bool {
        self.registry.strict_mode()
    }

    pub fn resolve(&mut self, shape_id: &ShapeId) -> Result<GeometryHandle, ResolveFailure> {
        match self
            .registry
            .resolve_for(self.feature_id, shape_id, self.solid)
        {
            Ok(resolution) => {
                if resolution.tier != ResolutionTier::Ok {
                    tracing::warn!(
                        feature = %self.feature_id,
                        shape = %shape_id,
                        tier = ?resolution.tier,
                        "Reference resolved outside recorded history"
                    );
                    self.summary
                        .refs
                        .push(shape_id.shape_type, shape_id.local_index);
                    self.summary.degraded = Some(match self.summary.degraded {
                        Some(prev) => worse(prev, resolution.tier),
                        None => resolution.tier,
                    });
                }
                Ok(resolution.handle)
            }
            Err(failure) => {
                self.summary
                    .refs
                    .push(failure.shape_type, failure.local_index);
                self.summary.failures.push(failure.clone());
                Err(failure)
            }
        }
    }

    pub fn into_summary(self) -> ResolutionSummary {
        self.summary
    }
}

/// Drift < fallback-class tiers
fn worse(a: ResolutionTier, b: ResolutionTier) -> ResolutionTier {
    let rank = |t: ResolutionTier| match t {
        ResolutionTier::Ok => 0,
        ResolutionTier::Drift => 1,
        ResolutionTier::Fallback => 2,
        ResolutionTier::LocalIndex => 3,
    };
    if rank(b) > rank(a) {
        b
    } else {
        a
    }
}

/// Capability interface every feature variant implements
pub trait Feature: fmt::Debug + Send + Sync {
    fn id(&self) -> &FeatureId;

    /// Type name shown in envelopes (`Fillet`, `Pad`, ...)
    fn class_name(&self) -> &'static str;

    /// Operation name recorded in envelopes and provenance
    fn operation(&self) -> &'static str;

    /// Explicit dependencies beyond the implicit sequential one
    fn declared_dependencies(&self) -> Vec<DeclaredDependency> {
        Vec::new()
    }

    /// Persisted shape references, resolved before every execution
    fn references(&self) -> Vec<ShapeId> {
        Vec::new()
    }

    /// Resolve every reference; all outcomes are recorded in `ctx` even after
    /// the first failure so diagnostics list every broken ref
    fn resolve_refs(&self, ctx: &mut ResolveContext<'_>) -> Result<ResolvedRefs, ResolveFailure> {
        let mut resolved = ResolvedRefs::default();
        let mut first_failure = None;
        for shape_id in self.references() {
            match ctx.resolve(&shape_id) {
                Ok(handle) => resolved.handles.push(handle),
                Err(failure) => {
                    first_failure.get_or_insert(failure);
                }
            }
        }
        match first_failure {
            Some(failure) => Err(failure),
            None => Ok(resolved),
        }
    }

    fn execute(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput>;

    fn has_fallback(&self) -> bool {
        false
    }

    /// Alternative computation tried when `execute` fails; only called when
    /// [`Feature::has_fallback`] is true
    fn fallback(&self, _input: &SolidRef, _refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        Err(OpFailure::operation(format!(
            "{} has no fallback path",
            self.class_name()
        )))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeatureState {
    #[default]
    Ok,
    Warning,
    Error,
}

impl FeatureState {
    pub fn from_status_class(class: StatusClass) -> Self {
        match class {
            StatusClass::Ok => FeatureState::Ok,
            StatusClass::WarningRecoverable => FeatureState::Warning,
            StatusClass::Error | StatusClass::Blocked | StatusClass::Critical => {
                FeatureState::Error
            }
        }
    }
}

/// `status` / `status_message` / `status_details` of a feature
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureStatus {
    pub state: FeatureState,
    pub message: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::envelope::deserialize_migrated"
    )]
    pub details: Option<ErrorEnvelope>,
}

impl FeatureStatus {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn from_envelope(envelope: ErrorEnvelope) -> Self {
        Self {
            state: FeatureState::from_status_class(envelope.status_class),
            message: envelope.message.clone(),
            details: Some(envelope),
        }
    }

    pub fn status_class(&self) -> StatusClass {
        self.details
            .as_ref()
            .map_or(StatusClass::Ok, |d| d.status_class)
    }

    pub fn code(&self) -> Option<&ErrorCode> {
        self.details.as_ref().map(|d| &d.code)
    }

    pub fn is_ok(&self) -> bool {
        self.state == FeatureState::Ok
    }

    pub fn is_error(&self) -> bool {
        self.state == FeatureState::Error
    }

    pub fn is_blocked(&self) -> bool {
        self.status_class() == StatusClass::Blocked
    }
}
