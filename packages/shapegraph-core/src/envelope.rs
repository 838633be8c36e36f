//! Status envelopes
//!
//! Structured `status_details` attached to a feature after every non-success
//! outcome. The code → (status class, severity) mapping is fixed; a feature's
//! status class is always what [`classify_error_code`] says for its code.
//!
//! Envelopes are persisted with the document. Payloads written by older
//! versions (no schema, code only, or only one of `hint`/`next_action`) are
//! upgraded by [`migrate_envelope`] on load.

use crate::config::DriftPolicy;
use crate::error::EnvelopeError;
use crate::feature::FeatureId;
use crate::kernel::ShapeType;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Current envelope schema tag
pub const ENVELOPE_SCHEMA: &str = "shapegraph.status_details/v1";

/// Machine-readable outcome code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TnpRefMissing,
    TnpRefMismatch,
    TnpRefDrift,
    OperationFailed,
    OcpApiUnavailable,
    FallbackUsed,
    BlockedByUpstreamError,
    FallbackBlockedStrict,
    RebuildFinalizeFailed,
    SelfHealRollbackGeometryDrift,
    /// Code written by a newer or foreign producer; kept verbatim
    Other(String),
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::TnpRefMissing => "tnp_ref_missing",
            ErrorCode::TnpRefMismatch => "tnp_ref_mismatch",
            ErrorCode::TnpRefDrift => "tnp_ref_drift",
            ErrorCode::OperationFailed => "operation_failed",
            ErrorCode::OcpApiUnavailable => "ocp_api_unavailable",
            ErrorCode::FallbackUsed => "fallback_used",
            ErrorCode::BlockedByUpstreamError => "blocked_by_upstream_error",
            ErrorCode::FallbackBlockedStrict => "fallback_blocked_strict",
            ErrorCode::RebuildFinalizeFailed => "rebuild_finalize_failed",
            ErrorCode::SelfHealRollbackGeometryDrift => "self_heal_rollback_geometry_drift",
            ErrorCode::Other(code) => code,
        }
    }

    /// Never fails; unknown codes become [`ErrorCode::Other`]
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "tnp_ref_missing" => ErrorCode::TnpRefMissing,
            "tnp_ref_mismatch" => ErrorCode::TnpRefMismatch,
            "tnp_ref_drift" => ErrorCode::TnpRefDrift,
            "operation_failed" => ErrorCode::OperationFailed,
            "ocp_api_unavailable" => ErrorCode::OcpApiUnavailable,
            "fallback_used" => ErrorCode::FallbackUsed,
            "blocked_by_upstream_error" => ErrorCode::BlockedByUpstreamError,
            "fallback_blocked_strict" => ErrorCode::FallbackBlockedStrict,
            "rebuild_finalize_failed" => ErrorCode::RebuildFinalizeFailed,
            "self_heal_rollback_geometry_drift" => ErrorCode::SelfHealRollbackGeometryDrift,
            other => ErrorCode::Other(other.to_string()),
        }
    }

    /// Default `(hint, next_action)` shown to the user
    pub fn guidance(&self) -> Option<(&'static str, &'static str)> {
        Some(match self {
            ErrorCode::TnpRefMissing => (
                "A referenced face or edge no longer exists",
                "Re-select the highlighted references",
            ),
            ErrorCode::TnpRefMismatch => (
                "A referenced shape changed too much to be matched unambiguously",
                "Re-select the highlighted references",
            ),
            ErrorCode::TnpRefDrift | ErrorCode::FallbackUsed => (
                "Some references were matched by geometry instead of history",
                "Check the highlighted references",
            ),
            ErrorCode::OperationFailed => (
                "The geometry kernel rejected the operation with these parameters",
                "Adjust the feature parameters",
            ),
            ErrorCode::OcpApiUnavailable => (
                "The geometry kernel lacks an entry point this feature needs",
                "Update the geometry kernel installation",
            ),
            ErrorCode::BlockedByUpstreamError => (
                "An earlier feature this one depends on failed",
                "Fix the upstream feature; this one rebuilds automatically",
            ),
            ErrorCode::FallbackBlockedStrict => (
                "Strict mode forbids geometric re-matching of lost references",
                "Re-select the references or disable strict mode",
            ),
            ErrorCode::RebuildFinalizeFailed => (
                "The model could not be committed; the previous state is still shown",
                "Rebuild again or undo the last edit",
            ),
            ErrorCode::SelfHealRollbackGeometryDrift => (
                "The result deviated too far from the previous solid and was rolled back",
                "Check the parameters or relax the drift policy",
            ),
            ErrorCode::Other(_) => return None,
        })
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ErrorCode::parse(&raw))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusClass {
    Ok,
    WarningRecoverable,
    Error,
    Blocked,
    Critical,
}

impl StatusClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusClass::Ok => "OK",
            StatusClass::WarningRecoverable => "WARNING_RECOVERABLE",
            StatusClass::Error => "ERROR",
            StatusClass::Blocked => "BLOCKED",
            StatusClass::Critical => "CRITICAL",
        }
    }

    /// ERROR, BLOCKED and CRITICAL all count as a failed feature
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            StatusClass::Error | StatusClass::Blocked | StatusClass::Critical
        )
    }
}

impl fmt::Display for StatusClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Blocked,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Blocked => "blocked",
            Severity::Critical => "critical",
        }
    }
}

/// Fixed code → (status class, severity) mapping
pub fn classify_error_code(code: &ErrorCode) -> (StatusClass, Severity) {
    match code {
        ErrorCode::TnpRefMissing
        | ErrorCode::TnpRefMismatch
        | ErrorCode::OperationFailed
        | ErrorCode::OcpApiUnavailable
        | ErrorCode::SelfHealRollbackGeometryDrift => (StatusClass::Error, Severity::Error),
        ErrorCode::TnpRefDrift | ErrorCode::FallbackUsed => {
            (StatusClass::WarningRecoverable, Severity::Warning)
        }
        ErrorCode::BlockedByUpstreamError | ErrorCode::FallbackBlockedStrict => {
            (StatusClass::Blocked, Severity::Blocked)
        }
        ErrorCode::RebuildFinalizeFailed => (StatusClass::Critical, Severity::Critical),
        // Unknown codes are treated as plain failures
        ErrorCode::Other(_) => (StatusClass::Error, Severity::Error),
    }
}

/// Feature the envelope is attached to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRef {
    /// Feature type name (`Fillet`, `Pad`, ...)
    #[serde(rename = "class")]
    pub class_name: String,
    pub id: FeatureId,
}

impl FeatureRef {
    pub fn new(class_name: impl Into<String>, id: FeatureId) -> Self {
        Self {
            class_name: class_name.into(),
            id,
        }
    }
}

/// Sub-shape indices the UI should ask the user to re-select
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefIndices {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edge_indices: Option<Vec<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face_indices: Option<Vec<usize>>,
}

impl RefIndices {
    pub fn is_empty(&self) -> bool {
        self.edge_indices.as_ref().map_or(true, Vec::is_empty)
            && self.face_indices.as_ref().map_or(true, Vec::is_empty)
    }

    pub fn push(&mut self, shape_type: ShapeType, index: usize) {
        let list = match shape_type {
            ShapeType::Edge => self.edge_indices.get_or_insert_with(Vec::new),
            ShapeType::Face => self.face_indices.get_or_insert_with(Vec::new),
            ShapeType::Vertex => return,
        };
        if !list.contains(&index) {
            list.push(index);
        }
    }
}

/// Solid signatures before and after a rolled-back computation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub from: String,
    pub to: String,
}

/// Measured deviation of an operation result from its input solid
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftObservation {
    pub volume_change_ratio: f64,
    pub bbox_growth_ratio: f64,
    pub face_count_delta: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryDriftReport {
    pub feature: FeatureId,
    /// Largest observed/limit ratio; above 1.0 means a bound was exceeded
    pub magnitude: f64,
    pub limits: DriftPolicy,
    pub observed: DriftObservation,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    MissingRef,
    Drift,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TnpFailure {
    pub category: FailureCategory,
    pub reference_kind: ShapeType,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDependency {
    pub kind: String,
    pub exception: String,
}

/// `status_details` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub schema: String,
    pub code: ErrorCode,
    pub message: String,
    pub status_class: StatusClass,
    pub severity: Severity,
    pub operation: String,
    pub feature: FeatureRef,
    #[serde(default)]
    pub refs: RefIndices,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry_drift: Option<GeometryDriftReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tnp_failure: Option<TnpFailure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_dependency: Option<RuntimeDependency>,
}

impl ErrorEnvelope {
    /// New envelope; class and severity come from the code
    pub fn new(
        code: ErrorCode,
        message: impl Into<String>,
        operation: impl Into<String>,
        feature: FeatureRef,
    ) -> Self {
        let (status_class, severity) = classify_error_code(&code);
        Self {
            schema: ENVELOPE_SCHEMA.to_string(),
            code,
            message: message.into(),
            status_class,
            severity,
            operation: operation.into(),
            feature,
            refs: RefIndices::default(),
            hint: None,
            next_action: None,
            rollback: None,
            geometry_drift: None,
            tnp_failure: None,
            runtime_dependency: None,
        }
    }

    /// Fill `hint` and `next_action` from the code's default guidance
    pub fn with_guidance(mut self) -> Self {
        if let Some((hint, next_action)) = self.code.guidance() {
            self.hint.get_or_insert_with(|| hint.to_string());
            self.next_action.get_or_insert_with(|| next_action.to_string());
        }
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_next_action(mut self, next_action: impl Into<String>) -> Self {
        self.next_action = Some(next_action.into());
        self
    }

    pub fn with_refs(mut self, refs: RefIndices) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_rollback(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rollback = Some(RollbackInfo {
            from: from.into(),
            to: to.into(),
        });
        self
    }

    pub fn with_geometry_drift(mut self, report: GeometryDriftReport) -> Self {
        self.geometry_drift = Some(report);
        self
    }

    pub fn with_tnp_failure(mut self, failure: TnpFailure) -> Self {
        self.tnp_failure = Some(failure);
        self
    }

    pub fn with_runtime_dependency(
        mut self,
        kind: impl Into<String>,
        exception: impl Into<String>,
    ) -> Self {
        self.runtime_dependency = Some(RuntimeDependency {
            kind: kind.into(),
            exception: exception.into(),
        });
        self
    }

    /// Load a persisted payload, migrating legacy layouts
    pub fn from_json_str(payload: &str) -> Result<Self, EnvelopeError> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        migrate_envelope(value)
    }

    pub fn to_json_string(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Every field optional: whatever older producers wrote
#[derive(Debug, Default, Deserialize)]
struct LegacyEnvelope {
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    /// Kept raw; older producers used class names this crate never had
    #[serde(default)]
    status_class: Option<String>,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    operation: Option<String>,
    #[serde(default)]
    feature: Option<LegacyFeatureRef>,
    #[serde(default)]
    refs: Option<RefIndices>,
    #[serde(default)]
    hint: Option<String>,
    #[serde(default)]
    next_action: Option<String>,
    #[serde(default)]
    rollback: Option<RollbackInfo>,
    #[serde(default)]
    geometry_drift: Option<GeometryDriftReport>,
    #[serde(default)]
    tnp_failure: Option<TnpFailure>,
    #[serde(default)]
    runtime_dependency: Option<RuntimeDependency>,
}

#[derive(Debug, Default, Deserialize)]
struct LegacyFeatureRef {
    #[serde(default, rename = "class")]
    class_name: Option<String>,
    #[serde(default)]
    id: Option<String>,
}

/// Upgrade any persisted envelope to the current layout.
///
/// - missing `status_class`/`severity` are backfilled from the code
/// - a stored class that disagrees with the code is corrected
/// - a lone `hint` is mirrored into `next_action` and vice versa
pub fn migrate_envelope(value: serde_json::Value) -> Result<ErrorEnvelope, EnvelopeError> {
    if !value.is_object() {
        return Err(EnvelopeError::NotAnObject);
    }
    let legacy: LegacyEnvelope = serde_json::from_value(value)?;

    let code = legacy
        .code
        .as_deref()
        .map(ErrorCode::parse)
        .ok_or(EnvelopeError::MissingCode)?;
    let (status_class, severity) = classify_error_code(&code);

    if let Some(stored) = legacy.status_class.as_deref() {
        if stored != status_class.as_str() {
            tracing::warn!(
                code = %code,
                stored,
                corrected = %status_class,
                "Envelope status class disagrees with its code; correcting"
            );
        }
    }
    if let Some(stored) = legacy.severity.as_deref() {
        if stored != severity.as_str() {
            tracing::debug!(code = %code, stored, corrected = severity.as_str(), "Dropping stale severity");
        }
    }
    if legacy.schema.as_deref() != Some(ENVELOPE_SCHEMA) {
        tracing::debug!(code = %code, schema = ?legacy.schema, "Migrating legacy envelope");
    }

    let (hint, next_action) = match (legacy.hint, legacy.next_action) {
        (Some(hint), None) => (Some(hint.clone()), Some(hint)),
        (None, Some(next)) => (Some(next.clone()), Some(next)),
        other => other,
    };

    let feature = legacy.feature.unwrap_or_default();
    let message = legacy
        .message
        .unwrap_or_else(|| format!("{} ({})", code, status_class));

    Ok(ErrorEnvelope {
        schema: ENVELOPE_SCHEMA.to_string(),
        message,
        status_class,
        severity,
        operation: legacy.operation.unwrap_or_default(),
        feature: FeatureRef {
            class_name: feature.class_name.unwrap_or_default(),
            id: FeatureId::new(feature.id.unwrap_or_default()),
        },
        refs: legacy.refs.unwrap_or_default(),
        hint,
        next_action,
        rollback: legacy.rollback,
        geometry_drift: legacy.geometry_drift,
        tnp_failure: legacy.tnp_failure,
        runtime_dependency: legacy.runtime_dependency,
        code,
    })
}

/// `deserialize_with` adapter that migrates an optional persisted envelope
pub fn deserialize_migrated<'de, D>(deserializer: D) -> Result<Option<ErrorEnvelope>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => migrate_envelope(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
