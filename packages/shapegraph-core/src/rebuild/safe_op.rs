//! Guarded kernel operations
//!
//! [`safe_operation`] runs a feature's primary computation, falls back if one
//! is supplied, classifies failures into envelope codes and, in strict mode,
//! rejects results that drift too far from the input solid.

use crate::config::DriftPolicy;
use crate::envelope::{DriftObservation, ErrorCode, GeometryDriftReport};
use crate::feature::{FeatureId, FeatureOutput};
use crate::kernel::{OpFailure, OpResult, Solid, SolidRef};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Success(FeatureOutput),
    /// Primary failed, fallback succeeded; the result is kept
    Recovered {
        output: FeatureOutput,
        primary_failure: OpFailure,
    },
    Failed {
        code: ErrorCode,
        failure: OpFailure,
        fallback_failure: Option<OpFailure>,
    },
    /// Succeeded but moved outside the drift policy (strict mode)
    DriftRejected {
        attempted: SolidRef,
        report: GeometryDriftReport,
    },
}

impl OperationOutcome {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            OperationOutcome::Success(_) => None,
            OperationOutcome::Recovered { .. } => Some(ErrorCode::FallbackUsed),
            OperationOutcome::Failed { code, .. } => Some(code.clone()),
            OperationOutcome::DriftRejected { .. } => {
                Some(ErrorCode::SelfHealRollbackGeometryDrift)
            }
        }
    }
}

/// Envelope code for a kernel failure
pub fn classify_failure(failure: &OpFailure) -> ErrorCode {
    match failure {
        OpFailure::KernelUnavailable { .. } => ErrorCode::OcpApiUnavailable,
        OpFailure::Operation(_) => ErrorCode::OperationFailed,
    }
}

/// Run `primary`, then `fallback` if it failed.
///
/// With a `drift_policy` (strict mode) a successful result that deviates
/// beyond the policy from `input` is turned into a rejection.
pub fn safe_operation<P, F>(
    op_name: &str,
    feature_id: &FeatureId,
    input: &SolidRef,
    primary: P,
    fallback: Option<F>,
    drift_policy: Option<&DriftPolicy>,
) -> OperationOutcome
where
    P: FnOnce() -> OpResult<FeatureOutput>,
    F: FnOnce() -> OpResult<FeatureOutput>,
{
    let (output, primary_failure) = match primary() {
        Ok(output) => (output, None),
        Err(failure) => {
            debug!(operation = op_name, feature = %feature_id, error = %failure, "Primary failed");
            let Some(fallback) = fallback else {
                return OperationOutcome::Failed {
                    code: classify_failure(&failure),
                    failure,
                    fallback_failure: None,
                };
            };
            match fallback() {
                Ok(output) => {
                    warn!(operation = op_name, feature = %feature_id, "Recovered via fallback");
                    (output, Some(failure))
                }
                Err(fallback_failure) => {
                    return OperationOutcome::Failed {
                        code: classify_failure(&failure),
                        failure,
                        fallback_failure: Some(fallback_failure),
                    };
                }
            }
        }
    };

    if let Some(policy) = drift_policy {
        if let Some(report) = check_geometry_drift(feature_id, input, &output.solid, policy) {
            warn!(
                operation = op_name,
                feature = %feature_id,
                magnitude = report.magnitude,
                reasons = ?report.reasons,
                "Result rejected by drift policy"
            );
            return OperationOutcome::DriftRejected {
                attempted: output.solid,
                report,
            };
        }
    }

    match primary_failure {
        None => OperationOutcome::Success(output),
        Some(primary_failure) => OperationOutcome::Recovered {
            output,
            primary_failure,
        },
    }
}

/// Compare a result against its input; `Some` when any bound is exceeded.
///
/// An empty input has nothing to drift from and is never flagged.
pub fn check_geometry_drift(
    feature_id: &FeatureId,
    before: &Solid,
    after: &Solid,
    policy: &DriftPolicy,
) -> Option<GeometryDriftReport> {
    if before.is_empty() {
        return None;
    }

    let (vb, va) = (before.volume(), after.volume());
    let max_volume = vb.abs().max(va.abs());
    let volume_change_ratio = if max_volume <= f64::EPSILON {
        0.0
    } else {
        (va - vb).abs() / max_volume
    };

    let (db, da) = (before.bbox().diagonal(), after.bbox().diagonal());
    let bbox_growth_ratio = if db <= f64::EPSILON {
        0.0
    } else {
        ((da - db) / db).max(0.0)
    };

    let face_count_delta = before.face_count().abs_diff(after.face_count());

    let observed = DriftObservation {
        volume_change_ratio,
        bbox_growth_ratio,
        face_count_delta,
    };

    let mut reasons = Vec::new();
    if volume_change_ratio > policy.max_volume_change_ratio {
        reasons.push(format!(
            "volume changed by {:.1}% (limit {:.1}%)",
            volume_change_ratio * 100.0,
            policy.max_volume_change_ratio * 100.0
        ));
    }
    if bbox_growth_ratio > policy.max_bbox_growth_ratio {
        reasons.push(format!(
            "bounding box grew by {:.1}% (limit {:.1}%)",
            bbox_growth_ratio * 100.0,
            policy.max_bbox_growth_ratio * 100.0
        ));
    }
    if face_count_delta > policy.max_face_count_delta {
        reasons.push(format!(
            "face count changed by {} (limit {})",
            face_count_delta, policy.max_face_count_delta
        ));
    }
    if reasons.is_empty() {
        return None;
    }

    let ratio = |observed: f64, limit: f64| if limit > 0.0 { observed / limit } else { 0.0 };
    let magnitude = ratio(volume_change_ratio, policy.max_volume_change_ratio)
        .max(ratio(bbox_growth_ratio, policy.max_bbox_growth_ratio))
        .max(ratio(
            face_count_delta as f64,
            policy.max_face_count_delta.max(1) as f64,
        ));

    Some(GeometryDriftReport {
        feature: feature_id.clone(),
        magnitude,
        limits: *policy,
        observed,
        reasons,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BoundingBox, Point3};

    fn block(size: f64) -> SolidRef {
        Solid::new(
            size * size * size,
            Point3::zero(),
            BoundingBox::new(Point3::zero(), Point3::new(size, size, size)),
            Vec::new(),
            Vec::new(),
            vec![crate::kernel::VertexGeom {
                id: crate::kernel::TopoId(1),
                point: Point3::zero(),
            }],
        )
        .into_ref()
    }

    fn ok(solid: SolidRef) -> OpResult<FeatureOutput> {
        Ok(FeatureOutput::new(solid))
    }

    type NoFallback = fn() -> OpResult<FeatureOutput>;

    #[test]
    fn test_primary_success() {
        let input = block(10.0);
        let out = safe_operation(
            "pad",
            &FeatureId::new("p"),
            &input,
            || ok(block(10.5)),
            None::<NoFallback>,
            None,
        );
        assert!(matches!(out, OperationOutcome::Success(_)));
        assert_eq!(out.code(), None);
    }

    #[test]
    fn test_failure_classification() {
        let input = block(10.0);
        let out = safe_operation(
            "fillet",
            &FeatureId::new("f"),
            &input,
            || Err(OpFailure::kernel_unavailable("BRepFilletAPI_MakeFillet", "missing")),
            None::<NoFallback>,
            None,
        );
        assert_eq!(out.code(), Some(ErrorCode::OcpApiUnavailable));

        let out = safe_operation(
            "fillet",
            &FeatureId::new("f"),
            &input,
            || Err(OpFailure::operation("radius too large")),
            None::<NoFallback>,
            None,
        );
        assert_eq!(out.code(), Some(ErrorCode::OperationFailed));
    }

    #[test]
    fn test_fallback_recovers_with_warning() {
        let input = block(10.0);
        let out = safe_operation(
            "fillet",
            &FeatureId::new("f"),
            &input,
            || Err(OpFailure::operation("primary")),
            Some(|| ok(block(9.9))),
            None,
        );
        match out {
            OperationOutcome::Recovered {
                output,
                primary_failure,
            } => {
                assert!((output.solid.volume() - 9.9f64.powi(3)).abs() < 1e-9);
                assert_eq!(primary_failure, OpFailure::operation("primary"));
            }
            other => panic!("expected recovery, got {other:?}"),
        }
    }

    #[test]
    fn test_fallback_failure_keeps_primary_code() {
        let input = block(10.0);
        let out = safe_operation(
            "fillet",
            &FeatureId::new("f"),
            &input,
            || Err(OpFailure::kernel_unavailable("sym", "gone")),
            Some(|| Err(OpFailure::operation("fallback too"))),
            None,
        );
        match out {
            OperationOutcome::Failed {
                code,
                fallback_failure,
                ..
            } => {
                assert_eq!(code, ErrorCode::OcpApiUnavailable);
                assert!(fallback_failure.is_some());
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn test_drift_rejection_only_with_policy() {
        let input = block(10.0);
        let policy = DriftPolicy::default();

        let out = safe_operation(
            "pad",
            &FeatureId::new("p"),
            &input,
            || ok(block(20.0)),
            None::<NoFallback>,
            Some(&policy),
        );
        match &out {
            OperationOutcome::DriftRejected { report, .. } => {
                assert!(report.magnitude > 1.0);
                assert_eq!(report.reasons.len(), 2);
            }
            other => panic!("expected drift rejection, got {other:?}"),
        }
        assert_eq!(out.code(), Some(ErrorCode::SelfHealRollbackGeometryDrift));

        let out = safe_operation(
            "pad",
            &FeatureId::new("p"),
            &input,
            || ok(block(20.0)),
            None::<NoFallback>,
            None,
        );
        assert!(matches!(out, OperationOutcome::Success(_)));
    }

    #[test]
    fn test_empty_input_never_drifts() {
        let empty = Solid::empty();
        let after = block(10.0);
        assert!(
            check_geometry_drift(&FeatureId::new("b"), &empty, &after, &DriftPolicy::default())
                .is_none()
        );
    }
}
