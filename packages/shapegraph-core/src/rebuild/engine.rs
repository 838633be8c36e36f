//! Transactional rebuild pass
//!
//! A pass walks the feature list from a resume point, resolving references,
//! executing each feature through [`safe_operation`] and registering what it
//! produced. The working solid only becomes visible to readers when every
//! feature ended without error and the finalizer accepted it; otherwise the
//! previously committed solid stays in place.

use super::body::Body;
use super::report::RebuildReport;
use super::safe_op::{safe_operation, OperationOutcome};
use crate::checkpoint::GeometryHash;
use crate::dependency_graph::DependencyGraph;
use crate::envelope::{ErrorCode, ErrorEnvelope, FeatureRef, StatusClass};
use crate::error::{FinalizeError, RebuildError, Result};
use crate::feature::{FeatureId, FeatureOutput, FeatureStatus, ResolveContext};
use crate::identity::{GeometryFingerprint, IdentityRegistry};
use crate::kernel::{solid_signature, OpFailure, ShapeType, SolidRef};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const KERNEL_DEPENDENCY: &str = "kernel_api";

impl Body {
    /// Recompute every feature, ignoring checkpoints
    pub fn rebuild_all(&mut self) -> Result<RebuildReport> {
        self.run_pass(0)
    }

    /// Recompute what changed since the last pass.
    ///
    /// Resumes after the latest valid checkpoint before the first edited
    /// feature; a no-op when nothing is pending.
    pub fn rebuild_after_edit(&mut self) -> Result<RebuildReport> {
        let Some(changed) = self.pending_from else {
            return Ok(RebuildReport {
                resumed_from: self.features.len(),
                committed: false,
                ..Default::default()
            });
        };
        let start = self.graph.rebuild_start_for_index(changed);
        self.run_pass(start)
    }

    /// Treat `id` as changed and rebuild from the appropriate resume point
    pub fn rebuild_from_feature(&mut self, id: &FeatureId) -> Result<RebuildReport> {
        let index = self.index_of(id)?;
        self.graph.invalidate_checkpoints_from(index);

        let mut start = self.graph.get_rebuild_start_index(id)?;
        if let Some(pending) = self.pending_from {
            start = start.min(self.graph.rebuild_start_for_index(pending));
        }
        self.run_pass(start)
    }

    fn run_pass(&mut self, requested: usize) -> Result<RebuildReport> {
        let started = Instant::now();
        let n = self.features.len();
        let generation = self.registry.begin_generation();
        let start = self.validated_start(requested.min(n));
        self.graph.invalidate_checkpoints_from(start);

        debug!(generation, start, features = n, "Rebuild pass started");

        let mut report = RebuildReport {
            resumed_from: start,
            skipped: self.features[..start]
                .iter()
                .map(|f| f.id().clone())
                .collect(),
            ..Default::default()
        };

        let mut working = match start {
            0 => Arc::clone(&self.base),
            _ => self.outputs[start - 1]
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.base)),
        };

        for index in start..n {
            let feature = &self.features[index];
            let id = feature.id().clone();
            let operation = feature.operation();
            let feature_ref = FeatureRef::new(feature.class_name(), id.clone());
            let previous = self.outputs[index].take();
            let discarded = previous.as_ref().unwrap_or(&working);
            report.executed.push(id.clone());

            if let Some(upstream) = failed_upstream(&self.graph, &self.statuses, &id) {
                let envelope = ErrorEnvelope::new(
                    ErrorCode::BlockedByUpstreamError,
                    format!("blocked by failed upstream feature '{upstream}'"),
                    operation,
                    feature_ref,
                )
                .with_rollback(solid_signature(discarded), solid_signature(&working))
                .with_guidance();

                debug!(feature = %id, upstream = %upstream, "Feature blocked");
                self.registry.reset_health(&id);
                self.statuses
                    .insert(id.clone(), FeatureStatus::from_envelope(envelope));
                self.outputs[index] = Some(Arc::clone(&working));
                report.blocked.push(id);
                continue;
            }

            let mut ctx = ResolveContext::new(&mut self.registry, &working, &id);
            let resolved = feature.resolve_refs(&mut ctx);
            let summary = ctx.into_summary();

            let refs = match resolved {
                Ok(refs) => refs,
                Err(failure) => {
                    let envelope = ErrorEnvelope::new(
                        failure.code.clone(),
                        format!(
                            "{} reference #{} could not be resolved: {}",
                            failure.shape_type, failure.local_index, failure.reason
                        ),
                        operation,
                        feature_ref,
                    )
                    .with_refs(summary.refs)
                    .with_tnp_failure(failure.tnp_failure())
                    .with_rollback(solid_signature(discarded), solid_signature(&working))
                    .with_guidance();

                    warn!(
                        feature = %id,
                        code = %failure.code,
                        unresolved = summary.failures.len(),
                        "Reference resolution failed"
                    );
                    let blocked = envelope.status_class == StatusClass::Blocked;
                    self.statuses
                        .insert(id.clone(), FeatureStatus::from_envelope(envelope));
                    self.outputs[index] = Some(Arc::clone(&working));
                    if blocked {
                        report.blocked.push(id);
                    } else {
                        report.failed.push(id);
                    }
                    continue;
                }
            };

            let input = Arc::clone(&working);
            let drift_policy = self
                .config
                .strict_mode
                .then_some(&self.config.drift_policy);
            let outcome = safe_operation(
                operation,
                &id,
                &input,
                || feature.execute(&input, &refs),
                feature
                    .has_fallback()
                    .then(|| || feature.fallback(&input, &refs)),
                drift_policy,
            );

            let (output, primary_failure) = match outcome {
                OperationOutcome::Success(output) => (output, None),
                OperationOutcome::Recovered {
                    output,
                    primary_failure,
                } => (output, Some(primary_failure)),
                OperationOutcome::Failed {
                    code,
                    failure,
                    fallback_failure,
                } => {
                    let message = match &fallback_failure {
                        Some(fallback) => format!("{failure}; fallback failed: {fallback}"),
                        None => failure.to_string(),
                    };
                    let mut envelope = ErrorEnvelope::new(code, message, operation, feature_ref)
                        .with_refs(summary.refs)
                        .with_rollback(solid_signature(discarded), solid_signature(&input))
                        .with_guidance();
                    if matches!(failure, OpFailure::KernelUnavailable { .. }) {
                        envelope = envelope.with_runtime_dependency(KERNEL_DEPENDENCY, failure.to_string());
                    }

                    warn!(feature = %id, error = %failure, "Feature failed; input passed through");
                    self.statuses
                        .insert(id.clone(), FeatureStatus::from_envelope(envelope));
                    self.outputs[index] = Some(input);
                    report.failed.push(id);
                    continue;
                }
                OperationOutcome::DriftRejected { attempted, report: drift } => {
                    let envelope = ErrorEnvelope::new(
                        ErrorCode::SelfHealRollbackGeometryDrift,
                        drift.reasons.join("; "),
                        operation,
                        feature_ref,
                    )
                    .with_refs(summary.refs)
                    .with_rollback(solid_signature(&attempted), solid_signature(&input))
                    .with_geometry_drift(drift)
                    .with_guidance();

                    self.statuses
                        .insert(id.clone(), FeatureStatus::from_envelope(envelope));
                    self.outputs[index] = Some(input);
                    report.failed.push(id);
                    continue;
                }
            };

            register_outputs(&mut self.registry, &id, &output);

            let status = match (primary_failure, summary.degraded.and_then(|t| t.warning_code())) {
                (Some(primary), _) => {
                    let mut envelope = ErrorEnvelope::new(
                        ErrorCode::FallbackUsed,
                        format!("primary computation failed ({primary}); fallback result kept"),
                        operation,
                        feature_ref,
                    )
                    .with_refs(summary.refs)
                    .with_guidance();
                    if matches!(primary, OpFailure::KernelUnavailable { .. }) {
                        envelope = envelope.with_runtime_dependency(KERNEL_DEPENDENCY, primary.to_string());
                    }
                    FeatureStatus::from_envelope(envelope)
                }
                (None, Some(code)) => FeatureStatus::from_envelope(
                    ErrorEnvelope::new(
                        code,
                        "references were recovered outside recorded history",
                        operation,
                        feature_ref,
                    )
                    .with_refs(summary.refs)
                    .with_guidance(),
                ),
                (None, None) => FeatureStatus::ok(),
            };
            if !status.is_ok() {
                report.warnings.push(id.clone());
            }
            self.statuses.insert(id.clone(), status);

            working = output.solid;
            self.outputs[index] = Some(Arc::clone(&working));

            if self.graph.should_create_checkpoint(index) {
                self.graph.create_checkpoint(index, &id, &working);
                report.checkpoints_created.push(index);
            }
            self.graph.clear_dirty_feature(&id);
        }

        self.stats.rebuilds += 1;
        self.stats.features_executed += report.executed.len() as u64;
        self.stats.features_skipped += report.skipped.len() as u64;

        let any_error = self
            .features
            .iter()
            .any(|f| self.statuses.get(f.id()).is_some_and(FeatureStatus::is_error));

        if any_error {
            info!(
                failed = report.failed.len(),
                blocked = report.blocked.len(),
                "Rebuild finished with errors; committed solid retained"
            );
        } else if let Err(err) = self.finalizer.finalize(&working) {
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Err(self.fail_finalize(start, &working, err, report));
        } else {
            self.committed.store(Arc::clone(&working));
            self.registry.commit_bindings();
            self.stats.commits += 1;
            report.committed = true;
        }

        self.pending_from = None;
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            resumed_from = report.resumed_from,
            executed = report.executed.len(),
            warnings = report.warnings.len(),
            committed = report.committed,
            duration_ms = report.duration_ms,
            "Rebuild pass finished"
        );
        self.stats.last_report = Some(report.clone());
        Ok(report)
    }

    /// Confirm the cached solid at the resume point still matches its
    /// checkpoint; fall back to a full pass otherwise
    fn validated_start(&mut self, start: usize) -> usize {
        if start == 0 {
            return 0;
        }
        let expected_id = self.features[start - 1].id();
        let cached = self.outputs[start - 1].as_ref();
        let checkpoint = self.graph.checkpoint(start - 1).filter(|cp| cp.is_valid);

        let resumable = match (cached, checkpoint) {
            (Some(solid), Some(cp)) => {
                cp.feature_id == *expected_id
                    && cp.geometry_hash.matches(&GeometryHash::of(solid))
            }
            _ => false,
        };

        if resumable {
            self.stats.checkpoint_resumes += 1;
            return start;
        }
        warn!(
            resume_index = start,
            "Checkpoint does not match cached geometry; rebuilding from the start"
        );
        self.stats.checkpoint_mismatches += 1;
        self.graph.invalidate_checkpoints_from(0);
        0
    }

    fn fail_finalize(
        &mut self,
        start: usize,
        working: &SolidRef,
        err: FinalizeError,
        mut report: RebuildReport,
    ) -> RebuildError {
        let committed = self.committed.load_full();
        let feature_ref = self.features.last().map_or_else(
            || FeatureRef::new("Body", FeatureId::new("")),
            |f| FeatureRef::new(f.class_name(), f.id().clone()),
        );
        let envelope = ErrorEnvelope::new(
            ErrorCode::RebuildFinalizeFailed,
            err.to_string(),
            "finalize",
            feature_ref,
        )
        .with_rollback(solid_signature(working), solid_signature(&committed))
        .with_guidance();

        if let Some(last) = self.features.last() {
            self.statuses.insert(
                last.id().clone(),
                FeatureStatus::from_envelope(envelope.clone()),
            );
        }

        let retry_from = start.min(self.features.len().saturating_sub(1));
        self.graph.invalidate_checkpoints_from(retry_from);
        self.pending_from = Some(retry_from);

        error!(stage = %err.stage, error = %err.message, "Rebuild finalization failed; rolled back");
        self.stats.finalize_failures += 1;
        report.committed = false;
        self.stats.last_report = Some(report);

        RebuildError::FinalizeFailed {
            envelope: Box::new(envelope),
            source: err,
        }
    }
}

/// Earliest upstream feature currently in an error state
fn failed_upstream(
    graph: &DependencyGraph,
    statuses: &HashMap<FeatureId, FeatureStatus>,
    id: &FeatureId,
) -> Option<FeatureId> {
    graph
        .upstream_of(id)
        .into_iter()
        .find(|up| statuses.get(up).is_some_and(FeatureStatus::is_error))
}

/// Issue identities for a successful feature's new shapes and log its history.
///
/// `local_index` is the position among generated shapes of the same type.
fn register_outputs(registry: &mut IdentityRegistry, feature_id: &FeatureId, output: &FeatureOutput) {
    let mut per_type: HashMap<ShapeType, usize> = HashMap::new();
    for topo_id in &output.generated {
        let Some(handle) = output.solid.handle(*topo_id) else {
            debug!(feature = %feature_id, topo_id = topo_id.0, "Generated id not in result solid");
            continue;
        };
        let local_index = per_type.entry(handle.shape_type()).or_default();
        let fingerprint = GeometryFingerprint::of(&handle);
        registry.register_shape(handle, feature_id, *local_index, fingerprint);
        *local_index += 1;
    }

    for step in &output.history {
        registry.record_topological_operation(
            feature_id,
            &step.operation_type,
            &step.inputs,
            &step.outputs,
        );
    }
}
