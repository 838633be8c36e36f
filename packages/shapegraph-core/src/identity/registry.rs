//! Topological naming service
//!
//! Issues [`ShapeId`]s, keeps the provenance log and binds every uuid to the
//! live handle of the current rebuild generation. `resolve` maps a persisted
//! reference back onto a solid, trying in order:
//!
//! 1. history: the shape itself, else its single surviving descendant
//! 2. fallback: geometric match on the registration fingerprint
//! 3. local index: position within the owning feature's live outputs
//!
//! Tiers 2 and 3 are disabled in strict mode.
//!
//! Bindings live in two layers. Rebuild passes register into the working
//! layer, which tracks the geometry the engine last computed and is what
//! resolution reads. The committed layer mirrors the solid readers can see
//! and serves reverse lookups; it only changes on [`IdentityRegistry::commit_bindings`].

use super::health::{FeatureHealth, HealthReport, RefHealth, ResolutionMethod};
use super::history::{OperationLog, OperationRecord};
use super::shape_id::{GeometryFingerprint, ShapeId, ShapeSlot};
use crate::config::{EngineConfig, DEFAULT_DRIFT_THRESHOLD};
use crate::envelope::{ErrorCode, FailureCategory, TnpFailure};
use crate::error::{IdentityError, IdentityResult};
use crate::feature::FeatureId;
use crate::kernel::{EdgeGeom, FaceGeom, GeometryHandle, ShapeType, Solid, TopoId, VertexGeom};
use crate::selector::GeometricSelector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};
use uuid::Uuid;

pub const REGISTRY_SNAPSHOT_VERSION: u32 = 1;

/// Binding of a uuid to the handle produced in the latest generation
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeRecord {
    pub handle: GeometryHandle,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionTier {
    Ok,
    /// History hit whose geometry moved beyond the soft threshold
    Drift,
    Fallback,
    LocalIndex,
}

impl ResolutionTier {
    /// Tiers that leave the consuming feature at WARNING_RECOVERABLE
    pub fn warning_code(&self) -> Option<ErrorCode> {
        match self {
            ResolutionTier::Ok => None,
            ResolutionTier::Drift => Some(ErrorCode::TnpRefDrift),
            ResolutionTier::Fallback | ResolutionTier::LocalIndex => Some(ErrorCode::FallbackUsed),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub handle: GeometryHandle,
    pub tier: ResolutionTier,
    /// Fingerprint distance between registration time and now
    pub drift: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolveFailure {
    pub uuid: Uuid,
    pub shape_type: ShapeType,
    pub local_index: usize,
    pub category: FailureCategory,
    pub code: ErrorCode,
    pub reason: String,
}

impl ResolveFailure {
    pub fn tnp_failure(&self) -> TnpFailure {
        TnpFailure {
            category: self.category,
            reference_kind: self.shape_type,
            reason: self.reason.clone(),
        }
    }
}

/// Cumulative resolution counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionCounters {
    pub ok: u64,
    pub drift: u64,
    pub fallback: u64,
    pub local_index: u64,
    pub failed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub shapes: usize,
    /// Shapes bound to a handle of the committed solid
    pub bound_shapes: usize,
    pub faces: usize,
    pub edges: usize,
    pub vertices: usize,
    pub features: usize,
    pub operations: usize,
    pub generation: u64,
    pub resolutions: ResolutionCounters,
}

/// Persistable registry state; handles are not persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub shapes: Vec<ShapeId>,
    pub operations: Vec<OperationRecord>,
}

/// uuid → handle bindings with the reverse kernel-id index kept in step
#[derive(Debug, Clone, Default)]
struct Bindings {
    records: HashMap<Uuid, ShapeRecord>,
    by_topo: HashMap<TopoId, Uuid>,
}

impl Bindings {
    fn bind(&mut self, uuid: Uuid, handle: GeometryHandle, generation: u64) {
        if let Some(previous) = self.records.get(&uuid) {
            let old_topo = previous.handle.topo_id();
            if self.by_topo.get(&old_topo) == Some(&uuid) {
                self.by_topo.remove(&old_topo);
            }
        }
        self.by_topo.insert(handle.topo_id(), uuid);
        self.records.insert(uuid, ShapeRecord { handle, generation });
    }

    fn unbind(&mut self, uuid: &Uuid) {
        if let Some(record) = self.records.remove(uuid) {
            let topo = record.handle.topo_id();
            if self.by_topo.get(&topo) == Some(uuid) {
                self.by_topo.remove(&topo);
            }
        }
    }

    fn clear(&mut self) {
        self.records.clear();
        self.by_topo.clear();
    }
}

#[derive(Debug)]
pub struct IdentityRegistry {
    shapes: HashMap<Uuid, ShapeId>,
    slots: HashMap<ShapeSlot, Uuid>,
    by_feature: BTreeMap<FeatureId, Vec<Uuid>>,
    working: Bindings,
    committed: Bindings,
    log: OperationLog,
    generation: u64,

    selector: GeometricSelector,
    drift_threshold: f64,
    strict_mode: bool,

    health: BTreeMap<FeatureId, FeatureHealth>,
    counters: ResolutionCounters,
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self {
            shapes: HashMap::new(),
            slots: HashMap::new(),
            by_feature: BTreeMap::new(),
            working: Bindings::default(),
            committed: Bindings::default(),
            log: OperationLog::new(),
            generation: 0,
            selector: GeometricSelector::default(),
            drift_threshold: DEFAULT_DRIFT_THRESHOLD,
            strict_mode: false,
            health: BTreeMap::new(),
            counters: ResolutionCounters::default(),
        }
    }

    pub fn with_config(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.apply_config(config);
        registry
    }

    pub fn apply_config(&mut self, config: &EngineConfig) {
        self.selector = GeometricSelector::new(config.selector);
        self.drift_threshold = config.drift_threshold;
        self.strict_mode = config.strict_mode;
    }

    pub fn strict_mode(&self) -> bool {
        self.strict_mode
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a rebuild generation; later registrations are stamped with it
    pub fn begin_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Issue (or re-bind) the identity of one output shape of a feature.
    ///
    /// The same `(feature, type, local_index)` slot keeps its uuid across
    /// generations; only the bound handle is refreshed.
    pub fn register_shape(
        &mut self,
        handle: GeometryHandle,
        feature_id: &FeatureId,
        local_index: usize,
        fingerprint: GeometryFingerprint,
    ) -> ShapeId {
        let slot = ShapeSlot {
            feature_id: feature_id.clone(),
            shape_type: handle.shape_type(),
            local_index,
        };

        let uuid = match self.slots.get(&slot) {
            Some(uuid) => *uuid,
            None => {
                let id = ShapeId::new(slot.shape_type, feature_id.clone(), local_index, fingerprint);
                let uuid = id.uuid;
                trace!(shape = %id, "Issued shape id");
                self.shapes.insert(uuid, id);
                self.slots.insert(slot, uuid);
                self.by_feature.entry(feature_id.clone()).or_default().push(uuid);
                uuid
            }
        };

        self.working.bind(uuid, handle, self.generation);
        self.shapes[&uuid].clone()
    }

    /// Publish the working bindings as the ones behind the visible solid
    pub fn commit_bindings(&mut self) {
        self.committed = self.working.clone();
        trace!(
            bound = self.committed.records.len(),
            generation = self.generation,
            "Committed shape bindings"
        );
    }

    /// Append a provenance record; `false` if it was already logged
    pub fn record_operation(&mut self, record: OperationRecord) -> bool {
        self.log.append(record).is_some()
    }

    /// Provenance record from kernel ids, translated through the live bindings.
    ///
    /// Ids without a registered shape are dropped; nothing is logged if either
    /// side ends up empty.
    pub fn record_topological_operation(
        &mut self,
        feature_id: &FeatureId,
        operation_type: &str,
        inputs: &[TopoId],
        outputs: &[TopoId],
    ) -> bool {
        let translate = |ids: &[TopoId]| -> Vec<Uuid> {
            ids.iter()
                .filter_map(|t| self.working.by_topo.get(t).copied())
                .collect()
        };
        let (inputs, outputs) = (translate(inputs), translate(outputs));
        if inputs.is_empty() || outputs.is_empty() {
            return false;
        }
        self.record_operation(OperationRecord::new(
            operation_type,
            inputs,
            outputs,
            feature_id.clone(),
        ))
    }

    /// Reverse lookup of a handle picked from the committed solid
    pub fn find_shape_id(&self, handle: &GeometryHandle) -> Option<&ShapeId> {
        let uuid = self.committed.by_topo.get(&handle.topo_id())?;
        self.shapes
            .get(uuid)
            .filter(|id| id.shape_type == handle.shape_type())
    }

    pub fn find_shape_id_by_face(&self, face: &FaceGeom) -> Option<&ShapeId> {
        self.find_shape_id(&GeometryHandle::Face(face.clone()))
    }

    pub fn find_shape_id_by_edge(&self, edge: &EdgeGeom) -> Option<&ShapeId> {
        self.find_shape_id(&GeometryHandle::Edge(edge.clone()))
    }

    pub fn find_shape_id_by_vertex(&self, vertex: &VertexGeom) -> Option<&ShapeId> {
        self.find_shape_id(&GeometryHandle::Vertex(vertex.clone()))
    }

    pub fn get(&self, uuid: &Uuid) -> Option<&ShapeId> {
        self.shapes.get(uuid)
    }

    /// Binding behind the committed solid
    pub fn record(&self, uuid: &Uuid) -> Option<&ShapeRecord> {
        self.committed.records.get(uuid)
    }

    /// Binding from the latest pass, committed or not
    pub fn working_record(&self, uuid: &Uuid) -> Option<&ShapeRecord> {
        self.working.records.get(uuid)
    }

    /// Shape ids issued for a feature, ordered by type then local index
    pub fn shapes_of_feature(&self, feature_id: &FeatureId) -> Vec<&ShapeId> {
        let mut ids: Vec<&ShapeId> = self
            .by_feature
            .get(feature_id)
            .into_iter()
            .flatten()
            .filter_map(|uuid| self.shapes.get(uuid))
            .collect();
        ids.sort_by_key(|id| (id.shape_type, id.local_index));
        ids
    }

    pub fn operations(&self) -> &[OperationRecord] {
        self.log.records()
    }

    /// Map a persisted reference onto `current_solid`.
    ///
    /// Pure lookup; use [`IdentityRegistry::resolve_for`] to also record the
    /// outcome in the health report.
    pub fn resolve(
        &self,
        shape_id: &ShapeId,
        current_solid: &Solid,
    ) -> Result<Resolution, ResolveFailure> {
        let mut ambiguous = false;

        // 1. history
        match self.resolve_history(shape_id, current_solid) {
            HistoryHit::One(handle) => {
                let drift = shape_id
                    .geometry_fingerprint
                    .distance(&GeometryFingerprint::of(&handle));
                let tier = if drift > self.drift_threshold {
                    ResolutionTier::Drift
                } else {
                    ResolutionTier::Ok
                };
                return Ok(Resolution {
                    handle,
                    tier,
                    drift,
                });
            }
            HistoryHit::Ambiguous(n) => {
                debug!(shape = %shape_id, survivors = n, "History resolution ambiguous");
                ambiguous = true;
            }
            HistoryHit::None => {}
        }

        if self.strict_mode {
            return Err(self.failure(
                shape_id,
                FailureCategory::MissingRef,
                ErrorCode::FallbackBlockedStrict,
                "no surviving history and strict mode disables geometric fallback".to_string(),
            ));
        }

        // 2. geometric fallback
        let candidates = current_solid.handles_of(shape_id.shape_type);
        let selector = self
            .selector
            .from_fingerprint(shape_id.shape_type, &shape_id.geometry_fingerprint);
        if let Some(hit) = self.selector.best_match(&selector, &candidates) {
            debug!(shape = %shape_id, score = hit.score, "Resolved by geometric fallback");
            let drift = shape_id
                .geometry_fingerprint
                .distance(&GeometryFingerprint::of(&hit.handle));
            return Ok(Resolution {
                handle: hit.handle,
                tier: ResolutionTier::Fallback,
                drift,
            });
        }
        if self.selector.closest(&selector, &candidates).is_some() {
            ambiguous = true;
        }

        // 3. local index within the owner's live outputs
        if let Some(handle) = self.resolve_local_index(shape_id, current_solid) {
            debug!(shape = %shape_id, "Resolved by local index");
            let drift = shape_id
                .geometry_fingerprint
                .distance(&GeometryFingerprint::of(&handle));
            return Ok(Resolution {
                handle,
                tier: ResolutionTier::LocalIndex,
                drift,
            });
        }

        Err(if ambiguous {
            self.failure(
                shape_id,
                FailureCategory::Drift,
                ErrorCode::TnpRefMismatch,
                "candidates exist but none matches unambiguously within tolerance".to_string(),
            )
        } else {
            self.failure(
                shape_id,
                FailureCategory::MissingRef,
                ErrorCode::TnpRefMissing,
                format!("no {} left in the current solid", shape_id.shape_type),
            )
        })
    }

    /// Resolve and record the outcome under `consumer` in the health report
    pub fn resolve_for(
        &mut self,
        consumer: &FeatureId,
        shape_id: &ShapeId,
        current_solid: &Solid,
    ) -> Result<Resolution, ResolveFailure> {
        let outcome = self.resolve(shape_id, current_solid);

        let method = match &outcome {
            Ok(r) => match r.tier {
                ResolutionTier::Ok => {
                    self.counters.ok += 1;
                    ResolutionMethod::History
                }
                ResolutionTier::Drift => {
                    self.counters.drift += 1;
                    ResolutionMethod::Drift
                }
                ResolutionTier::Fallback => {
                    self.counters.fallback += 1;
                    ResolutionMethod::Fallback
                }
                ResolutionTier::LocalIndex => {
                    self.counters.local_index += 1;
                    ResolutionMethod::LocalIndex
                }
            },
            Err(_) => {
                self.counters.failed += 1;
                ResolutionMethod::Failed
            }
        };

        self.health
            .entry(consumer.clone())
            .or_default()
            .record(RefHealth {
                shape_uuid: shape_id.uuid,
                shape_type: shape_id.shape_type,
                source_feature: shape_id.feature_id.clone(),
                local_index: shape_id.local_index,
                method,
                code: outcome.as_ref().err().map(|f| f.code.clone()),
            });

        outcome
    }

    /// Forget the previous pass's resolutions of `consumer`
    pub fn reset_health(&mut self, consumer: &FeatureId) {
        self.health.remove(consumer);
    }

    pub fn get_health_report(&self) -> HealthReport {
        HealthReport::from_features(self.health.clone())
    }

    pub fn get_stats(&self) -> RegistryStats {
        let count = |t: ShapeType| self.shapes.values().filter(|s| s.shape_type == t).count();
        RegistryStats {
            shapes: self.shapes.len(),
            bound_shapes: self.committed.records.len(),
            faces: count(ShapeType::Face),
            edges: count(ShapeType::Edge),
            vertices: count(ShapeType::Vertex),
            features: self.by_feature.len(),
            operations: self.log.len(),
            generation: self.generation,
            resolutions: self.counters,
        }
    }

    /// Garbage-collect everything owned by a deleted feature
    pub fn remove_feature_shapes(&mut self, feature_id: &FeatureId) -> usize {
        let uuids = self.by_feature.remove(feature_id).unwrap_or_default();
        for uuid in &uuids {
            if let Some(id) = self.shapes.remove(uuid) {
                self.slots.remove(&id.slot());
            }
            self.working.unbind(uuid);
            self.committed.unbind(uuid);
        }
        let ops = self.log.remove_feature(feature_id);
        self.health.remove(feature_id);

        debug!(
            feature = %feature_id,
            shapes = uuids.len(),
            operations = ops,
            "Removed feature shapes"
        );
        uuids.len()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let mut shapes: Vec<ShapeId> = self.shapes.values().cloned().collect();
        shapes.sort_by(|a, b| {
            (&a.feature_id, a.shape_type, a.local_index).cmp(&(
                &b.feature_id,
                b.shape_type,
                b.local_index,
            ))
        });
        RegistrySnapshot {
            version: REGISTRY_SNAPSHOT_VERSION,
            shapes,
            operations: self.log.records().to_vec(),
        }
    }

    /// Replace identities and provenance with a snapshot.
    ///
    /// Handles are unbound until the next rebuild re-registers each slot.
    pub fn restore(&mut self, snapshot: RegistrySnapshot) -> IdentityResult<()> {
        if snapshot.version != REGISTRY_SNAPSHOT_VERSION {
            return Err(IdentityError::UnsupportedSnapshotVersion {
                found: snapshot.version,
                supported: REGISTRY_SNAPSHOT_VERSION,
            });
        }

        let mut shapes = HashMap::with_capacity(snapshot.shapes.len());
        let mut slots = HashMap::with_capacity(snapshot.shapes.len());
        let mut by_feature: BTreeMap<FeatureId, Vec<Uuid>> = BTreeMap::new();
        for id in snapshot.shapes {
            if shapes.contains_key(&id.uuid) {
                return Err(IdentityError::DuplicateUuid(id.uuid));
            }
            if slots.insert(id.slot(), id.uuid).is_some() {
                return Err(IdentityError::DuplicateSlot {
                    feature_id: id.feature_id.clone(),
                    shape_type: id.shape_type,
                    local_index: id.local_index,
                });
            }
            by_feature.entry(id.feature_id.clone()).or_default().push(id.uuid);
            shapes.insert(id.uuid, id);
        }

        self.shapes = shapes;
        self.slots = slots;
        self.by_feature = by_feature;
        self.working.clear();
        self.committed.clear();
        self.log = OperationLog::from_records(snapshot.operations);
        self.health.clear();

        debug!(
            shapes = self.shapes.len(),
            operations = self.log.len(),
            "Restored identity registry"
        );
        Ok(())
    }

    fn resolve_history(&self, shape_id: &ShapeId, solid: &Solid) -> HistoryHit {
        if let Some(handle) = self.live_handle(&shape_id.uuid, solid) {
            return HistoryHit::One(handle);
        }

        let mut survivors: Vec<GeometryHandle> = self
            .log
            .descendants(&shape_id.uuid)
            .iter()
            .filter(|uuid| {
                self.shapes
                    .get(uuid)
                    .is_some_and(|id| id.shape_type == shape_id.shape_type)
            })
            .filter_map(|uuid| self.live_handle(uuid, solid))
            .collect();

        match survivors.len() {
            0 => HistoryHit::None,
            1 => HistoryHit::One(survivors.remove(0)),
            n => HistoryHit::Ambiguous(n),
        }
    }

    fn resolve_local_index(&self, shape_id: &ShapeId, solid: &Solid) -> Option<GeometryHandle> {
        let live: Vec<GeometryHandle> = self
            .shapes_of_feature(&shape_id.feature_id)
            .into_iter()
            .filter(|id| id.shape_type == shape_id.shape_type)
            .filter_map(|id| self.live_handle(&id.uuid, solid))
            .collect();
        live.into_iter().nth(shape_id.local_index)
    }

    /// Handle bound to `uuid`, re-read from `solid` if it is still there
    fn live_handle(&self, uuid: &Uuid, solid: &Solid) -> Option<GeometryHandle> {
        let record = self.working.records.get(uuid)?;
        solid.handle(record.handle.topo_id())
    }

    fn failure(
        &self,
        shape_id: &ShapeId,
        category: FailureCategory,
        code: ErrorCode,
        reason: String,
    ) -> ResolveFailure {
        ResolveFailure {
            uuid: shape_id.uuid,
            shape_type: shape_id.shape_type,
            local_index: shape_id.local_index,
            category,
            code,
            reason,
        }
    }
}

enum HistoryHit {
    One(GeometryHandle),
    Ambiguous(usize),
    None,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::{BoundingBox, CurveKind, Point3, Vec3};

    fn edge(id: u64, center: Point3, length: f64) -> EdgeGeom {
        EdgeGeom {
            id: TopoId(id),
            curve: CurveKind::Line,
            center,
            direction: Vec3::new(1.0, 0.0, 0.0),
            length,
        }
    }

    fn solid_with_edges(edges: Vec<EdgeGeom>) -> Solid {
        Solid::new(
            1.0,
            Point3::zero(),
            BoundingBox::default(),
            Vec::new(),
            edges,
            Vec::new(),
        )
    }

    fn register(reg: &mut IdentityRegistry, e: &EdgeGeom, feature: &str, idx: usize) -> ShapeId {
        let handle = GeometryHandle::Edge(e.clone());
        let fp = GeometryFingerprint::of(&handle);
        reg.register_shape(handle, &FeatureId::new(feature), idx, fp)
    }

    #[test]
    fn test_register_and_reverse_lookup() {
        let mut reg = IdentityRegistry::new();
        let e = edge(10, Vec3::zero(), 5.0);
        let id = register(&mut reg, &e, "box", 0);
        assert!(reg.find_shape_id_by_edge(&e).is_none());

        reg.commit_bindings();
        assert_eq!(reg.find_shape_id_by_edge(&e).map(|s| s.uuid), Some(id.uuid));
        assert_eq!(id.shape_type, ShapeType::Edge);
        assert!(reg
            .find_shape_id(&GeometryHandle::Edge(edge(11, Vec3::zero(), 5.0)))
            .is_none());
    }

    #[test]
    fn test_reregistration_keeps_uuid_and_rebinds() {
        let mut reg = IdentityRegistry::new();
        let first = register(&mut reg, &edge(1, Vec3::zero(), 5.0), "box", 0);
        reg.begin_generation();
        let e2 = edge(2, Vec3::zero(), 5.0);
        let second = register(&mut reg, &e2, "box", 0);
        reg.commit_bindings();

        assert_eq!(first.uuid, second.uuid);
        assert_eq!(reg.record(&first.uuid).unwrap().handle.topo_id(), TopoId(2));
        assert_eq!(reg.record(&first.uuid).unwrap().generation, 1);
        assert!(reg
            .find_shape_id(&GeometryHandle::Edge(edge(1, Vec3::zero(), 5.0)))
            .is_none());
        assert_eq!(reg.get_stats().shapes, 1);
    }

    #[test]
    fn test_uncommitted_bindings_stay_out_of_lookups() {
        let mut reg = IdentityRegistry::new();
        let committed = edge(1, Vec3::zero(), 5.0);
        let id = register(&mut reg, &committed, "box", 0);
        reg.commit_bindings();

        reg.begin_generation();
        let rebuilt = edge(2, Vec3::zero(), 6.0);
        register(&mut reg, &rebuilt, "box", 0);

        // Picks still address the committed solid
        assert_eq!(reg.find_shape_id_by_edge(&committed).map(|s| s.uuid), Some(id.uuid));
        assert!(reg.find_shape_id_by_edge(&rebuilt).is_none());
        assert_eq!(reg.record(&id.uuid).unwrap().handle.topo_id(), TopoId(1));
        assert_eq!(reg.working_record(&id.uuid).unwrap().handle.topo_id(), TopoId(2));

        // Resolution follows the working geometry
        let r = reg.resolve(&id, &solid_with_edges(vec![rebuilt.clone()])).unwrap();
        assert_eq!(r.handle.topo_id(), TopoId(2));

        reg.commit_bindings();
        assert!(reg.find_shape_id_by_edge(&committed).is_none());
        assert_eq!(reg.find_shape_id_by_edge(&rebuilt).map(|s| s.uuid), Some(id.uuid));
    }

    #[test]
    fn test_resolve_own_handle_is_ok() {
        let mut reg = IdentityRegistry::new();
        let e = edge(1, Vec3::zero(), 5.0);
        let id = register(&mut reg, &e, "box", 0);
        let solid = solid_with_edges(vec![edge(9, Vec3::new(3.0, 0.0, 0.0), 5.0), e]);

        let r = reg.resolve(&id, &solid).unwrap();
        assert_eq!(r.tier, ResolutionTier::Ok);
        assert_eq!(r.handle.topo_id(), TopoId(1));
    }

    #[test]
    fn test_resolve_through_history() {
        let mut reg = IdentityRegistry::new();
        let original = edge(1, Vec3::zero(), 5.0);
        let id = register(&mut reg, &original, "box", 0);
        let modified = edge(2, Vec3::new(0.1, 0.0, 0.0), 5.0);
        register(&mut reg, &modified, "cut", 0);
        assert!(reg.record_topological_operation(
            &FeatureId::new("cut"),
            "modify",
            &[TopoId(1)],
            &[TopoId(2)],
        ));

        let solid = solid_with_edges(vec![modified]);
        let r = reg.resolve(&id, &solid).unwrap();
        assert_eq!(r.tier, ResolutionTier::Ok);
        assert_eq!(r.handle.topo_id(), TopoId(2));
    }

    #[test]
    fn test_history_drift_is_flagged() {
        let mut reg = IdentityRegistry::new();
        let id = register(&mut reg, &edge(1, Vec3::zero(), 5.0), "box", 0);
        let moved = edge(2, Vec3::new(2.0, 0.0, 0.0), 5.0);
        register(&mut reg, &moved, "move", 0);
        reg.record_topological_operation(&FeatureId::new("move"), "modify", &[TopoId(1)], &[TopoId(2)]);

        let r = reg.resolve(&id, &solid_with_edges(vec![moved])).unwrap();
        assert_eq!(r.tier, ResolutionTier::Drift);
        assert!((r.drift - 2.0).abs() < 1e-9);
        assert_eq!(r.tier.warning_code(), Some(ErrorCode::TnpRefDrift));
    }

    #[test]
    fn test_split_falls_through_to_fallback() {
        let mut reg = IdentityRegistry::new();
        let id = register(&mut reg, &edge(1, Vec3::zero(), 10.0), "box", 0);
        let left = edge(2, Vec3::new(-2.5, 0.0, 0.0), 5.0);
        let right = edge(3, Vec3::new(2.5, 0.0, 0.0), 5.0);
        register(&mut reg, &left, "split", 0);
        register(&mut reg, &right, "split", 1);
        reg.record_topological_operation(
            &FeatureId::new("split"),
            "split",
            &[TopoId(1)],
            &[TopoId(2), TopoId(3)],
        );

        let solid = solid_with_edges(vec![left, right]);
        // both halves score 2.5 + 0.5 > tolerance 1.0
        let err = reg.resolve(&id, &solid).unwrap_err();
        assert_eq!(err.code, ErrorCode::TnpRefMismatch);
        assert_eq!(err.category, FailureCategory::Drift);
    }

    #[test]
    fn test_fallback_tier_and_strict_mode() {
        let mut reg = IdentityRegistry::new();
        let id = register(&mut reg, &edge(1, Vec3::zero(), 5.0), "box", 0);
        // unrelated kernel ids, no history
        let solid = solid_with_edges(vec![edge(50, Vec3::new(0.0, 0.2, 0.0), 5.0)]);

        let r = reg.resolve(&id, &solid).unwrap();
        assert_eq!(r.tier, ResolutionTier::Fallback);
        assert_eq!(r.handle.topo_id(), TopoId(50));

        reg.apply_config(&EngineConfig::default().strict_mode(true));
        let err = reg.resolve(&id, &solid).unwrap_err();
        assert_eq!(err.code, ErrorCode::FallbackBlockedStrict);
    }

    #[test]
    fn test_local_index_tier() {
        let mut reg = IdentityRegistry::new();
        let a = edge(1, Vec3::zero(), 5.0);
        let b = edge(2, Vec3::new(0.0, 30.0, 0.0), 5.0);
        let c = edge(3, Vec3::new(0.0, 60.0, 0.0), 5.0);
        register(&mut reg, &a, "box", 0);
        let id_b = register(&mut reg, &b, "box", 1);
        register(&mut reg, &c, "box", 2);

        // b is gone and nothing looks like it; positionally the owner's
        // second live edge is c
        let solid = solid_with_edges(vec![a, c]);
        let r = reg.resolve(&id_b, &solid).unwrap();
        assert_eq!(r.tier, ResolutionTier::LocalIndex);
        assert_eq!(r.handle.topo_id(), TopoId(3));
    }

    #[test]
    fn test_missing_reference() {
        let mut reg = IdentityRegistry::new();
        let id = register(&mut reg, &edge(1, Vec3::zero(), 5.0), "box", 0);
        let err = reg.resolve(&id, &solid_with_edges(Vec::new())).unwrap_err();
        assert_eq!(err.code, ErrorCode::TnpRefMissing);
        assert_eq!(err.category, FailureCategory::MissingRef);
        assert_eq!(err.tnp_failure().reference_kind, ShapeType::Edge);
    }

    #[test]
    fn test_health_report_counts() {
        let mut reg = IdentityRegistry::new();
        let e = edge(1, Vec3::zero(), 5.0);
        let id = register(&mut reg, &e, "box", 0);
        let consumer = FeatureId::new("fillet");

        let solid = solid_with_edges(vec![e]);
        reg.resolve_for(&consumer, &id, &solid).unwrap();
        let _ = reg.resolve_for(&consumer, &id, &solid_with_edges(Vec::new()));

        let report = reg.get_health_report();
        let health = &report.features[&consumer];
        assert_eq!((health.ok, health.fallback, health.broken), (1, 0, 1));
        assert_eq!(health.refs[0].method, ResolutionMethod::History);
        assert_eq!(health.refs[1].method, ResolutionMethod::Failed);
        assert_eq!(reg.get_stats().resolutions.failed, 1);

        reg.reset_health(&consumer);
        assert!(reg.get_health_report().features.is_empty());
    }

    #[test]
    fn test_remove_feature_shapes() {
        let mut reg = IdentityRegistry::new();
        let e = edge(1, Vec3::zero(), 5.0);
        register(&mut reg, &e, "box", 0);
        register(&mut reg, &edge(2, Vec3::zero(), 1.0), "other", 0);
        reg.commit_bindings();

        assert_eq!(reg.remove_feature_shapes(&FeatureId::new("box")), 1);
        assert!(reg.find_shape_id_by_edge(&e).is_none());
        let stats = reg.get_stats();
        assert_eq!((stats.shapes, stats.features), (1, 1));
    }

    #[test]
    fn test_snapshot_restore_keeps_uuids() {
        let mut reg = IdentityRegistry::new();
        let id = register(&mut reg, &edge(1, Vec3::zero(), 5.0), "box", 0);
        register(&mut reg, &edge(2, Vec3::zero(), 5.0), "cut", 0);
        reg.record_topological_operation(&FeatureId::new("cut"), "modify", &[TopoId(1)], &[TopoId(2)]);

        let json = serde_json::to_string(&reg.snapshot()).unwrap();
        let mut restored = IdentityRegistry::new();
        restored
            .restore(serde_json::from_str(&json).unwrap())
            .unwrap();

        assert_eq!(restored.get_stats().shapes, 2);
        assert_eq!(restored.operations().len(), 1);
        let rebound = register(&mut restored, &edge(7, Vec3::zero(), 5.0), "box", 0);
        assert_eq!(rebound.uuid, id.uuid);
    }

    #[test]
    fn test_restore_rejects_unknown_version() {
        let mut reg = IdentityRegistry::new();
        let mut snapshot = reg.snapshot();
        snapshot.version = 99;
        assert!(matches!(
            reg.restore(snapshot),
            Err(IdentityError::UnsupportedSnapshotVersion { found: 99, .. })
        ));
    }
}
