//! Feature dependency graph
//!
//! Tracks which features depend on which, propagates dirtiness and keeps the
//! checkpoint bookkeeping that decides where an incremental rebuild resumes.
//!
//! Adjacency is two explicit maps (forward: what a feature depends on,
//! reverse: who depends on it). Both are recomputed as a unit from the feature
//! order and the declared dependencies whenever the structure changes;
//! indices shift on insert/remove, so edges are never patched in place.
//!
//! ```text
//! F0 ──seq──▶ F1 ──seq──▶ F2 ──seq──▶ F3
//!  └────────edge_ref─────────────────▶┘
//!
//! mark_dirty(F1) → {F1, F2, F3}
//! mark_dirty(F0) → {F0, F1, F2, F3}
//! ```

use crate::checkpoint::{CheckpointStore, RebuildCheckpoint};
use crate::config::DEFAULT_CHECKPOINT_INTERVAL;
use crate::error::{GraphError, GraphResult};
use crate::feature::FeatureId;
use crate::kernel::Solid;
use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DependencyKind {
    Sequential,
    EdgeReference,
    FaceReference,
    SketchReference,
    BodyReference,
}

impl DependencyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DependencyKind::Sequential => "SEQUENTIAL",
            DependencyKind::EdgeReference => "EDGE_REFERENCE",
            DependencyKind::FaceReference => "FACE_REFERENCE",
            DependencyKind::SketchReference => "SKETCH_REFERENCE",
            DependencyKind::BodyReference => "BODY_REFERENCE",
        }
    }
}

/// Edge `source → target`: `target` depends on `source`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FeatureDependency {
    pub source: FeatureId,
    pub target: FeatureId,
    pub kind: DependencyKind,
}

/// Explicit dependency a feature declares on an earlier feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclaredDependency {
    pub upstream: FeatureId,
    pub kind: DependencyKind,
}

impl DeclaredDependency {
    pub fn new(upstream: impl Into<FeatureId>, kind: DependencyKind) -> Self {
        Self {
            upstream: upstream.into(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Adjacency {
    /// feature → edges into it (its dependencies)
    forward: HashMap<FeatureId, Vec<FeatureDependency>>,
    /// feature → features that depend on it
    reverse: HashMap<FeatureId, Vec<FeatureId>>,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    order: Vec<FeatureId>,
    index_of: HashMap<FeatureId, usize>,
    declared: HashMap<FeatureId, Vec<DeclaredDependency>>,
    adjacency: Adjacency,
    dirty: HashSet<FeatureId>,
    checkpoints: CheckpointStore,
    checkpoint_interval: usize,
}

impl Default for DependencyGraph {
    fn default() -> Self {
        Self::new(DEFAULT_CHECKPOINT_INTERVAL)
    }
}

impl DependencyGraph {
    /// `checkpoint_interval` of zero is treated as one
    pub fn new(checkpoint_interval: usize) -> Self {
        Self {
            order: Vec::new(),
            index_of: HashMap::new(),
            declared: HashMap::new(),
            adjacency: Adjacency::default(),
            dirty: HashSet::new(),
            checkpoints: CheckpointStore::new(),
            checkpoint_interval: checkpoint_interval.max(1),
        }
    }

    pub fn checkpoint_interval(&self) -> usize {
        self.checkpoint_interval
    }

    pub fn set_checkpoint_interval(&mut self, interval: usize) {
        self.checkpoint_interval = interval.max(1);
    }

    /// Insert a feature at `index` with its explicit dependencies.
    ///
    /// The SEQUENTIAL edge to `feature_at(index - 1)` is always added.
    /// Features at and after `index` shift by one, so checkpoints from
    /// `index` on are invalidated.
    pub fn add_feature(
        &mut self,
        id: FeatureId,
        index: usize,
        deps: Vec<DeclaredDependency>,
    ) -> GraphResult<()> {
        if self.index_of.contains_key(&id) {
            return Err(GraphError::DuplicateFeature(id));
        }
        if index > self.order.len() {
            return Err(GraphError::IndexOutOfRange {
                index,
                len: self.order.len(),
            });
        }

        let mut order = self.order.clone();
        order.insert(index, id.clone());
        let mut declared = self.declared.clone();
        declared.insert(id.clone(), deps);

        self.commit(order, declared)?;
        self.invalidate_checkpoints_from(index);
        self.mark_dirty(&id)?;

        debug!(feature = %id, index, "Feature added to dependency graph");
        Ok(())
    }

    /// Remove a feature; dependencies other features declared on it are dropped
    pub fn remove_feature(&mut self, id: &FeatureId) -> GraphResult<()> {
        let index = self.index_result(id)?;

        // Downstream of the removed feature must rebuild
        let affected = self.downstream_of(id);

        let mut order = self.order.clone();
        order.remove(index);
        let mut declared = self.declared.clone();
        declared.remove(id);
        for deps in declared.values_mut() {
            deps.retain(|d| &d.upstream != id);
        }

        self.commit(order, declared)?;
        self.dirty.remove(id);
        self.invalidate_checkpoints_from(index);
        for feature in affected {
            self.mark_dirty(&feature)?;
        }

        debug!(feature = %id, index, "Feature removed from dependency graph");
        Ok(())
    }

    /// Replace the explicit dependencies of an existing feature
    pub fn set_dependencies(
        &mut self,
        id: &FeatureId,
        deps: Vec<DeclaredDependency>,
    ) -> GraphResult<()> {
        let index = self.index_result(id)?;
        if self.declared_dependencies(id) == deps.as_slice() {
            return Ok(());
        }

        let mut declared = self.declared.clone();
        declared.insert(id.clone(), deps);
        self.commit(self.order.clone(), declared)?;
        self.invalidate_checkpoints_from(index);
        self.mark_dirty(id)?;
        Ok(())
    }

    /// Replace the whole feature list (reorder, undo to another history).
    ///
    /// Checkpoints are discarded, not invalidated; every feature is dirty.
    pub fn rebuild_feature_index(
        &mut self,
        features: Vec<(FeatureId, Vec<DeclaredDependency>)>,
    ) -> GraphResult<()> {
        let mut seen = HashSet::new();
        let mut order = Vec::with_capacity(features.len());
        let mut declared = HashMap::with_capacity(features.len());
        for (id, deps) in features {
            if !seen.insert(id.clone()) {
                return Err(GraphError::DuplicateFeature(id));
            }
            order.push(id.clone());
            declared.insert(id, deps);
        }

        self.commit(order, declared)?;
        self.discard_checkpoints();
        self.dirty = self.order.iter().cloned().collect();

        debug!(features = self.order.len(), "Dependency graph rebuilt");
        Ok(())
    }

    /// Validate and swap in a new structure; on error nothing changes
    fn commit(
        &mut self,
        order: Vec<FeatureId>,
        declared: HashMap<FeatureId, Vec<DeclaredDependency>>,
    ) -> GraphResult<()> {
        let index_of: HashMap<FeatureId, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();
        let adjacency = build_adjacency(&order, &index_of, &declared)?;

        self.order = order;
        self.index_of = index_of;
        self.declared = declared;
        self.adjacency = adjacency;
        self.dirty.retain(|id| self.index_of.contains_key(id));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &FeatureId) -> bool {
        self.index_of.contains_key(id)
    }

    pub fn feature_at(&self, index: usize) -> Option<&FeatureId> {
        self.order.get(index)
    }

    pub fn index_of(&self, id: &FeatureId) -> Option<usize> {
        self.index_of.get(id).copied()
    }

    fn index_result(&self, id: &FeatureId) -> GraphResult<usize> {
        self.index_of(id)
            .ok_or_else(|| GraphError::UnknownFeature(id.clone()))
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.order
    }

    pub fn declared_dependencies(&self, id: &FeatureId) -> &[DeclaredDependency] {
        self.declared.get(id).map_or(&[], Vec::as_slice)
    }

    /// Direct dependencies of a feature (edges where it is the target)
    pub fn dependencies_of(&self, id: &FeatureId) -> &[FeatureDependency] {
        self.adjacency.forward.get(id).map_or(&[], Vec::as_slice)
    }

    /// Features that directly depend on `id`
    pub fn dependents_of(&self, id: &FeatureId) -> &[FeatureId] {
        self.adjacency.reverse.get(id).map_or(&[], Vec::as_slice)
    }

    /// All edges, in target order
    pub fn edges(&self) -> Vec<FeatureDependency> {
        self.order
            .iter()
            .flat_map(|id| self.dependencies_of(id).iter().cloned())
            .collect()
    }

    /// Every feature `id` depends on, directly or transitively, in index order
    pub fn upstream_of(&self, id: &FeatureId) -> Vec<FeatureId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            for dep in self.dependencies_of(&current) {
                if visited.insert(dep.source.clone()) {
                    queue.push_back(dep.source.clone());
                }
            }
        }

        self.sorted_by_index(visited)
    }

    /// Every feature that depends on `id`, directly or transitively, in index order
    pub fn downstream_of(&self, id: &FeatureId) -> Vec<FeatureId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([id.clone()]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents_of(&current) {
                if visited.insert(dependent.clone()) {
                    queue.push_back(dependent.clone());
                }
            }
        }

        self.sorted_by_index(visited)
    }

    /// Flag `id` and everything that transitively depends on it.
    ///
    /// Returns the newly and previously dirty features of the closure in
    /// index order.
    pub fn mark_dirty(&mut self, id: &FeatureId) -> GraphResult<Vec<FeatureId>> {
        self.index_result(id)?;

        let mut closure = self.downstream_of(id);
        closure.insert(0, id.clone());
        for feature in &closure {
            self.dirty.insert(feature.clone());
        }
        Ok(closure)
    }

    pub fn is_dirty(&self, id: &FeatureId) -> bool {
        self.dirty.contains(id)
    }

    pub fn dirty_features(&self) -> Vec<FeatureId> {
        self.sorted_by_index(self.dirty.iter().cloned())
    }

    pub fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    pub fn clear_dirty_feature(&mut self, id: &FeatureId) {
        self.dirty.remove(id);
    }

    /// Resume point for a rebuild triggered by a change to `changed_id`
    pub fn get_rebuild_start_index(&self, changed_id: &FeatureId) -> GraphResult<usize> {
        let changed = self.index_result(changed_id)?;
        Ok(self.rebuild_start_for_index(changed))
    }

    /// `max(valid checkpoint index < changed) + 1`, or 0
    pub fn rebuild_start_for_index(&self, changed: usize) -> usize {
        self.checkpoints
            .latest_valid_before(changed)
            .map_or(0, |cp| cp.feature_index + 1)
    }

    pub fn should_create_checkpoint(&self, index: usize) -> bool {
        (index + 1) % self.checkpoint_interval == 0
    }

    /// Record a checkpoint after `index`; only the geometry hash is kept
    pub fn create_checkpoint(&mut self, index: usize, feature_id: &FeatureId, solid: &Solid) {
        let checkpoint = RebuildCheckpoint::new(index, feature_id.clone(), solid);
        debug!(
            index,
            feature = %feature_id,
            digest = %checkpoint.geometry_hash.digest,
            "Checkpoint created"
        );
        self.checkpoints.save(checkpoint);
    }

    pub fn invalidate_checkpoints_from(&mut self, index: usize) {
        let flipped = self.checkpoints.invalidate_from(index);
        if flipped > 0 {
            debug!(index, invalidated = flipped, "Checkpoints invalidated");
        }
    }

    /// Drop the whole checkpoint cache
    pub fn discard_checkpoints(&mut self) {
        if !self.checkpoints.is_empty() {
            debug!(discarded = self.checkpoints.len(), "Checkpoints discarded");
        }
        self.checkpoints.clear();
    }

    pub fn checkpoint(&self, index: usize) -> Option<&RebuildCheckpoint> {
        self.checkpoints.get(index)
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    fn sorted_by_index(&self, ids: impl IntoIterator<Item = FeatureId>) -> Vec<FeatureId> {
        let mut ids: Vec<FeatureId> = ids.into_iter().collect();
        ids.sort_by_key(|id| self.index_of.get(id).copied().unwrap_or(usize::MAX));
        ids
    }
}

fn build_adjacency(
    order: &[FeatureId],
    index_of: &HashMap<FeatureId, usize>,
    declared: &HashMap<FeatureId, Vec<DeclaredDependency>>,
) -> GraphResult<Adjacency> {
    let mut adjacency = Adjacency::default();
    let mut graph: DiGraph<&FeatureId, DependencyKind> = DiGraph::with_capacity(order.len(), 0);
    let nodes: Vec<_> = order.iter().map(|id| graph.add_node(id)).collect();

    for (index, id) in order.iter().enumerate() {
        let mut edges = Vec::new();
        if index > 0 {
            edges.push(FeatureDependency {
                source: order[index - 1].clone(),
                target: id.clone(),
                kind: DependencyKind::Sequential,
            });
        }

        for dep in declared.get(id).into_iter().flatten() {
            let upstream = *index_of
                .get(&dep.upstream)
                .ok_or_else(|| GraphError::UnknownDependency {
                    feature: id.clone(),
                    upstream: dep.upstream.clone(),
                })?;
            if upstream >= index {
                return Err(GraphError::ForwardReference {
                    feature: id.clone(),
                    upstream: dep.upstream.clone(),
                });
            }
            let edge = FeatureDependency {
                source: dep.upstream.clone(),
                target: id.clone(),
                kind: dep.kind,
            };
            if !edges.contains(&edge) {
                edges.push(edge);
            }
        }

        for edge in &edges {
            let source = index_of[&edge.source];
            graph.add_edge(nodes[source], nodes[index], edge.kind);
            let dependents = adjacency.reverse.entry(edge.source.clone()).or_default();
            if !dependents.contains(id) {
                dependents.push(id.clone());
            }
        }
        adjacency.forward.insert(id.clone(), edges);
    }

    toposort(&graph, None).map_err(|cycle| GraphError::Cycle {
        feature: graph[cycle.node_id()].clone(),
    })?;

    Ok(adjacency)
}
