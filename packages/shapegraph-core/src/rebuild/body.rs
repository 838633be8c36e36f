//! Body: one feature history and its committed solid
//!
//! Structural edits (insert, remove, update, wholesale replace) only record
//! what changed; the geometry is recomputed by the rebuild pass in
//! `engine.rs`. Background consumers read the committed solid through a
//! [`CommittedSolidReader`], which always yields either the previous or the
//! next committed solid, never a mid-rebuild value.

use super::finalize::{Finalizer, ValidityCheck};
use super::report::BodyStats;
use crate::config::{EngineConfig, Validatable};
use crate::dependency_graph::DependencyGraph;
use crate::error::{RebuildError, Result};
use crate::feature::{Feature, FeatureId, FeatureStatus};
use crate::identity::{HealthReport, IdentityRegistry, RegistrySnapshot};
use crate::kernel::{Solid, SolidRef};
use arc_swap::ArcSwap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Cloneable, thread-safe view of a body's committed solid
#[derive(Clone)]
pub struct CommittedSolidReader {
    inner: Arc<ArcSwap<Solid>>,
}

impl CommittedSolidReader {
    pub fn load(&self) -> SolidRef {
        self.inner.load_full()
    }
}

impl fmt::Debug for CommittedSolidReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommittedSolidReader")
            .field("volume", &self.inner.load().volume())
            .finish()
    }
}

pub struct Body {
    pub(super) config: EngineConfig,
    pub(super) features: Vec<Box<dyn Feature>>,
    pub(super) statuses: HashMap<FeatureId, FeatureStatus>,
    /// Materialized output of each feature from its latest execution
    pub(super) outputs: Vec<Option<SolidRef>>,
    pub(super) registry: IdentityRegistry,
    pub(super) graph: DependencyGraph,
    pub(super) committed: Arc<ArcSwap<Solid>>,
    pub(super) finalizer: Box<dyn Finalizer>,
    pub(super) stats: BodyStats,
    /// Lowest feature index changed since the last pass
    pub(super) pending_from: Option<usize>,
    /// Input of feature 0
    pub(super) base: SolidRef,
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("features", &self.feature_ids())
            .field("pending_from", &self.pending_from)
            .field("committed_volume", &self.committed.load().volume())
            .finish()
    }
}

impl Body {
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;

        let base = Solid::empty().into_ref();
        Ok(Self {
            registry: IdentityRegistry::with_config(&config),
            graph: DependencyGraph::new(config.checkpoint_interval),
            committed: Arc::new(ArcSwap::new(Arc::clone(&base))),
            config,
            features: Vec::new(),
            statuses: HashMap::new(),
            outputs: Vec::new(),
            finalizer: Box::new(ValidityCheck),
            stats: BodyStats::default(),
            pending_from: None,
            base,
        })
    }

    pub fn with_finalizer(mut self, finalizer: impl Finalizer + 'static) -> Self {
        self.finalizer = Box::new(finalizer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Swap the configuration; the next pass recomputes every feature
    pub fn apply_config(&mut self, config: EngineConfig) -> Result<()> {
        config.validate()?;
        self.registry.apply_config(&config);
        self.graph.set_checkpoint_interval(config.checkpoint_interval);
        self.graph.discard_checkpoints();
        self.config = config;
        self.pending_from = Some(0);
        Ok(())
    }

    /// Append a feature at the end of the history
    pub fn add_feature(&mut self, feature: Box<dyn Feature>) -> Result<()> {
        self.insert_feature(self.features.len(), feature)
    }

    pub fn insert_feature(&mut self, index: usize, feature: Box<dyn Feature>) -> Result<()> {
        let id = feature.id().clone();
        self.graph
            .add_feature(id.clone(), index, feature.declared_dependencies())?;

        self.features.insert(index, feature);
        self.outputs.insert(index, None);
        self.statuses.insert(id.clone(), FeatureStatus::ok());
        self.note_change(index);

        debug!(feature = %id, index, "Feature inserted");
        Ok(())
    }

    /// Delete a feature and garbage-collect the shapes it owned
    pub fn remove_feature(&mut self, id: &FeatureId) -> Result<Box<dyn Feature>> {
        let index = self.index_of(id)?;
        self.graph.remove_feature(id)?;

        let feature = self.features.remove(index);
        self.outputs.remove(index);
        self.statuses.remove(id);
        self.registry.remove_feature_shapes(id);
        self.note_change(index);

        debug!(feature = %id, index, "Feature removed");
        Ok(feature)
    }

    /// Swap in an edited version of an existing feature (same id)
    pub fn update_feature(&mut self, feature: Box<dyn Feature>) -> Result<()> {
        let id = feature.id().clone();
        let index = self.index_of(&id)?;

        self.graph
            .set_dependencies(&id, feature.declared_dependencies())?;
        self.graph.mark_dirty(&id)?;
        self.graph.invalidate_checkpoints_from(index);

        self.features[index] = feature;
        self.note_change(index);

        debug!(feature = %id, index, "Feature updated");
        Ok(())
    }

    /// Replace the whole history (reorder, undo to a different structure).
    ///
    /// The checkpoint cache is discarded and the next pass starts at 0.
    pub fn replace_features(&mut self, features: Vec<Box<dyn Feature>>) -> Result<()> {
        self.graph.rebuild_feature_index(
            features
                .iter()
                .map(|f| (f.id().clone(), f.declared_dependencies()))
                .collect(),
        )?;

        let kept: HashMap<&FeatureId, ()> = features.iter().map(|f| (f.id(), ())).collect();
        for old in self.features.iter().map(|f| f.id().clone()) {
            if !kept.contains_key(&old) {
                self.registry.remove_feature_shapes(&old);
                self.statuses.remove(&old);
            }
        }
        for feature in &features {
            self.statuses
                .entry(feature.id().clone())
                .or_insert_with(FeatureStatus::ok);
        }

        self.outputs = vec![None; features.len()];
        self.features = features;
        self.pending_from = Some(0);

        debug!(features = self.features.len(), "Feature list replaced");
        Ok(())
    }

    fn note_change(&mut self, index: usize) {
        self.pending_from = Some(self.pending_from.map_or(index, |p| p.min(index)));
    }

    pub(super) fn index_of(&self, id: &FeatureId) -> Result<usize> {
        self.features
            .iter()
            .position(|f| f.id() == id)
            .ok_or_else(|| RebuildError::FeatureNotFound(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn feature(&self, id: &FeatureId) -> Option<&dyn Feature> {
        self.features
            .iter()
            .find(|f| f.id() == id)
            .map(|f| f.as_ref())
    }

    pub fn feature_ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|f| f.id().clone()).collect()
    }

    pub fn feature_status(&self, id: &FeatureId) -> Option<&FeatureStatus> {
        self.statuses.get(id)
    }

    /// Statuses in feature order
    pub fn statuses(&self) -> Vec<(FeatureId, FeatureStatus)> {
        self.features
            .iter()
            .map(|f| {
                let status = self.statuses.get(f.id()).cloned().unwrap_or_default();
                (f.id().clone(), status)
            })
            .collect()
    }

    /// Reinstate persisted statuses; unknown feature ids are ignored
    pub fn restore_statuses(&mut self, statuses: impl IntoIterator<Item = (FeatureId, FeatureStatus)>) {
        for (id, status) in statuses {
            if let Some(slot) = self.statuses.get_mut(&id) {
                *slot = status;
            }
        }
    }

    /// Solid currently visible to readers
    pub fn committed_solid(&self) -> SolidRef {
        self.committed.load_full()
    }

    pub fn reader(&self) -> CommittedSolidReader {
        CommittedSolidReader {
            inner: Arc::clone(&self.committed),
        }
    }

    /// Cached output of the feature at `index` from its latest execution
    pub fn output_at(&self, index: usize) -> Option<&SolidRef> {
        self.outputs.get(index).and_then(Option::as_ref)
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Load persisted identities; the next pass rebuilds from scratch
    pub fn restore_registry(&mut self, snapshot: RegistrySnapshot) -> Result<()> {
        self.registry.restore(snapshot)?;
        self.graph.discard_checkpoints();
        self.pending_from = Some(0);
        Ok(())
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn pending_from(&self) -> Option<usize> {
        self.pending_from
    }

    pub fn get_health_report(&self) -> HealthReport {
        self.registry.get_health_report()
    }

    pub fn get_stats(&self) -> BodyStats {
        BodyStats {
            checkpoints: self.graph.checkpoints().len(),
            valid_checkpoints: self.graph.checkpoints().valid_count(),
            registry: self.registry.get_stats(),
            ..self.stats.clone()
        }
    }
}
