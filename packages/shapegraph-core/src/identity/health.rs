//! Reference health report (read-only diagnostics)

use crate::envelope::ErrorCode;
use crate::feature::FeatureId;
use crate::kernel::ShapeType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How one reference was resolved in the latest pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
    History,
    Drift,
    Fallback,
    LocalIndex,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefHealth {
    pub shape_uuid: Uuid,
    pub shape_type: ShapeType,
    /// Feature that produced the referenced shape
    pub source_feature: FeatureId,
    pub local_index: usize,
    pub method: ResolutionMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureHealth {
    pub ok: usize,
    pub fallback: usize,
    pub broken: usize,
    pub refs: Vec<RefHealth>,
}

impl FeatureHealth {
    pub(crate) fn record(&mut self, entry: RefHealth) {
        match entry.method {
            ResolutionMethod::History | ResolutionMethod::Drift => self.ok += 1,
            ResolutionMethod::Fallback | ResolutionMethod::LocalIndex => self.fallback += 1,
            ResolutionMethod::Failed => self.broken += 1,
        }
        self.refs.push(entry);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub features: BTreeMap<FeatureId, FeatureHealth>,
    pub total_ok: usize,
    pub total_fallback: usize,
    pub total_broken: usize,
}

impl HealthReport {
    pub(crate) fn from_features(features: BTreeMap<FeatureId, FeatureHealth>) -> Self {
        let (total_ok, total_fallback, total_broken) =
            features.values().fold((0, 0, 0), |(ok, fb, br), h| {
                (ok + h.ok, fb + h.fallback, br + h.broken)
            });
        Self {
            features,
            total_ok,
            total_fallback,
            total_broken,
        }
    }

    /// No reference needed a fallback tier or failed
    pub fn is_healthy(&self) -> bool {
        self.total_fallback == 0 && self.total_broken == 0
    }

    pub fn broken_features(&self) -> Vec<&FeatureId> {
        self.features
            .iter()
            .filter(|(_, h)| h.broken > 0)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(method: ResolutionMethod) -> RefHealth {
        RefHealth {
            shape_uuid: Uuid::new_v4(),
            shape_type: ShapeType::Edge,
            source_feature: FeatureId::new("box"),
            local_index: 0,
            method,
            code: None,
        }
    }

    #[test]
    fn test_totals() {
        let mut fillet = FeatureHealth::default();
        fillet.record(entry(ResolutionMethod::History));
        fillet.record(entry(ResolutionMethod::Drift));
        fillet.record(entry(ResolutionMethod::LocalIndex));

        let mut hole = FeatureHealth::default();
        hole.record(entry(ResolutionMethod::Failed));

        let report = HealthReport::from_features(BTreeMap::from([
            (FeatureId::new("fillet"), fillet),
            (FeatureId::new("hole"), hole),
        ]));

        assert_eq!(
            (report.total_ok, report.total_fallback, report.total_broken),
            (2, 1, 1)
        );
        assert!(!report.is_healthy());
        assert_eq!(report.broken_features(), vec![&FeatureId::new("hole")]);
    }

    #[test]
    fn test_serializes_method_names() {
        let value = serde_json::to_value(entry(ResolutionMethod::LocalIndex)).unwrap();
        assert_eq!(value["method"], "local_index");
        assert!(value.get("code").is_none());
    }
}
