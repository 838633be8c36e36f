//! Persistent shape identity

use crate::feature::FeatureId;
use crate::kernel::{CurveKind, GeometryHandle, Point3, ShapeType, SurfaceKind, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Geometry captured when a shape is first registered.
///
/// Used only by the fallback and drift checks, never for equality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFingerprint {
    pub center: Point3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Vec3>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<SurfaceKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<CurveKind>,
}

impl GeometryFingerprint {
    pub fn point(center: Point3) -> Self {
        Self {
            center,
            area: None,
            normal: None,
            direction: None,
            length: None,
            surface: None,
            curve: None,
        }
    }

    /// Fingerprint of a live handle
    pub fn of(handle: &GeometryHandle) -> Self {
        match handle {
            GeometryHandle::Face(f) => Self {
                area: Some(f.area),
                normal: Some(f.normal),
                surface: Some(f.surface),
                ..Self::point(f.center)
            },
            GeometryHandle::Edge(e) => Self {
                direction: Some(e.direction),
                length: Some(e.length),
                curve: Some(e.curve),
                ..Self::point(e.center)
            },
            GeometryHandle::Vertex(v) => Self::point(v.point),
        }
    }

    /// Center displacement plus relative size change
    pub fn distance(&self, other: &GeometryFingerprint) -> f64 {
        let center = self.center.distance(&other.center);
        let size = match (self.size(), other.size()) {
            (Some(a), Some(b)) => relative_delta(a, b),
            _ => 0.0,
        };
        center + size
    }

    fn size(&self) -> Option<f64> {
        self.area.or(self.length)
    }
}

pub(crate) fn relative_delta(a: f64, b: f64) -> f64 {
    let max = a.abs().max(b.abs());
    if max <= f64::EPSILON {
        0.0
    } else {
        (a - b).abs() / max
    }
}

/// Stable, globally unique shape identity.
///
/// Issued once per distinct output shape of a feature and never mutated;
/// only garbage-collected with its owning feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapeId {
    pub uuid: Uuid,
    pub shape_type: ShapeType,
    pub feature_id: FeatureId,
    pub local_index: usize,
    pub geometry_fingerprint: GeometryFingerprint,
}

impl ShapeId {
    pub fn new(
        shape_type: ShapeType,
        feature_id: FeatureId,
        local_index: usize,
        geometry_fingerprint: GeometryFingerprint,
    ) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            shape_type,
            feature_id,
            local_index,
            geometry_fingerprint,
        }
    }

    /// Key that identifies "the same output" across rebuild generations
    pub fn slot(&self) -> ShapeSlot {
        ShapeSlot {
            feature_id: self.feature_id.clone(),
            shape_type: self.shape_type,
            local_index: self.local_index,
        }
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}:{}#{}]",
            self.uuid, self.feature_id, self.shape_type, self.local_index
        )
    }
}

/// (feature, type, local index) triple a feature registers its outputs under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShapeSlot {
    pub feature_id: FeatureId,
    pub shape_type: ShapeType,
    pub local_index: usize,
}
