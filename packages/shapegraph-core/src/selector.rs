//! Geometric selector
//!
//! Last-resort matcher: finds the live sub-shape that looks most like a
//! remembered one (center, orientation, size). It knows nothing about
//! history, so on symmetric parts it can pick the mirror twin. Callers treat
//! a selector hit as a recoverable warning, never as a clean resolution.

use crate::config::SelectorConfig;
use crate::identity::GeometryFingerprint;
use crate::kernel::{
    CurveKind, EdgeGeom, FaceGeom, GeometryHandle, Point3, ShapeType, SurfaceKind, Vec3,
    VertexGeom,
};

#[derive(Debug, Clone, PartialEq)]
pub struct FaceSelector {
    pub center: Point3,
    pub normal: Vec3,
    pub area: f64,
    pub surface_type: Option<SurfaceKind>,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeSelector {
    pub center: Point3,
    pub direction: Vec3,
    pub length: f64,
    pub curve_type: Option<CurveKind>,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VertexSelector {
    pub point: Point3,
    pub tolerance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selector {
    Face(FaceSelector),
    Edge(EdgeSelector),
    Vertex(VertexSelector),
}

impl Selector {
    pub fn shape_type(&self) -> ShapeType {
        match self {
            Selector::Face(_) => ShapeType::Face,
            Selector::Edge(_) => ShapeType::Edge,
            Selector::Vertex(_) => ShapeType::Vertex,
        }
    }

    fn tolerance(&self) -> f64 {
        match self {
            Selector::Face(s) => s.tolerance,
            Selector::Edge(s) => s.tolerance,
            Selector::Vertex(s) => s.tolerance,
        }
    }
}

/// Best candidate and its score (lower is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct SelectorMatch {
    pub handle: GeometryHandle,
    pub score: f64,
}

/// Stateless scorer; holds only the weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeometricSelector {
    config: SelectorConfig,
}

impl GeometricSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn from_face(&self, face: &FaceGeom) -> FaceSelector {
        FaceSelector {
            center: face.center,
            normal: face.normal,
            area: face.area,
            surface_type: Some(face.surface),
            tolerance: self.config.tolerance,
        }
    }

    pub fn from_edge(&self, edge: &EdgeGeom) -> EdgeSelector {
        EdgeSelector {
            center: edge.center,
            direction: edge.direction,
            length: edge.length,
            curve_type: Some(edge.curve),
            tolerance: self.config.tolerance,
        }
    }

    pub fn from_vertex(&self, vertex: &VertexGeom) -> VertexSelector {
        VertexSelector {
            point: vertex.point,
            tolerance: self.config.tolerance,
        }
    }

    /// Selector rebuilt from a registration-time fingerprint
    pub fn from_fingerprint(
        &self,
        shape_type: ShapeType,
        fingerprint: &GeometryFingerprint,
    ) -> Selector {
        match shape_type {
            ShapeType::Face => Selector::Face(FaceSelector {
                center: fingerprint.center,
                normal: fingerprint.normal.unwrap_or_default(),
                area: fingerprint.area.unwrap_or(0.0),
                surface_type: fingerprint.surface,
                tolerance: self.config.tolerance,
            }),
            ShapeType::Edge => Selector::Edge(EdgeSelector {
                center: fingerprint.center,
                direction: fingerprint.direction.unwrap_or_default(),
                length: fingerprint.length.unwrap_or(0.0),
                curve_type: fingerprint.curve,
                tolerance: self.config.tolerance,
            }),
            ShapeType::Vertex => Selector::Vertex(VertexSelector {
                point: fingerprint.center,
                tolerance: self.config.tolerance,
            }),
        }
    }

    /// Score of one candidate, `None` when its type is incompatible
    pub fn score(&self, selector: &Selector, candidate: &GeometryHandle) -> Option<f64> {
        let w = &self.config;
        match (selector, candidate) {
            (Selector::Face(s), GeometryHandle::Face(f)) => {
                if s.surface_type.is_some_and(|kind| kind != f.surface) {
                    return None;
                }
                Some(
                    w.center_weight * s.center.distance(&f.center)
                        + w.alignment_weight * orientation_mismatch(&s.normal, &f.normal)
                        + w.size_weight * size_mismatch(s.area, f.area),
                )
            }
            (Selector::Edge(s), GeometryHandle::Edge(e)) => {
                if s.curve_type.is_some_and(|kind| kind != e.curve) {
                    return None;
                }
                Some(
                    w.center_weight * s.center.distance(&e.center)
                        + w.alignment_weight * misalignment(&s.direction, &e.direction)
                        + w.size_weight * size_mismatch(s.length, e.length),
                )
            }
            (Selector::Vertex(s), GeometryHandle::Vertex(v)) => {
                Some(w.center_weight * s.point.distance(&v.point))
            }
            _ => None,
        }
    }

    /// Closest compatible candidate within tolerance.
    ///
    /// Ties keep the earliest candidate so results are deterministic.
    pub fn best_match(
        &self,
        selector: &Selector,
        candidates: &[GeometryHandle],
    ) -> Option<SelectorMatch> {
        let mut best: Option<SelectorMatch> = None;
        for candidate in candidates {
            let Some(score) = self.score(selector, candidate) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| score < b.score) {
                best = Some(SelectorMatch {
                    handle: candidate.clone(),
                    score,
                });
            }
        }
        best.filter(|m| m.score <= selector.tolerance())
    }

    /// Best candidate regardless of tolerance (diagnostics)
    pub fn closest(
        &self,
        selector: &Selector,
        candidates: &[GeometryHandle],
    ) -> Option<SelectorMatch> {
        let relaxed = match selector.clone() {
            Selector::Face(s) => Selector::Face(FaceSelector {
                tolerance: f64::INFINITY,
                ..s
            }),
            Selector::Edge(s) => Selector::Edge(EdgeSelector {
                tolerance: f64::INFINITY,
                ..s
            }),
            Selector::Vertex(s) => Selector::Vertex(VertexSelector {
                tolerance: f64::INFINITY,
                ..s
            }),
        };
        self.best_match(&relaxed, candidates)
    }
}

/// `1 - |cos θ|`; orientation sign is ignored, unknown orientation scores 1
/// Face normals are oriented: 0 for the same side, 2 for the opposite one
fn orientation_mismatch(a: &Vec3, b: &Vec3) -> f64 {
    match (a.normalized(), b.normalized()) {
        (Some(a), Some(b)) => 1.0 - a.dot(&b).clamp(-1.0, 1.0),
        (None, None) => 0.0,
        _ => 1.0,
    }
}

/// Edge directions are not: reversed edges are still aligned
fn misalignment(a: &Vec3, b: &Vec3) -> f64 {
    match (a.normalized(), b.normalized()) {
        (Some(a), Some(b)) => 1.0 - a.dot(&b).abs().min(1.0),
        (None, None) => 0.0,
        _ => 1.0,
    }
}

/// `1 - min/max`
fn size_mismatch(a: f64, b: f64) -> f64 {
    let (lo, hi) = (a.abs().min(b.abs()), a.abs().max(b.abs()));
    if hi <= f64::EPSILON {
        0.0
    } else {
        1.0 - lo / hi
    }
}
