//! Analytic test kernel
//!
//! Axis-aligned blocks with exact volumes, plus fillet / pad / hole features
//! that report generated shapes and shape history like a real kernel adapter.

#![allow(dead_code)]

use shapegraph_core::dependency_graph::{DeclaredDependency, DependencyKind};
use shapegraph_core::kernel::{
    BoundingBox, CurveKind, EdgeGeom, FaceGeom, Point3, SurfaceKind, Vec3, VertexGeom,
};
use shapegraph_core::{
    Body, EngineConfig, Feature, FeatureId, FeatureOutput, GeometryHandle, OpFailure, OpResult,
    ResolvedRefs, ShapeId, ShapeType, Solid, SolidRef, TopoId,
};
use std::f64::consts::PI;

pub const EPS: f64 = 1e-9;

/// Faces, edges and vertices of one axis-aligned block
pub struct BlockTopology {
    pub faces: Vec<FaceGeom>,
    pub edges: Vec<EdgeGeom>,
    pub vertices: Vec<VertexGeom>,
}

/// Face order: bottom, top, front (-y), back (+y), left (-x), right (+x).
/// Edges 0..4 are the bottom ring, 4..8 the top ring, 8..12 the verticals.
pub fn block(min: Point3, size: Vec3) -> BlockTopology {
    let max = min.add(&size);
    let c = min.add(&size.scale(0.5));
    let (sx, sy, sz) = (size.x, size.y, size.z);

    let face = |center: Point3, normal: Vec3, area: f64| FaceGeom {
        id: TopoId::fresh(),
        surface: SurfaceKind::Plane,
        center,
        normal,
        area,
    };
    let faces = vec![
        face(Point3::new(c.x, c.y, min.z), Vec3::new(0.0, 0.0, -1.0), sx * sy),
        face(Point3::new(c.x, c.y, max.z), Vec3::new(0.0, 0.0, 1.0), sx * sy),
        face(Point3::new(c.x, min.y, c.z), Vec3::new(0.0, -1.0, 0.0), sx * sz),
        face(Point3::new(c.x, max.y, c.z), Vec3::new(0.0, 1.0, 0.0), sx * sz),
        face(Point3::new(min.x, c.y, c.z), Vec3::new(-1.0, 0.0, 0.0), sy * sz),
        face(Point3::new(max.x, c.y, c.z), Vec3::new(1.0, 0.0, 0.0), sy * sz),
    ];

    let edge = |center: Point3, direction: Vec3, length: f64| EdgeGeom {
        id: TopoId::fresh(),
        curve: CurveKind::Line,
        center,
        direction,
        length,
    };
    let x = Vec3::new(1.0, 0.0, 0.0);
    let y = Vec3::new(0.0, 1.0, 0.0);
    let z = Vec3::new(0.0, 0.0, 1.0);
    let mut edges = Vec::with_capacity(12);
    for level in [min.z, max.z] {
        edges.push(edge(Point3::new(c.x, min.y, level), x, sx));
        edges.push(edge(Point3::new(c.x, max.y, level), x, sx));
        edges.push(edge(Point3::new(min.x, c.y, level), y, sy));
        edges.push(edge(Point3::new(max.x, c.y, level), y, sy));
    }
    for (px, py) in [(min.x, min.y), (max.x, min.y), (min.x, max.y), (max.x, max.y)] {
        edges.push(edge(Point3::new(px, py, c.z), z, sz));
    }

    let mut vertices = Vec::with_capacity(8);
    for pz in [min.z, max.z] {
        for (px, py) in [(min.x, min.y), (max.x, min.y), (min.x, max.y), (max.x, max.y)] {
            vertices.push(VertexGeom {
                id: TopoId::fresh(),
                point: Point3::new(px, py, pz),
            });
        }
    }

    BlockTopology {
        faces,
        edges,
        vertices,
    }
}

fn topo_ids(topology: &BlockTopology) -> Vec<TopoId> {
    topology
        .faces
        .iter()
        .map(|f| f.id)
        .chain(topology.edges.iter().map(|e| e.id))
        .chain(topology.vertices.iter().map(|v| v.id))
        .collect()
}

/// Copy of `input` with extra volume and sub-shapes
fn extend(
    input: &Solid,
    volume_delta: f64,
    bbox: BoundingBox,
    faces: Vec<FaceGeom>,
    edges: Vec<EdgeGeom>,
    vertices: Vec<VertexGeom>,
    drop_edges: &[TopoId],
) -> Solid {
    let mut all_faces = input.faces().to_vec();
    all_faces.extend(faces);
    let mut all_edges: Vec<EdgeGeom> = input
        .edges()
        .iter()
        .filter(|e| !drop_edges.contains(&e.id))
        .cloned()
        .collect();
    all_edges.extend(edges);
    let mut all_vertices = input.vertices().to_vec();
    all_vertices.extend(vertices);

    Solid::new(
        input.volume() + volume_delta,
        bbox.center(),
        bbox,
        all_faces,
        all_edges,
        all_vertices,
    )
}

// ═══════════════════════════════════════════════════════════════════════════
// Features
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct BoxFeature {
    pub id: FeatureId,
    pub size: Vec3,
}

impl BoxFeature {
    pub fn new(id: &str, x: f64, y: f64, z: f64) -> Self {
        Self {
            id: FeatureId::new(id),
            size: Vec3::new(x, y, z),
        }
    }
}

impl Feature for BoxFeature {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    fn class_name(&self) -> &'static str {
        "Box"
    }

    fn operation(&self) -> &'static str {
        "box"
    }

    fn execute(&self, _input: &SolidRef, _refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        if self.size.x <= 0.0 || self.size.y <= 0.0 || self.size.z <= 0.0 {
            return Err(OpFailure::operation("box dimensions must be positive"));
        }
        let topology = block(Point3::zero(), self.size);
        let generated = topo_ids(&topology);
        let bbox = BoundingBox::new(Point3::zero(), self.size);
        let solid = Solid::new(
            self.size.x * self.size.y * self.size.z,
            bbox.center(),
            bbox,
            topology.faces,
            topology.edges,
            topology.vertices,
        );
        Ok(FeatureOutput::new(solid).with_generated(generated))
    }
}

/// Rounds referenced edges; radius must stay below half the smallest extent
#[derive(Debug, Clone)]
pub struct Fillet {
    pub id: FeatureId,
    pub radius: f64,
    pub edges: Vec<ShapeId>,
}

impl Fillet {
    pub fn new(id: &str, radius: f64, edges: Vec<ShapeId>) -> Self {
        Self {
            id: FeatureId::new(id),
            radius,
            edges,
        }
    }

    /// Volume removed from a straight edge of `length`
    pub fn removed_volume(radius: f64, length: f64) -> f64 {
        (1.0 - PI / 4.0) * radius * radius * length
    }
}

impl Feature for Fillet {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    fn class_name(&self) -> &'static str {
        "Fillet"
    }

    fn operation(&self) -> &'static str {
        "fillet"
    }

    fn declared_dependencies(&self) -> Vec<DeclaredDependency> {
        owners(&self.edges, DependencyKind::EdgeReference)
    }

    fn references(&self) -> Vec<ShapeId> {
        self.edges.clone()
    }

    fn execute(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        let size = input.bbox().size();
        let limit = size.x.min(size.y).min(size.z) / 2.0;
        if self.radius <= 0.0 || self.radius >= limit {
            return Err(OpFailure::operation(format!(
                "fillet radius {} outside (0, {limit})",
                self.radius
            )));
        }

        let mut removed = 0.0;
        let mut faces = Vec::new();
        let mut edges = Vec::new();
        let mut output = FeatureOutput::new(Solid::empty());
        for handle in &refs.handles {
            let GeometryHandle::Edge(edge) = handle else {
                return Err(OpFailure::operation("fillet references must be edges"));
            };
            removed += Self::removed_volume(self.radius, edge.length);

            let face = FaceGeom {
                id: TopoId::fresh(),
                surface: SurfaceKind::Cylinder,
                center: edge.center,
                normal: Vec3::new(0.0, 0.0, -1.0),
                area: PI / 2.0 * self.radius * edge.length,
            };
            let rims: Vec<EdgeGeom> = [-1.0, 1.0]
                .iter()
                .map(|side| EdgeGeom {
                    id: TopoId::fresh(),
                    curve: CurveKind::Line,
                    center: edge.center.add(&Vec3::new(0.0, 0.0, side * self.radius)),
                    direction: edge.direction,
                    length: edge.length,
                })
                .collect();

            let mut produced = vec![face.id];
            produced.extend(rims.iter().map(|r| r.id));
            output = output.with_history("fillet", vec![edge.id], produced);
            faces.push(face);
            edges.extend(rims);
        }

        let generated: Vec<TopoId> = faces
            .iter()
            .map(|f| f.id)
            .chain(edges.iter().map(|e| e.id))
            .collect();
        let consumed = refs.topo_ids();
        let solid = extend(input, -removed, input.bbox(), faces, edges, Vec::new(), &consumed);

        Ok(FeatureOutput {
            solid: solid.into_ref(),
            generated,
            history: output.history,
        })
    }
}

/// Block of `height` on an upward planar face, half the face's side wide
#[derive(Debug, Clone)]
pub struct Pad {
    pub id: FeatureId,
    pub height: f64,
    pub face: ShapeId,
}

impl Pad {
    pub fn new(id: &str, height: f64, face: ShapeId) -> Self {
        Self {
            id: FeatureId::new(id),
            height,
            face,
        }
    }
}

impl Feature for Pad {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    fn class_name(&self) -> &'static str {
        "Pad"
    }

    fn operation(&self) -> &'static str {
        "pad"
    }

    fn declared_dependencies(&self) -> Vec<DeclaredDependency> {
        owners(std::slice::from_ref(&self.face), DependencyKind::FaceReference)
    }

    fn references(&self) -> Vec<ShapeId> {
        vec![self.face.clone()]
    }

    fn execute(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        let Some(GeometryHandle::Face(face)) = refs.handles.first() else {
            return Err(OpFailure::operation("pad needs a sketch face"));
        };
        if face.normal.z < 1.0 - EPS {
            return Err(OpFailure::operation("pad requires an upward planar face"));
        }
        if self.height <= 0.0 {
            return Err(OpFailure::operation("pad height must be positive"));
        }

        let side = face.area.sqrt() / 2.0;
        let min = Point3::new(face.center.x - side / 2.0, face.center.y - side / 2.0, face.center.z);
        let size = Vec3::new(side, side, self.height);
        let mut topology = block(min, size);
        // Bottom face merges with the sketch face
        topology.faces.remove(0);

        let generated = topo_ids(&topology);
        let bbox = input.bbox().union(&BoundingBox::new(min, min.add(&size)));
        let solid = extend(
            input,
            side * side * self.height,
            bbox,
            topology.faces,
            topology.edges,
            topology.vertices,
            &[],
        );
        Ok(FeatureOutput::new(solid)
            .with_generated(generated.clone())
            .with_history("pad", vec![face.id], generated))
    }
}

/// Cylindrical hole into a horizontal face.
///
/// With `kernel_available == false` the primary path reports a missing
/// kernel entry point and the fallback computes the same cut.
#[derive(Debug, Clone)]
pub struct Hole {
    pub id: FeatureId,
    pub diameter: f64,
    pub depth: f64,
    pub face: ShapeId,
    pub kernel_available: bool,
}

impl Hole {
    pub fn new(id: &str, diameter: f64, depth: f64, face: ShapeId) -> Self {
        Self {
            id: FeatureId::new(id),
            diameter,
            depth,
            face,
            kernel_available: true,
        }
    }

    pub fn without_kernel(mut self) -> Self {
        self.kernel_available = false;
        self
    }

    fn cut(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        let Some(GeometryHandle::Face(face)) = refs.handles.first() else {
            return Err(OpFailure::operation("hole needs a placement face"));
        };
        let extent = input.bbox().size();
        if self.depth <= 0.0 || self.depth > extent.z + EPS {
            return Err(OpFailure::operation("hole depth outside the part"));
        }
        let radius = self.diameter / 2.0;
        let down = if face.normal.z > 0.0 { -1.0 } else { 1.0 };

        let wall = FaceGeom {
            id: TopoId::fresh(),
            surface: SurfaceKind::Cylinder,
            center: face.center.add(&Vec3::new(0.0, 0.0, down * self.depth / 2.0)),
            normal: Vec3::new(1.0, 0.0, 0.0),
            area: 2.0 * PI * radius * self.depth,
        };
        let rims: Vec<EdgeGeom> = [0.0, self.depth]
            .iter()
            .map(|offset| EdgeGeom {
                id: TopoId::fresh(),
                curve: CurveKind::Circle,
                center: face.center.add(&Vec3::new(0.0, 0.0, down * offset)),
                direction: Vec3::new(0.0, 0.0, 1.0),
                length: 2.0 * PI * radius,
            })
            .collect();

        let mut generated = vec![wall.id];
        generated.extend(rims.iter().map(|r| r.id));
        let solid = extend(
            input,
            -PI * radius * radius * self.depth,
            input.bbox(),
            vec![wall],
            rims,
            Vec::new(),
            &[],
        );
        Ok(FeatureOutput::new(solid)
            .with_generated(generated.clone())
            .with_history("hole", vec![face.id], generated))
    }
}

impl Feature for Hole {
    fn id(&self) -> &FeatureId {
        &self.id
    }

    fn class_name(&self) -> &'static str {
        "Hole"
    }

    fn operation(&self) -> &'static str {
        "hole"
    }

    fn declared_dependencies(&self) -> Vec<DeclaredDependency> {
        owners(std::slice::from_ref(&self.face), DependencyKind::FaceReference)
    }

    fn references(&self) -> Vec<ShapeId> {
        vec![self.face.clone()]
    }

    fn execute(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        if !self.kernel_available {
            return Err(OpFailure::kernel_unavailable(
                "BRepPrimAPI_MakeCylinder",
                "not exported by this kernel build",
            ));
        }
        self.cut(input, refs)
    }

    fn has_fallback(&self) -> bool {
        true
    }

    fn fallback(&self, input: &SolidRef, refs: &ResolvedRefs) -> OpResult<FeatureOutput> {
        self.cut(input, refs)
    }
}

/// One explicit dependency per distinct owning feature
fn owners(refs: &[ShapeId], kind: DependencyKind) -> Vec<DeclaredDependency> {
    let mut deps: Vec<DeclaredDependency> = Vec::new();
    for shape in refs {
        if !deps.iter().any(|d| d.upstream == shape.feature_id) {
            deps.push(DeclaredDependency::new(shape.feature_id.clone(), kind));
        }
    }
    deps
}

// ═══════════════════════════════════════════════════════════════════════════
// Builders
// ═══════════════════════════════════════════════════════════════════════════

pub fn body(config: EngineConfig) -> Body {
    Body::new(config).expect("valid config")
}

/// Shape ids a feature registered, of one type, by local index
pub fn shape_ids(body: &Body, feature: &str, shape_type: ShapeType) -> Vec<ShapeId> {
    body.registry()
        .shapes_of_feature(&FeatureId::new(feature))
        .into_iter()
        .filter(|id| id.shape_type == shape_type)
        .cloned()
        .collect()
}

/// Top face of a box feature
pub fn top_face(body: &Body, feature: &str) -> ShapeId {
    shape_ids(body, feature, ShapeType::Face)[1].clone()
}

/// (volume, faces, edges, bbox) of a solid
pub fn metrics(solid: &Solid) -> (f64, usize, usize, BoundingBox) {
    (solid.volume(), solid.face_count(), solid.edge_count(), solid.bbox())
}

pub fn assert_close(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-6, "{a} != {b}");
}
