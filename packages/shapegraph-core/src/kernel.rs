//! Geometry kernel boundary
//!
//! The B-Rep kernel (booleans, fillets, tessellation) lives outside this crate.
//! A kernel adapter turns each kernel result into an immutable [`Solid`]
//! snapshot: the sub-shapes it contains, their identity ([`TopoId`]) and the
//! handful of geometric queries the identity layer needs (center, normal or
//! direction, area or length, bounding box, volume).
//!
//! Identity of a whole solid is pointer identity of its [`SolidRef`]; two
//! rebuilds that happen to produce equal geometry are still different solids.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Kernel-side identity of a face, edge or vertex.
///
/// Only meaningful for the lifetime of the kernel result that produced it;
/// persisted references always go through `ShapeId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopoId(pub u64);

impl TopoId {
    /// Allocate a process-unique id (for adapters without native ids)
    pub fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        TopoId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for TopoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "topo#{}", self.0)
    }
}

/// Sub-shape type addressable by the identity registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShapeType {
    Face,
    Edge,
    Vertex,
}

impl ShapeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeType::Face => "FACE",
            ShapeType::Edge => "EDGE",
            ShapeType::Vertex => "VERTEX",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// 3D vector / point in model units
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

pub type Point3 = Vec3;

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub const fn zero() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    pub fn sub(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }

    pub fn scale(&self, factor: f64) -> Vec3 {
        Vec3::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn dot(&self, other: &Vec3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn length(&self) -> f64 {
        self.dot(self).sqrt()
    }

    pub fn distance(&self, other: &Vec3) -> f64 {
        self.sub(other).length()
    }

    /// Unit vector, `None` for a (near) zero vector
    pub fn normalized(&self) -> Option<Vec3> {
        let len = self.length();
        if len <= f64::EPSILON {
            None
        } else {
            Some(self.scale(1.0 / len))
        }
    }

    pub fn component_min(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    pub fn component_max(&self, other: &Vec3) -> Vec3 {
        Vec3::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3,
    pub max: Point3,
}

impl BoundingBox {
    pub fn new(min: Point3, max: Point3) -> Self {
        Self {
            min: min.component_min(&max),
            max: min.component_max(&max),
        }
    }

    pub fn size(&self) -> Vec3 {
        self.max.sub(&self.min)
    }

    pub fn diagonal(&self) -> f64 {
        self.size().length()
    }

    pub fn center(&self) -> Point3 {
        self.min.add(&self.max).scale(0.5)
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min: self.min.component_min(&other.min),
            max: self.max.component_max(&other.max),
        }
    }
}

/// Surface family of a face (selector compatibility check)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurfaceKind {
    Plane,
    Cylinder,
    Cone,
    Sphere,
    Torus,
    BSpline,
    Other,
}

/// Curve family of an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Line,
    Circle,
    Ellipse,
    BSpline,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceGeom {
    pub id: TopoId,
    pub surface: SurfaceKind,
    pub center: Point3,
    pub normal: Vec3,
    pub area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeGeom {
    pub id: TopoId,
    pub curve: CurveKind,
    pub center: Point3,
    pub direction: Vec3,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexGeom {
    pub id: TopoId,
    pub point: Point3,
}

/// Live geometry handle for one sub-shape of a solid
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryHandle {
    Face(FaceGeom),
    Edge(EdgeGeom),
    Vertex(VertexGeom),
}

impl GeometryHandle {
    pub fn topo_id(&self) -> TopoId {
        match self {
            GeometryHandle::Face(f) => f.id,
            GeometryHandle::Edge(e) => e.id,
            GeometryHandle::Vertex(v) => v.id,
        }
    }

    pub fn shape_type(&self) -> ShapeType {
        match self {
            GeometryHandle::Face(_) => ShapeType::Face,
            GeometryHandle::Edge(_) => ShapeType::Edge,
            GeometryHandle::Vertex(_) => ShapeType::Vertex,
        }
    }

    pub fn center(&self) -> Point3 {
        match self {
            GeometryHandle::Face(f) => f.center,
            GeometryHandle::Edge(e) => e.center,
            GeometryHandle::Vertex(v) => v.point,
        }
    }
}

/// Immutable topology snapshot of one kernel result
#[derive(Debug)]
pub struct Solid {
    volume: f64,
    centroid: Point3,
    bbox: BoundingBox,
    faces: Vec<FaceGeom>,
    edges: Vec<EdgeGeom>,
    vertices: Vec<VertexGeom>,
    /// TopoId → (type, position in its list)
    index: HashMap<TopoId, (ShapeType, usize)>,
}

/// Shared reference to a solid; identity is `Arc::ptr_eq`
pub type SolidRef = Arc<Solid>;

impl Solid {
    pub fn new(
        volume: f64,
        centroid: Point3,
        bbox: BoundingBox,
        faces: Vec<FaceGeom>,
        edges: Vec<EdgeGeom>,
        vertices: Vec<VertexGeom>,
    ) -> Self {
        let mut index = HashMap::with_capacity(faces.len() + edges.len() + vertices.len());
        for (i, f) in faces.iter().enumerate() {
            index.insert(f.id, (ShapeType::Face, i));
        }
        for (i, e) in edges.iter().enumerate() {
            index.insert(e.id, (ShapeType::Edge, i));
        }
        for (i, v) in vertices.iter().enumerate() {
            index.insert(v.id, (ShapeType::Vertex, i));
        }

        Self {
            volume,
            centroid,
            bbox,
            faces,
            edges,
            vertices,
            index,
        }
    }

    /// Body state before the first feature
    pub fn empty() -> Self {
        Self::new(
            0.0,
            Point3::zero(),
            BoundingBox::default(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        )
    }

    pub fn into_ref(self) -> SolidRef {
        Arc::new(self)
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn centroid(&self) -> Point3 {
        self.centroid
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn faces(&self) -> &[FaceGeom] {
        &self.faces
    }

    pub fn edges(&self) -> &[EdgeGeom] {
        &self.edges
    }

    pub fn vertices(&self) -> &[VertexGeom] {
        &self.vertices
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: TopoId) -> bool {
        self.index.contains_key(&id)
    }

    /// Live handle for a sub-shape of this solid
    pub fn handle(&self, id: TopoId) -> Option<GeometryHandle> {
        let (shape_type, pos) = *self.index.get(&id)?;
        Some(match shape_type {
            ShapeType::Face => GeometryHandle::Face(self.faces[pos].clone()),
            ShapeType::Edge => GeometryHandle::Edge(self.edges[pos].clone()),
            ShapeType::Vertex => GeometryHandle::Vertex(self.vertices[pos].clone()),
        })
    }

    /// All sub-shapes of one type, in kernel order
    pub fn handles_of(&self, shape_type: ShapeType) -> Vec<GeometryHandle> {
        match shape_type {
            ShapeType::Face => self.faces.iter().cloned().map(GeometryHandle::Face).collect(),
            ShapeType::Edge => self.edges.iter().cloned().map(GeometryHandle::Edge).collect(),
            ShapeType::Vertex => self
                .vertices
                .iter()
                .cloned()
                .map(GeometryHandle::Vertex)
                .collect(),
        }
    }
}

/// Pointer identity of two solid references
pub fn same_solid(a: &SolidRef, b: &SolidRef) -> bool {
    Arc::ptr_eq(a, b)
}

/// Short diagnostic signature: identity plus the cheap metrics
pub fn solid_signature(solid: &SolidRef) -> String {
    format!(
        "solid@{:x}:v={:.4}:f={}:e={}",
        Arc::as_ptr(solid) as usize,
        solid.volume(),
        solid.face_count(),
        solid.edge_count()
    )
}

/// Failure of a kernel call made from a feature's primary or fallback path
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OpFailure {
    /// The native kernel does not expose the entry point the operation needs
    #[error("kernel entry point '{symbol}' unavailable: {detail}")]
    KernelUnavailable { symbol: String, detail: String },

    /// The kernel ran and rejected the operation
    #[error("{0}")]
    Operation(String),
}

impl OpFailure {
    pub fn operation(msg: impl Into<String>) -> Self {
        OpFailure::Operation(msg.into())
    }

    pub fn kernel_unavailable(symbol: impl Into<String>, detail: impl Into<String>) -> Self {
        OpFailure::KernelUnavailable {
            symbol: symbol.into(),
            detail: detail.into(),
        }
    }
}

pub type OpResult<T> = std::result::Result<T, OpFailure>;
