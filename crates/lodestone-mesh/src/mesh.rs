//! Mesh and Geometry
//!
//! Flat vertex/index buffer representation and per-triangle measurements.

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Edges shorter than this make quality and aspect ratio meaningless
const MIN_EDGE_LENGTH: f32 = 1e-4;

/// Interleaved vertex attributes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    /// Object-space position
    pub position: Vec3,
    /// Shading normal
    pub normal: Vec3,
    /// Primary texture coordinate
    pub tex_coords: Vec2,
    /// Tangent (U direction)
    pub tangent: Vec3,
    /// Bitangent (V direction)
    pub bitangent: Vec3,
    /// Vertex color, opaque white when unused
    pub color: Vec4,
    /// Skinning weights, zero when unused
    pub bone_weights: Vec4,
}

impl Default for Vertex {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            normal: Vec3::ZERO,
            tex_coords: Vec2::ZERO,
            tangent: Vec3::ZERO,
            bitangent: Vec3::ZERO,
            color: Vec4::ONE,
            bone_weights: Vec4::ZERO,
        }
    }
}

impl Vertex {
    /// Create a vertex with position, normal and texture coordinate
    pub fn new(position: Vec3, normal: Vec3, tex_coords: Vec2) -> Self {
        Self {
            position,
            normal,
            tex_coords,
            ..Default::default()
        }
    }

    /// Create a vertex carrying only a position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Component-wise comparison of every attribute within `epsilon`
    pub fn is_nearly_equal(&self, other: &Vertex, epsilon: f32) -> bool {
        self.position.abs_diff_eq(other.position, epsilon)
            && self.normal.abs_diff_eq(other.normal, epsilon)
            && self.tex_coords.abs_diff_eq(other.tex_coords, epsilon)
            && self.tangent.abs_diff_eq(other.tangent, epsilon)
            && self.bitangent.abs_diff_eq(other.bitangent, epsilon)
            && self.color.abs_diff_eq(other.color, epsilon)
            && self.bone_weights.abs_diff_eq(other.bone_weights, epsilon)
    }
}

/// Indexed triangle list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Mesh name (for logging)
    pub name: String,
    /// Vertex buffer; position in the buffer is the vertex index
    pub vertices: Vec<Vertex>,
    /// Index buffer, three indices per triangle
    pub indices: Vec<u32>,
}

impl Mesh {
    /// Create a mesh from vertex and index buffers
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            name: String::new(),
            vertices,
            indices,
        }
    }

    /// Set the mesh name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Number of whole triangles in the index buffer
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check whether there is nothing to draw
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.len() < 3
    }

    /// Triangle `index`, or `None` if it is missing or references an out-of-range vertex
    pub fn triangle(&self, index: usize) -> Option<Triangle> {
        let corners = self.indices.get(index * 3..index * 3 + 3)?;
        Triangle::from_indices(&self.vertices, corners)
    }

    /// Every triangle whose indices are in range, in index-buffer order
    pub fn triangles(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.indices
            .chunks_exact(3)
            .filter_map(|corners| Triangle::from_indices(&self.vertices, corners))
    }

    /// CPU-side size of both buffers in bytes
    pub fn memory_usage(&self) -> usize {
        self.vertices.len() * std::mem::size_of::<Vertex>()
            + self.indices.len() * std::mem::size_of::<u32>()
    }

    /// Vertex positions in buffer order
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        self.vertices.iter().map(|v| v.position)
    }
}

/// The three corner positions of one triangle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    /// Corner positions in winding order
    pub positions: [Vec3; 3],
}

impl Triangle {
    /// Create a triangle from three positions
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { positions: [a, b, c] }
    }

    /// Look up a triangle's corners, bounds-checking every index
    pub fn from_indices(vertices: &[Vertex], corners: &[u32]) -> Option<Self> {
        let [a, b, c] = corners else {
            return None;
        };
        Some(Self::new(
            vertices.get(*a as usize)?.position,
            vertices.get(*b as usize)?.position,
            vertices.get(*c as usize)?.position,
        ))
    }

    /// Cross product of the two edges leaving the first corner
    pub fn scaled_normal(&self) -> Vec3 {
        let [a, b, c] = self.positions;
        (b - a).cross(c - a)
    }

    /// Unit face normal, zero for degenerate triangles
    pub fn normal(&self) -> Vec3 {
        self.scaled_normal().normalize_or_zero()
    }

    /// Surface area
    pub fn area(&self) -> f32 {
        0.5 * self.scaled_normal().length()
    }

    /// Edge lengths: a-b, a-c, b-c
    pub fn edge_lengths(&self) -> [f32; 3] {
        let [a, b, c] = self.positions;
        [a.distance(b), a.distance(c), b.distance(c)]
    }

    /// Sum of the edge lengths
    pub fn perimeter(&self) -> f32 {
        self.edge_lengths().iter().sum()
    }

    /// Mean of the three corners
    pub fn centroid(&self) -> Vec3 {
        let [a, b, c] = self.positions;
        (a + b + c) / 3.0
    }

    /// Shape quality `12√3·area / perimeter²`.
    ///
    /// 1.0 for an equilateral triangle, tending to 0.0 as it degenerates.
    pub fn quality(&self) -> f32 {
        let edges = self.edge_lengths();
        if edges.iter().any(|&len| len < MIN_EDGE_LENGTH) {
            return 0.0;
        }

        let area = self.area();
        if area < MIN_EDGE_LENGTH {
            return 0.0;
        }

        let perimeter: f32 = edges.iter().sum();
        let quality = 12.0 * 3.0f32.sqrt() * area / (perimeter * perimeter);
        quality.clamp(0.0, 1.0)
    }

    /// Longest edge over shortest edge; `f32::MAX` when an edge collapsed
    pub fn aspect_ratio(&self) -> f32 {
        let edges = self.edge_lengths();
        let max_len = edges.iter().copied().fold(f32::MIN, f32::max);
        let min_len = edges.iter().copied().fold(f32::MAX, f32::min);

        if min_len < MIN_EDGE_LENGTH {
            return f32::MAX;
        }
        max_len / min_len
    }

    /// Area at or below `epsilon`
    pub fn is_degenerate(&self, epsilon: f32) -> bool {
        self.area() <= epsilon
    }

    /// Aspect ratio above `threshold`
    pub fn is_thin(&self, threshold: f32) -> bool {
        self.aspect_ratio() > threshold
    }

    /// Area below `threshold`
    pub fn is_small(&self, threshold: f32) -> bool {
        self.area() < threshold
    }
}
