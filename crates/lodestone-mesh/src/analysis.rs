//! Mesh Analysis
//!
//! Read-only statistics and validation. Nothing in this module mutates the
//! mesh, so analysing twice always yields the same result.

use std::fmt;

use ahash::AHashSet;
use bitflags::bitflags;
use lodestone_core::{Aabb, OptimizerConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{calculate_acmr, calculate_atvr};
use crate::mesh::{Mesh, Vertex};
use crate::overdraw::calculate_overdraw_ratio;
use crate::{MeshError, MeshResult};

/// Attribute magnitudes at or below this count as absent
const ATTRIBUTE_EPSILON: f32 = 1e-3;

bitflags! {
    /// Vertex attributes carrying data somewhere in the mesh
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct VertexAttributes: u8 {
        const NORMALS = 1 << 0;
        const TANGENTS = 1 << 1;
        const TEX_COORDS = 1 << 2;
        const COLORS = 1 << 3;
        const BONE_WEIGHTS = 1 << 4;
    }
}

impl VertexAttributes {
    /// Attributes present on a single vertex
    pub fn of_vertex(vertex: &Vertex) -> Self {
        let mut attributes = Self::empty();
        attributes.set(Self::NORMALS, vertex.normal.length() > ATTRIBUTE_EPSILON);
        attributes.set(Self::TANGENTS, vertex.tangent.length() > ATTRIBUTE_EPSILON);
        attributes.set(Self::TEX_COORDS, vertex.tex_coords.length() > ATTRIBUTE_EPSILON);
        attributes.set(Self::COLORS, vertex.color != glam::Vec4::ONE);
        attributes.set(Self::BONE_WEIGHTS, vertex.bone_weights.length() > ATTRIBUTE_EPSILON);
        attributes
    }

    /// Union of the attributes of every vertex
    pub fn of_vertices(vertices: &[Vertex]) -> Self {
        vertices
            .iter()
            .fold(Self::empty(), |acc, vertex| acc | Self::of_vertex(vertex))
    }
}

/// Snapshot of a mesh's statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub vertex_count: usize,
    pub triangle_count: usize,
    /// Triangles with an area at or below the degenerate threshold
    pub degenerate_triangles: usize,
    /// Vertices sharing a bit-identical position with an earlier vertex
    pub duplicate_vertices: usize,
    pub total_area: f32,
    pub min_triangle_area: f32,
    pub max_triangle_area: f32,
    pub average_triangle_area: f32,
    /// Worst non-degenerate triangle quality (0..1)
    pub min_triangle_quality: f32,
    pub average_triangle_quality: f32,
    pub thin_triangles: usize,
    pub small_triangles: usize,
    pub bounds: Aabb,
    pub attributes: VertexAttributes,
    /// ACMR of the current index order
    pub cache_efficiency: f32,
    pub atvr: f32,
    pub overdraw_ratio: f32,
    /// Vertex and index buffer size in bytes
    pub memory_usage: usize,
}

impl AnalysisResult {
    pub fn has_normals(&self) -> bool {
        self.attributes.contains(VertexAttributes::NORMALS)
    }

    pub fn has_tangents(&self) -> bool {
        self.attributes.contains(VertexAttributes::TANGENTS)
    }

    pub fn has_tex_coords(&self) -> bool {
        self.attributes.contains(VertexAttributes::TEX_COORDS)
    }

    pub fn has_colors(&self) -> bool {
        self.attributes.contains(VertexAttributes::COLORS)
    }

    pub fn has_bone_weights(&self) -> bool {
        self.attributes.contains(VertexAttributes::BONE_WEIGHTS)
    }
}

impl fmt::Display for AnalysisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Analysis:")?;
        writeln!(f, "  Vertices: {}", self.vertex_count)?;
        writeln!(
            f,
            "  Triangles: {} ({} degenerate, {} thin, {} small)",
            self.triangle_count, self.degenerate_triangles, self.thin_triangles, self.small_triangles
        )?;
        writeln!(f, "  Duplicate vertices: {}", self.duplicate_vertices)?;
        writeln!(
            f,
            "  Area: total {:.4}, min {:.6}, max {:.4}, mean {:.6}",
            self.total_area, self.min_triangle_area, self.max_triangle_area, self.average_triangle_area
        )?;
        writeln!(
            f,
            "  Quality: min {:.3}, mean {:.3}",
            self.min_triangle_quality, self.average_triangle_quality
        )?;
        if self.bounds.is_valid() {
            writeln!(
                f,
                "  Bounds: {} .. {} (center {}, size {})",
                self.bounds.min,
                self.bounds.max,
                self.bounds.center(),
                self.bounds.size()
            )?;
        } else {
            writeln!(f, "  Bounds: empty")?;
        }
        writeln!(f, "  Attributes: {:?}", self.attributes)?;
        writeln!(
            f,
            "  ACMR: {:.3}, ATVR: {:.3}, overdraw: {:.3}",
            self.cache_efficiency, self.atvr, self.overdraw_ratio
        )?;
        write!(f, "  Memory: {} bytes", self.memory_usage)
    }
}

/// Gather statistics for `mesh`
pub fn analyze_mesh(mesh: &Mesh, config: &OptimizerConfig) -> AnalysisResult {
    let mut degenerate = 0usize;
    let mut thin = 0usize;
    let mut small = 0usize;
    let mut valid = 0usize;

    let mut total_area = 0.0f32;
    let mut min_area = f32::MAX;
    let mut max_area = 0.0f32;
    let mut total_quality = 0.0f32;
    let mut min_quality = f32::MAX;

    for triangle in mesh.triangles() {
        let area = triangle.area();

        if triangle.is_small(config.small_area) {
            small += 1;
        }

        if triangle.is_degenerate(config.degenerate_area) {
            degenerate += 1;
            continue;
        }

        valid += 1;
        total_area += area;
        min_area = min_area.min(area);
        max_area = max_area.max(area);

        let quality = triangle.quality();
        total_quality += quality;
        min_quality = min_quality.min(quality);

        if triangle.is_thin(config.thin_aspect_ratio) {
            thin += 1;
        }
    }

    let (min_area, average_area, min_quality, average_quality) = if valid > 0 {
        let n = valid as f32;
        (min_area, total_area / n, min_quality, total_quality / n)
    } else {
        (0.0, 0.0, 0.0, 0.0)
    };

    AnalysisResult {
        vertex_count: mesh.vertex_count(),
        triangle_count: mesh.triangle_count(),
        degenerate_triangles: degenerate,
        duplicate_vertices: count_duplicate_positions(&mesh.vertices),
        total_area,
        min_triangle_area: min_area,
        max_triangle_area: max_area,
        average_triangle_area: average_area,
        min_triangle_quality: min_quality,
        average_triangle_quality: average_quality,
        thin_triangles: thin,
        small_triangles: small,
        bounds: Aabb::from_points(mesh.positions()),
        attributes: VertexAttributes::of_vertices(&mesh.vertices),
        cache_efficiency: calculate_acmr(&mesh.indices, config.cache_len()),
        atvr: calculate_atvr(&mesh.indices, mesh.vertex_count()),
        overdraw_ratio: calculate_overdraw_ratio(&mesh.indices, &mesh.vertices),
        memory_usage: mesh.memory_usage(),
    }
}

/// Vertices whose exact position was already seen.
///
/// Only positions are compared, so seam vertices with distinct UVs count as
/// duplicates. Useful as a hint, not as a measure of what dedup would remove.
fn count_duplicate_positions(vertices: &[Vertex]) -> usize {
    let mut seen = AHashSet::with_capacity(vertices.len());
    vertices
        .iter()
        .filter(|vertex| {
            // Adding +0.0 folds -0.0 into +0.0
            let p = vertex.position + glam::Vec3::ZERO;
            !seen.insert([p.x.to_bits(), p.y.to_bits(), p.z.to_bits()])
        })
        .count()
}

/// A structural or geometric problem that makes a mesh unfit for rendering
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshIssue {
    #[error("Mesh has no vertices")]
    NoVertices,

    #[error("Mesh has no indices and its vertex count is not a multiple of 3")]
    MissingIndices,

    #[error("Index count {index_count} is not a multiple of 3")]
    PartialTriangle { index_count: usize },

    #[error("Index {index} at position {position} is out of range (vertex count {vertex_count})")]
    IndexOutOfBounds {
        position: usize,
        index: u32,
        vertex_count: usize,
    },

    #[error("Mesh contains {0} degenerate triangles")]
    DegenerateTriangles(usize),
}

/// Every issue found in `mesh`; empty when it is valid
pub fn get_mesh_issues(mesh: &Mesh, config: &OptimizerConfig) -> Vec<MeshIssue> {
    let mut issues = Vec::new();

    if mesh.vertices.is_empty() {
        issues.push(MeshIssue::NoVertices);
    }

    if mesh.indices.is_empty() {
        if mesh.vertex_count() % 3 != 0 {
            issues.push(MeshIssue::MissingIndices);
        }
    } else if mesh.indices.len() % 3 != 0 {
        issues.push(MeshIssue::PartialTriangle {
            index_count: mesh.indices.len(),
        });
    }

    let vertex_count = mesh.vertex_count();
    if let Some((position, &index)) = mesh
        .indices
        .iter()
        .enumerate()
        .find(|&(_, &index)| index as usize >= vertex_count)
    {
        issues.push(MeshIssue::IndexOutOfBounds {
            position,
            index,
            vertex_count,
        });
    }

    let degenerate = mesh
        .triangles()
        .filter(|triangle| triangle.is_degenerate(config.degenerate_area))
        .count();
    if degenerate > 0 {
        issues.push(MeshIssue::DegenerateTriangles(degenerate));
    }

    issues
}

/// Check whether `mesh` has no issues
pub fn validate_mesh(mesh: &Mesh, config: &OptimizerConfig) -> bool {
    get_mesh_issues(mesh, config).is_empty()
}

impl Mesh {
    /// Return the mesh unchanged if it is valid, or every issue found
    pub fn validated(self, config: &OptimizerConfig) -> MeshResult<Self> {
        let issues = get_mesh_issues(&self, config);
        if issues.is_empty() {
            Ok(self)
        } else {
            Err(MeshError::InvalidMesh(issues))
        }
    }
}
