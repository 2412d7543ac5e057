//! # Lodestone Mesh
//!
//! CPU-side mesh optimization for GPU rendering.
//!
//! ## Features
//! - Post-transform vertex cache simulation (ACMR / ATVR)
//! - Forsyth-style greedy triangle reordering
//! - Vertex fetch reordering
//! - Back-to-front overdraw sort
//! - Mesh analysis and validation
//! - Duplicate welding, normal and tangent generation
//! - Quadric error metric simplification and LOD chains
//!
//! Every pass is a synchronous transform over in-memory buffers. Passes take
//! their settings explicitly, so independent meshes can be processed on any
//! thread (see [`pipeline::build_lod_chains`]).

pub mod analysis;
pub mod attributes;
pub mod cache;
pub mod cache_optimizer;
pub mod fetch;
pub mod lod;
pub mod mesh;
pub mod overdraw;
pub mod pipeline;
pub mod primitives;
pub mod simplify;

pub use analysis::{AnalysisResult, MeshIssue, VertexAttributes, analyze_mesh, get_mesh_issues, validate_mesh};
pub use cache::{VertexCacheSimulator, calculate_acmr, calculate_atvr};
pub use lod::{LodChain, LodLevel};
pub use mesh::{Mesh, Triangle, Vertex};
pub use pipeline::{MeshOptimizer, OptimizationStats};
pub use simplify::{Quadric, SimplifyMethod, SimplifyOptions, Simplifier};

use lodestone_core::ConfigError;
use thiserror::Error;

/// Mesh processing errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MeshError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid mesh: {}", format_issues(.0))]
    InvalidMesh(Vec<MeshIssue>),
}

fn format_issues(issues: &[MeshIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result type for mesh operations
pub type MeshResult<T> = Result<T, MeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = MeshError::InvalidMesh(vec![MeshIssue::NoVertices, MeshIssue::DegenerateTriangles(2)]);
        assert_eq!(
            error.to_string(),
            "Invalid mesh: Mesh has no vertices; Mesh contains 2 degenerate triangles"
        );

        let error = MeshError::from(ConfigError::ZeroCacheSize);
        assert_eq!(error.to_string(), "Invalid configuration: Cache size must be at least 1");
    }
}
