//! Optimization Pipeline
//!
//! [`MeshOptimizer`] ties the individual passes together with one validated
//! configuration: GPU-order optimization, the full optimize-for-rendering
//! sequence, before/after statistics and optimized LOD chains.

use std::fmt;
use std::time::Instant;

use lodestone_core::PipelineConfig;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalysisResult, MeshIssue, VertexAttributes, analyze_mesh, get_mesh_issues};
use crate::attributes::{generate_normals, generate_tangents, remove_duplicate_vertices};
use crate::cache::{calculate_acmr, calculate_atvr};
use crate::cache_optimizer::optimize_indices;
use crate::fetch::reorder_for_fetch;
use crate::lod::{LodChain, generate_lod_chain, select_lod};
use crate::mesh::Mesh;
use crate::overdraw::optimize_overdraw_indices;
use crate::simplify::{Simplifier, SimplifyOptions};
use crate::MeshResult;

/// Before/after comparison of one optimization run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationStats {
    pub original_vertex_count: usize,
    pub original_triangle_count: usize,
    pub original_acmr: f32,
    pub original_atvr: f32,
    pub original_memory_usage: usize,

    pub optimized_vertex_count: usize,
    pub optimized_triangle_count: usize,
    pub optimized_acmr: f32,
    pub optimized_atvr: f32,
    pub optimized_memory_usage: usize,

    /// Percent of vertices removed
    pub vertex_reduction: f32,
    /// Percent of triangles removed
    pub triangle_reduction: f32,
    /// Percent ACMR improvement
    pub cache_improvement: f32,
    /// Percent of buffer memory saved
    pub memory_reduction: f32,

    /// Wall-clock time of the optimization in milliseconds
    pub optimization_time_ms: f32,
}

fn percent_change(before: f32, after: f32) -> f32 {
    if before > 0.0 {
        (before - after) / before * 100.0
    } else {
        0.0
    }
}

impl OptimizationStats {
    /// Derive the percentage fields from the before/after values.
    ///
    /// Growth shows up as a negative reduction.
    pub fn calculate_improvements(&mut self) {
        self.vertex_reduction =
            percent_change(self.original_vertex_count as f32, self.optimized_vertex_count as f32);
        self.triangle_reduction =
            percent_change(self.original_triangle_count as f32, self.optimized_triangle_count as f32);
        self.cache_improvement = percent_change(self.original_acmr, self.optimized_acmr);
        self.memory_reduction =
            percent_change(self.original_memory_usage as f32, self.optimized_memory_usage as f32);
    }

    /// Multi-line human readable report
    pub fn summary(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OptimizationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Mesh Optimization Results:")?;
        writeln!(
            f,
            "  Vertices: {} -> {} ({:.1}% reduction)",
            self.original_vertex_count, self.optimized_vertex_count, self.vertex_reduction
        )?;
        writeln!(
            f,
            "  Triangles: {} -> {} ({:.1}% reduction)",
            self.original_triangle_count, self.optimized_triangle_count, self.triangle_reduction
        )?;
        writeln!(
            f,
            "  ACMR: {:.3} -> {:.3} ({:.1}% improvement)",
            self.original_acmr, self.optimized_acmr, self.cache_improvement
        )?;
        writeln!(f, "  ATVR: {:.3} -> {:.3}", self.original_atvr, self.optimized_atvr)?;
        writeln!(
            f,
            "  Memory: {} -> {} bytes ({:.1}% reduction)",
            self.original_memory_usage, self.optimized_memory_usage, self.memory_reduction
        )?;
        write!(f, "  Optimization time: {:.3}ms", self.optimization_time_ms)
    }
}

/// Mesh optimization front end holding a validated configuration
#[derive(Debug, Clone)]
pub struct MeshOptimizer {
    config: PipelineConfig,
    simplifier: Simplifier,
}

impl MeshOptimizer {
    /// Create an optimizer, rejecting invalid configuration
    pub fn new(config: PipelineConfig) -> MeshResult<Self> {
        config.validate()?;
        let simplifier = Simplifier::new(SimplifyOptions::from(&config.lod));
        Ok(Self { config, simplifier })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn simplifier(&self) -> &Simplifier {
        &self.simplifier
    }

    /// Use a different simplifier for LOD generation
    pub fn with_simplifier(mut self, simplifier: Simplifier) -> Self {
        self.simplifier = simplifier;
        self
    }

    fn summary_level(&self) -> log::Level {
        if self.config.optimizer.verbose_logging {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }

    fn skip_level(&self) -> log::Level {
        if self.config.optimizer.verbose_logging {
            log::Level::Warn
        } else {
            log::Level::Debug
        }
    }

    pub fn analyze(&self, mesh: &Mesh) -> AnalysisResult {
        analyze_mesh(mesh, &self.config.optimizer)
    }

    pub fn issues(&self, mesh: &Mesh) -> Vec<MeshIssue> {
        get_mesh_issues(mesh, &self.config.optimizer)
    }

    /// Reorder triangles for the post-transform vertex cache
    pub fn optimize_vertex_cache(&self, mesh: &mut Mesh) {
        if mesh.indices.len() < 3 {
            log::log!(self.skip_level(), "Cannot optimize vertex cache of '{}': insufficient indices", mesh.name);
            return;
        }

        let _span = tracing::debug_span!("vertex_cache", triangles = mesh.triangle_count()).entered();
        let cache_size = self.config.optimizer.cache_len();
        let before = calculate_acmr(&mesh.indices, cache_size);
        mesh.indices = optimize_indices(&mesh.indices, mesh.vertex_count(), cache_size);
        let after = calculate_acmr(&mesh.indices, cache_size);

        log::log!(
            self.summary_level(),
            "Vertex cache optimization of '{}': ACMR {before:.3} -> {after:.3}",
            mesh.name
        );
    }

    /// Renumber vertices in first-use order
    pub fn optimize_vertex_fetch(&self, mesh: &mut Mesh) {
        if mesh.vertices.is_empty() || mesh.indices.is_empty() {
            log::log!(self.skip_level(), "Cannot optimize vertex fetch of '{}': empty buffers", mesh.name);
            return;
        }

        let _span = tracing::debug_span!("vertex_fetch", vertices = mesh.vertex_count()).entered();
        reorder_for_fetch(&mut mesh.vertices, &mut mesh.indices);
        log::log!(
            self.summary_level(),
            "Vertex fetch optimization of '{}': {} vertices reordered",
            mesh.name,
            mesh.vertex_count()
        );
    }

    /// Sort triangles back to front along local Z
    pub fn optimize_overdraw(&self, mesh: &mut Mesh) {
        if mesh.indices.len() < 3 {
            log::log!(self.skip_level(), "Cannot optimize overdraw of '{}': insufficient indices", mesh.name);
            return;
        }

        let _span = tracing::debug_span!("overdraw", triangles = mesh.triangle_count()).entered();
        mesh.indices = optimize_overdraw_indices(
            &mesh.indices,
            &mesh.vertices,
            self.config.optimizer.overdraw_threshold,
        );
        log::log!(self.summary_level(), "Overdraw optimization of '{}' complete", mesh.name);
    }

    /// Weld duplicates, fill in missing normals and tangents, then run the
    /// cache, fetch and overdraw passes
    pub fn optimize_for_rendering(&self, mesh: &mut Mesh) {
        let _span = tracing::debug_span!("optimize_for_rendering", mesh = %mesh.name).entered();
        log::log!(self.summary_level(), "Optimizing '{}' for rendering", mesh.name);

        remove_duplicate_vertices(mesh, self.config.optimizer.duplicate_epsilon);

        let attributes = VertexAttributes::of_vertices(&mesh.vertices);
        if !attributes.contains(VertexAttributes::NORMALS) {
            generate_normals(mesh, true);
        }
        if attributes.contains(VertexAttributes::TEX_COORDS) && !attributes.contains(VertexAttributes::TANGENTS) {
            generate_tangents(mesh);
        }

        self.optimize_vertex_cache(mesh);
        self.optimize_vertex_fetch(mesh);
        self.optimize_overdraw(mesh);
    }

    /// Compare two versions of a mesh
    pub fn optimization_stats(&self, original: &Mesh, optimized: &Mesh) -> OptimizationStats {
        let cache_size = self.config.optimizer.cache_len();
        let mut stats = OptimizationStats {
            original_vertex_count: original.vertex_count(),
            original_triangle_count: original.triangle_count(),
            original_acmr: calculate_acmr(&original.indices, cache_size),
            original_atvr: calculate_atvr(&original.indices, original.vertex_count()),
            original_memory_usage: original.memory_usage(),
            optimized_vertex_count: optimized.vertex_count(),
            optimized_triangle_count: optimized.triangle_count(),
            optimized_acmr: calculate_acmr(&optimized.indices, cache_size),
            optimized_atvr: calculate_atvr(&optimized.indices, optimized.vertex_count()),
            optimized_memory_usage: optimized.memory_usage(),
            ..Default::default()
        };
        stats.calculate_improvements();
        stats
    }

    /// Run the selected GPU-order passes and report what changed
    pub fn optimize_with_stats(
        &self,
        mesh: &mut Mesh,
        optimize_cache: bool,
        optimize_fetch: bool,
        optimize_overdraw: bool,
    ) -> OptimizationStats {
        let original = mesh.clone();
        let start = Instant::now();

        if optimize_cache {
            self.optimize_vertex_cache(mesh);
        }
        if optimize_fetch {
            self.optimize_vertex_fetch(mesh);
        }
        if optimize_overdraw {
            self.optimize_overdraw(mesh);
        }

        let elapsed = start.elapsed();
        let mut stats = self.optimization_stats(&original, mesh);
        stats.optimization_time_ms = elapsed.as_secs_f32() * 1000.0;
        stats
    }

    /// LOD chain from the configured ratios, without optimization
    pub fn generate_lods(&self, mesh: &Mesh) -> LodChain {
        let _span = tracing::debug_span!("generate_lods", mesh = %mesh.name).entered();
        generate_lod_chain(mesh, &self.config.lod.simplification_ratios, &self.simplifier)
    }

    /// LOD chain with every level optimized for rendering
    pub fn create_optimized_lod_chain(&self, mesh: &Mesh) -> LodChain {
        let mut chain = self.generate_lods(mesh);
        for level in chain.levels_mut() {
            self.optimize_for_rendering(&mut level.mesh);
        }

        log::log!(
            self.summary_level(),
            "Created optimized LOD chain for '{}': {:?} triangles",
            mesh.name,
            chain.triangle_counts()
        );
        chain
    }

    /// Level of `chain` to draw at `distance`
    pub fn select_lod<'a>(&self, chain: &'a LodChain, distance: f32) -> Option<&'a Mesh> {
        select_lod(chain, distance, &self.config.lod)
    }
}

/// Build an optimized LOD chain for `mesh`
pub fn create_optimized_lod_chain(mesh: &Mesh, config: &PipelineConfig) -> MeshResult<LodChain> {
    Ok(MeshOptimizer::new(config.clone())?.create_optimized_lod_chain(mesh))
}

/// Build optimized LOD chains for independent meshes in parallel.
///
/// Chains come back in the order of `meshes`.
pub fn build_lod_chains(meshes: &[Mesh], config: &PipelineConfig) -> MeshResult<Vec<LodChain>> {
    let optimizer = MeshOptimizer::new(config.clone())?;
    let chains = meshes
        .par_iter()
        .map(|mesh| optimizer.create_optimized_lod_chain(mesh))
        .collect();
    Ok(chains)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::Vertex;
    use crate::primitives;
    use crate::MeshError;
    use glam::Vec3;
    use lodestone_core::{ConfigError, LodConfig, OptimizerConfig};

    fn optimizer() -> MeshOptimizer {
        MeshOptimizer::new(PipelineConfig::default()).unwrap()
    }

    fn sorted_triangles(mesh: &Mesh) -> Vec<[[u32; 3]; 3]> {
        let mut triangles: Vec<[[u32; 3]; 3]> = mesh
            .triangles()
            .map(|t| {
                let mut corners = t.positions.map(|p| p.to_array().map(f32::to_bits));
                corners.sort_unstable();
                corners
            })
            .collect();
        triangles.sort_unstable();
        triangles
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = PipelineConfig {
            optimizer: OptimizerConfig { cache_size: 0, ..Default::default() },
            ..Default::default()
        };
        assert!(matches!(
            MeshOptimizer::new(config),
            Err(MeshError::Config(ConfigError::ZeroCacheSize))
        ));
    }

    #[test]
    fn test_improvements_handle_growth_and_zero() {
        let mut stats = OptimizationStats {
            original_vertex_count: 100,
            optimized_vertex_count: 80,
            original_triangle_count: 10,
            optimized_triangle_count: 12,
            original_acmr: 0.0,
            optimized_acmr: 0.5,
            ..Default::default()
        };
        stats.calculate_improvements();
        assert!((stats.vertex_reduction - 20.0).abs() < 1e-4);
        assert!((stats.triangle_reduction + 20.0).abs() < 1e-4);
        assert_eq!(stats.cache_improvement, 0.0);
        assert_eq!(stats.memory_reduction, 0.0);
    }

    #[test]
    fn test_optimize_with_stats_improves_scrambled_grid() {
        let mut mesh = primitives::scramble_triangles(&primitives::grid(16, 16, 1.0), 21);
        let before = sorted_triangles(&mesh);
        let stats = optimizer().optimize_with_stats(&mut mesh, true, true, false);

        assert!(stats.optimized_acmr < stats.original_acmr);
        assert!(stats.cache_improvement > 0.0);
        assert_eq!(stats.original_vertex_count, stats.optimized_vertex_count);
        assert_eq!(stats.vertex_reduction, 0.0);
        assert_eq!(sorted_triangles(&mesh), before);
        assert!(stats.summary().starts_with("Mesh Optimization Results:"));
    }

    #[test]
    fn test_optimize_for_rendering_fills_attributes() {
        let source = primitives::cube(1.0);
        let vertices = source
            .vertices
            .iter()
            .map(|v| Vertex::new(v.position, glam::Vec3::ZERO, v.tex_coords))
            .collect();
        let mut mesh = Mesh::new(vertices, source.indices.clone());
        optimizer().optimize_for_rendering(&mut mesh);

        let analysis = optimizer().analyze(&mesh);
        assert!(analysis.has_normals());
        assert!(analysis.has_tangents());
        assert_eq!(analysis.triangle_count, 12);
        assert!(optimizer().issues(&mesh).is_empty());
    }

    #[test]
    fn test_optimize_for_rendering_with_extreme_coordinates() {
        let mut mesh = primitives::grid(2, 2, 1.0);
        mesh.vertices[0].position = Vec3::new(f32::INFINITY, 1e16, 0.0);
        mesh.vertices[1].position = Vec3::new(-1e16, f32::NEG_INFINITY, 0.0);
        optimizer().optimize_for_rendering(&mut mesh);
        assert_eq!(mesh.triangle_count(), 8);
        assert_eq!(mesh.vertex_count(), 9);
    }

    #[test]
    fn test_optimize_passes_skip_empty_meshes() {
        let mut mesh = Mesh::default();
        let optimizer = optimizer();
        optimizer.optimize_vertex_cache(&mut mesh);
        optimizer.optimize_vertex_fetch(&mut mesh);
        optimizer.optimize_overdraw(&mut mesh);
        assert_eq!(mesh, Mesh::default());
    }

    #[test]
    fn test_optimized_lod_chain() {
        let mesh = primitives::uv_sphere(10, 16, 1.0);
        let chain = optimizer().create_optimized_lod_chain(&mesh);

        assert!(chain.len() > 1);
        assert_eq!(chain.get(0).map(Mesh::triangle_count), Some(mesh.triangle_count()));
        let counts = chain.triangle_counts();
        assert!(counts.windows(2).all(|w| w[1] <= w[0]), "{counts:?}");
        for level in chain.meshes() {
            assert!(level.indices.iter().all(|&i| (i as usize) < level.vertex_count()));
            assert!(level.vertices.iter().all(|v| v.normal.length() > 0.99));
        }
        assert_eq!(optimizer().select_lod(&chain, 0.0), chain.get(0));
    }

    #[test]
    fn test_flat_shaded_lod_chain_shrinks() {
        let chain = optimizer().create_optimized_lod_chain(&primitives::cube(1.0));
        assert_eq!(chain.triangle_counts(), vec![12, 9, 6, 3, 1]);
    }

    #[test]
    fn test_build_lod_chains_in_parallel() {
        let meshes = vec![
            primitives::grid(8, 8, 1.0),
            primitives::uv_sphere(8, 12, 1.0),
            primitives::cube(1.0),
        ];
        let config = PipelineConfig::default();
        let chains = build_lod_chains(&meshes, &config).unwrap();

        assert_eq!(chains.len(), meshes.len());
        for (mesh, chain) in meshes.iter().zip(&chains) {
            assert_eq!(chain, &create_optimized_lod_chain(mesh, &config).unwrap());
        }
    }

    #[test]
    fn test_build_lod_chains_rejects_bad_ratios() {
        let config = PipelineConfig {
            lod: LodConfig { simplification_ratios: vec![2.0], ..Default::default() },
            ..Default::default()
        };
        assert!(build_lod_chains(&[primitives::cube(1.0)], &config).is_err());
    }
}
