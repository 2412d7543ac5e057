//! Level of Detail
//!
//! Chains of progressively simplified meshes and distance-based selection.

use lodestone_core::LodConfig;

use crate::mesh::Mesh;
use crate::simplify::Simplifier;

/// One level of a chain
#[derive(Debug, Clone, PartialEq)]
pub struct LodLevel {
    pub mesh: Mesh,
    /// Simplification ratio that produced this level (1.0 for the source)
    pub ratio: f32,
}

/// Meshes ordered from highest to lowest detail
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LodChain {
    levels: Vec<LodLevel>,
}

impl LodChain {
    pub fn new(levels: Vec<LodLevel>) -> Self {
        Self { levels }
    }

    pub fn levels(&self) -> &[LodLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Mesh of level `index`
    pub fn get(&self, index: usize) -> Option<&Mesh> {
        self.levels.get(index).map(|level| &level.mesh)
    }

    pub fn meshes(&self) -> impl Iterator<Item = &Mesh> {
        self.levels.iter().map(|level| &level.mesh)
    }

    /// Triangle count of every level, highest detail first
    pub fn triangle_counts(&self) -> Vec<usize> {
        self.meshes().map(Mesh::triangle_count).collect()
    }

    pub(crate) fn levels_mut(&mut self) -> &mut [LodLevel] {
        &mut self.levels
    }
}

/// Build a chain: a copy of `mesh` followed by one level per ratio.
///
/// Ratios outside `(0, 1)` are ignored, as are levels that end up with no
/// triangles.
pub fn generate_lod_chain(mesh: &Mesh, ratios: &[f32], simplifier: &Simplifier) -> LodChain {
    let mut levels = Vec::with_capacity(ratios.len() + 1);
    levels.push(LodLevel {
        mesh: mesh.clone(),
        ratio: 1.0,
    });

    for &ratio in ratios {
        if !(ratio > 0.0 && ratio < 1.0) {
            log::debug!("Skipping LOD ratio {ratio}");
            continue;
        }

        let simplified = simplifier.simplify(mesh, ratio);
        if simplified.triangle_count() == 0 {
            continue;
        }
        levels.push(LodLevel {
            mesh: simplified,
            ratio,
        });
    }

    log::debug!("Generated LOD chain for '{}' with {} levels", mesh.name, levels.len());
    LodChain::new(levels)
}

/// Build a chain of `count` levels with evenly spaced ratios `1 - i/count`.
///
/// A count of zero yields an empty chain.
pub fn generate_automatic_lods(mesh: &Mesh, count: u32, simplifier: &Simplifier) -> LodChain {
    if count == 0 {
        return LodChain::default();
    }

    let ratios: Vec<f32> = (1..count).map(|i| 1.0 - i as f32 / count as f32).collect();
    generate_lod_chain(mesh, &ratios, simplifier)
}

/// Pick the level to draw at `distance` from the viewer.
///
/// Level `i` is chosen for the first `i` whose switch distance is at least
/// `distance`; beyond every switch distance the last level is used. With
/// distance selection disabled level 0 is always returned.
pub fn select_lod<'a>(chain: &'a LodChain, distance: f32, config: &LodConfig) -> Option<&'a Mesh> {
    if chain.is_empty() {
        return None;
    }
    if !config.enable_distance_based_selection {
        return chain.get(0);
    }

    let candidates = config.lod_distances.len().min(chain.len());
    let index = config.lod_distances[..candidates]
        .iter()
        .position(|&switch| distance <= switch)
        .unwrap_or(chain.len() - 1);
    chain.get(index)
}
