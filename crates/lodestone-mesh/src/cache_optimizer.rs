//! Vertex cache optimization (Tom Forsyth's linear-speed heuristic, greedy form)
//!
//! Triangles are emitted one at a time, always picking the remaining triangle
//! whose vertices score highest. A vertex scores well when it was touched
//! recently (it is likely still transformed) and when few triangles still
//! need it (finishing it off frees a cache slot).

use smallvec::SmallVec;

/// Exponent applied to the normalized cache position
pub const CACHE_DECAY_POWER: f32 = 1.5;
/// Flat score for the three most recently used vertices
pub const LAST_TRI_SCORE: f32 = 0.75;
/// Scale of the remaining-valence bonus
pub const VALENCE_BOOST_SCALE: f32 = 2.0;
/// Exponent of the remaining-valence bonus
pub const VALENCE_BOOST_POWER: f32 = 0.5;

/// Score of a vertex at `cache_position` (0 = most recent) with `valence` triangles left.
///
/// Vertices with no remaining triangles score -1 so they are never preferred.
pub fn vertex_score(cache_position: Option<usize>, valence: usize, cache_size: usize) -> f32 {
    if valence == 0 {
        return -1.0;
    }

    let mut score = match cache_position {
        Some(position) if position < 3 => LAST_TRI_SCORE,
        Some(position) => {
            let scaler = 1.0 / cache_size.saturating_sub(3).max(1) as f32;
            let score = 1.0 - (position - 3) as f32 * scaler;
            score.max(0.0).powf(CACHE_DECAY_POWER)
        }
        None => 0.0,
    };

    score += VALENCE_BOOST_SCALE * (valence as f32).powf(-VALENCE_BOOST_POWER);
    score
}

/// Greedy simulated cache, most recent vertex first
struct ScoringCache {
    entries: Vec<u32>,
    size: usize,
}

impl ScoringCache {
    fn position(&self, vertex: u32) -> Option<usize> {
        self.entries.iter().position(|&v| v == vertex)
    }

    fn touch(&mut self, vertex: u32) {
        self.entries.retain(|&v| v != vertex);
        self.entries.insert(0, vertex);
        self.entries.truncate(self.size);
    }
}

/// Reorder whole triangles to reduce post-transform cache misses.
///
/// The vertex indices inside each triangle are never changed. Selection is
/// deterministic: among equal scores the triangle that comes first in the
/// input wins. Indices `>= vertex_count` are tolerated but take no part in
/// scoring, and a trailing partial triangle is appended unchanged.
///
/// Every step scans all remaining triangles, so the cost is O(triangles²).
/// That is fine for sub-100k-triangle meshes and slow beyond that.
pub fn optimize_indices(indices: &[u32], vertex_count: usize, cache_size: usize) -> Vec<u32> {
    if indices.len() < 3 {
        return indices.to_vec();
    }

    let triangle_count = indices.len() / 3;

    let mut adjacency: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); vertex_count];
    for (triangle, corners) in indices.chunks_exact(3).enumerate() {
        for &vertex in corners {
            if let Some(triangles) = adjacency.get_mut(vertex as usize) {
                triangles.push(triangle as u32);
            }
        }
    }

    let mut cache = ScoringCache {
        entries: Vec::with_capacity(cache_size + 3),
        size: cache_size,
    };

    let mut scores: Vec<f32> = adjacency
        .iter()
        .map(|triangles| vertex_score(None, triangles.len(), cache_size))
        .collect();

    let score_of = |scores: &[f32], vertex: u32| scores.get(vertex as usize).copied().unwrap_or(0.0);

    let mut remaining: Vec<u32> = (0..triangle_count as u32).collect();
    let mut result = Vec::with_capacity(indices.len());
    let mut touched: SmallVec<[u32; 64]> = SmallVec::new();

    while !remaining.is_empty() {
        let mut best: Option<(usize, f32)> = None;

        for (slot, &triangle) in remaining.iter().enumerate() {
            let base = triangle as usize * 3;
            let mut score = 0.0;
            score += score_of(&scores, indices[base]);
            score += score_of(&scores, indices[base + 1]);
            score += score_of(&scores, indices[base + 2]);

            if best.is_none_or(|(_, best_score)| score > best_score) {
                best = Some((slot, score));
            }
        }

        let Some((slot, _)) = best else {
            break;
        };
        let triangle = remaining.remove(slot);
        let base = triangle as usize * 3;
        let corners = [indices[base], indices[base + 1], indices[base + 2]];
        result.extend_from_slice(&corners);

        // Every vertex whose cache position or valence may change needs a new score
        touched.clear();
        touched.extend(cache.entries.iter().copied());

        for &vertex in &corners {
            if (vertex as usize) < vertex_count {
                cache.touch(vertex);
            }
        }

        for &vertex in &corners {
            if let Some(triangles) = adjacency.get_mut(vertex as usize) {
                triangles.retain(|&mut t| t != triangle);
                touched.push(vertex);
            }
        }

        for &vertex in &touched {
            let valence = adjacency[vertex as usize].len();
            scores[vertex as usize] = vertex_score(cache.position(vertex), valence, cache_size);
        }
    }

    result.extend_from_slice(&indices[triangle_count * 3..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::calculate_acmr;
    use crate::primitives;

    fn sorted_triangles(indices: &[u32]) -> Vec<[u32; 3]> {
        let mut triangles: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|t| {
                let mut t = [t[0], t[1], t[2]];
                t.sort_unstable();
                t
            })
            .collect();
        triangles.sort_unstable();
        triangles
    }

    #[test]
    fn test_vertex_score_terms() {
        assert_eq!(vertex_score(Some(0), 0, 32), -1.0);
        assert!((vertex_score(None, 1, 32) - 2.0).abs() < 1e-6);
        assert!((vertex_score(Some(2), 1, 32) - 2.75).abs() < 1e-6);
        assert!((vertex_score(Some(3), 4, 32) - 2.0).abs() < 1e-6);
        assert!(vertex_score(Some(20), 1, 32) < vertex_score(Some(3), 1, 32));
    }

    #[test]
    fn test_short_input_unchanged() {
        assert!(optimize_indices(&[], 0, 32).is_empty());
        assert_eq!(optimize_indices(&[0, 1], 2, 32), vec![0, 1]);
    }

    #[test]
    fn test_selection_order_and_tie_break() {
        // The isolated triangle scores highest; the other two tie and keep input order
        let indices = [0, 1, 2, 3, 4, 5, 2, 1, 6];
        let optimized = optimize_indices(&indices, 7, 32);
        assert_eq!(optimized, vec![3, 4, 5, 0, 1, 2, 2, 1, 6]);
    }

    #[test]
    fn test_triangle_set_preserved() {
        let mesh = primitives::scramble_triangles(&primitives::grid(12, 12, 1.0), 7);
        let optimized = optimize_indices(&mesh.indices, mesh.vertex_count(), 32);
        assert_eq!(optimized.len(), mesh.indices.len());
        assert_eq!(sorted_triangles(&optimized), sorted_triangles(&mesh.indices));
    }

    #[test]
    fn test_acmr_does_not_regress() {
        let corpus = [
            primitives::cube(1.0),
            primitives::grid(16, 16, 1.0),
            primitives::uv_sphere(12, 16, 1.0),
            primitives::scramble_triangles(&primitives::grid(16, 16, 1.0), 3),
            primitives::scramble_triangles(&primitives::uv_sphere(10, 12, 1.0), 11),
        ];

        for mesh in &corpus {
            let before = calculate_acmr(&mesh.indices, 32);
            let optimized = optimize_indices(&mesh.indices, mesh.vertex_count(), 32);
            let after = calculate_acmr(&optimized, 32);
            assert!(after <= before + 0.05, "ACMR regressed: {before} -> {after}");
        }
    }

    #[test]
    fn test_scrambled_grid_improves() {
        let mesh = primitives::scramble_triangles(&primitives::grid(20, 20, 1.0), 5);
        let before = calculate_acmr(&mesh.indices, 32);
        let optimized = optimize_indices(&mesh.indices, mesh.vertex_count(), 32);
        assert!(calculate_acmr(&optimized, 32) < before);
    }

    #[test]
    fn test_out_of_range_indices_tolerated() {
        let indices = [0, 1, 2, 2, 1, 99, 5];
        let optimized = optimize_indices(&indices, 3, 32);
        assert_eq!(optimized.len(), indices.len());
        assert_eq!(sorted_triangles(&optimized), sorted_triangles(&indices));
        assert_eq!(optimized.last(), Some(&5));
    }

    #[test]
    fn test_large_cache_size() {
        let mesh = primitives::scramble_triangles(&primitives::uv_sphere(10, 16, 1.0), 4);
        let optimized = optimize_indices(&mesh.indices, mesh.vertex_count(), 64);
        assert_eq!(sorted_triangles(&optimized), sorted_triangles(&mesh.indices));
        assert!(calculate_acmr(&optimized, 64) <= calculate_acmr(&mesh.indices, 64));
    }

    #[test]
    fn test_deterministic() {
        let mesh = primitives::uv_sphere(8, 10, 1.0);
        let a = optimize_indices(&mesh.indices, mesh.vertex_count(), 16);
        let b = optimize_indices(&mesh.indices, mesh.vertex_count(), 16);
        assert_eq!(a, b);
    }
}
