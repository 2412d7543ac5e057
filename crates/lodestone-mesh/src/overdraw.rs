//! Overdraw reduction
//!
//! A static back-to-front sort on triangle depth. The sort assumes the camera
//! looks down local −Z, so it is a cheap approximation rather than a
//! view-dependent overdraw minimization.

use crate::mesh::{Triangle, Vertex};

/// Reorder triangles by centroid Z, farthest (largest Z) first.
///
/// The sort is stable, so triangles at equal depth keep their input order.
/// Triangles referencing out-of-range vertices are appended after the sorted
/// ones, followed by any trailing partial triangle. `threshold` is accepted
/// for parity with clustered overdraw optimizers and does not affect ordering.
pub fn optimize_overdraw_indices(indices: &[u32], vertices: &[Vertex], threshold: f32) -> Vec<u32> {
    log::debug!(
        "Overdraw sort over {} triangles (threshold {threshold})",
        indices.len() / 3
    );

    let mut sortable: Vec<(f32, &[u32])> = Vec::with_capacity(indices.len() / 3);
    let mut invalid: Vec<&[u32]> = Vec::new();

    for corners in indices.chunks_exact(3) {
        match Triangle::from_indices(vertices, corners) {
            Some(triangle) => sortable.push((triangle.centroid().z, corners)),
            None => invalid.push(corners),
        }
    }

    sortable.sort_by(|a, b| b.0.total_cmp(&a.0));

    let mut result = Vec::with_capacity(indices.len());
    for (_, corners) in sortable {
        result.extend_from_slice(corners);
    }
    for corners in invalid {
        result.extend_from_slice(corners);
    }
    result.extend_from_slice(indices.chunks_exact(3).remainder());
    result
}

/// Fraction of in-range triangles facing away from +Z.
///
/// Returns 0.0 when there are no valid triangles.
pub fn calculate_overdraw_ratio(indices: &[u32], vertices: &[Vertex]) -> f32 {
    let mut total = 0usize;
    let mut front = 0usize;

    for corners in indices.chunks_exact(3) {
        if let Some(triangle) = Triangle::from_indices(vertices, corners) {
            total += 1;
            if triangle.scaled_normal().z > 0.0 {
                front += 1;
            }
        }
    }

    if total == 0 {
        return 0.0;
    }
    1.0 - front as f32 / total as f32
}
