//! Vertex fetch optimization
//!
//! Renumbers vertices in the order the index buffer first touches them so
//! that vertex fetches walk memory mostly forward.

use crate::mesh::Vertex;

const UNASSIGNED: u32 = u32::MAX;

/// Old→new vertex index table.
///
/// Referenced vertices are numbered in first-use order; unreferenced vertices
/// follow in their original relative order. Out-of-range indices are ignored.
pub fn fetch_remap(indices: &[u32], vertex_count: usize) -> Vec<u32> {
    let mut remap = vec![UNASSIGNED; vertex_count];
    let mut next = 0u32;

    for &index in indices {
        if let Some(slot) = remap.get_mut(index as usize) {
            if *slot == UNASSIGNED {
                *slot = next;
                next += 1;
            }
        }
    }

    for slot in &mut remap {
        if *slot == UNASSIGNED {
            *slot = next;
            next += 1;
        }
    }

    remap
}

/// Reorder the vertex buffer to first-use order and rewrite the indices to match.
///
/// The rendered triangles are unchanged, only their labels move. Indices that
/// were out of range stay as they are.
pub fn reorder_for_fetch(vertices: &mut Vec<Vertex>, indices: &mut [u32]) {
    if vertices.is_empty() {
        return;
    }

    let remap = fetch_remap(indices, vertices.len());

    let mut reordered = vec![Vertex::default(); vertices.len()];
    for (old, vertex) in vertices.iter().enumerate() {
        reordered[remap[old] as usize] = *vertex;
    }
    *vertices = reordered;

    for index in indices.iter_mut() {
        if let Some(&new) = remap.get(*index as usize) {
            *index = new;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use glam::Vec3;

    #[test]
    fn test_remap_first_use_order() {
        let remap = fetch_remap(&[3, 1, 3, 0], 5);
        assert_eq!(remap, vec![2, 1, 3, 0, 4]);
    }

    #[test]
    fn test_remap_ignores_out_of_range() {
        let remap = fetch_remap(&[9, 1, 0], 2);
        assert_eq!(remap, vec![1, 0]);
    }

    #[test]
    fn test_reorder_makes_indices_ascending_on_first_use() {
        let mesh = primitives::scramble_triangles(&primitives::grid(6, 6, 1.0), 9);
        let mut vertices = mesh.vertices.clone();
        let mut indices = mesh.indices.clone();
        reorder_for_fetch(&mut vertices, &mut indices);

        let mut highest = None;
        for &index in &indices {
            if highest.is_none_or(|h| index > h) {
                assert_eq!(index, highest.map_or(0, |h| h + 1));
                highest = Some(index);
            }
        }
    }

    #[test]
    fn test_reorder_preserves_rendered_triangles() {
        let mesh = primitives::scramble_triangles(&primitives::uv_sphere(6, 8, 1.0), 4);
        let mut vertices = mesh.vertices.clone();
        let mut indices = mesh.indices.clone();
        reorder_for_fetch(&mut vertices, &mut indices);

        assert_eq!(vertices.len(), mesh.vertices.len());
        for (&before, &after) in mesh.indices.iter().zip(&indices) {
            assert_eq!(mesh.vertices[before as usize], vertices[after as usize]);
        }
    }

    #[test]
    fn test_reorder_keeps_unreferenced_and_out_of_range() {
        let mut vertices: Vec<Vertex> = (0..4)
            .map(|i| Vertex::from_position(Vec3::splat(i as f32)))
            .collect();
        let mut indices = vec![2, 1, 7];
        reorder_for_fetch(&mut vertices, &mut indices);

        assert_eq!(indices, vec![0, 1, 7]);
        let xs: Vec<f32> = vertices.iter().map(|v| v.position.x).collect();
        assert_eq!(xs, vec![2.0, 1.0, 0.0, 3.0]);
    }
}
