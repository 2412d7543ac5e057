//! Vertex attribute processing
//!
//! Duplicate vertex welding and normal/tangent generation.

use ahash::AHashMap;
use glam::Vec3;
use smallvec::SmallVec;

use crate::mesh::{Mesh, Triangle, Vertex};

/// UV-space determinants below this mean the mapping cannot orient a tangent
const UV_DETERMINANT_EPSILON: f32 = 1e-8;

type CellKey = [i64; 3];

/// Cells saturate at the `i64` range, so huge and infinite coordinates share
/// the outermost cells and are told apart by the exact comparison.
fn cell_key(position: Vec3, epsilon: f32) -> CellKey {
    if epsilon > 0.0 {
        let cell = (position / epsilon).floor();
        [cell.x as i64, cell.y as i64, cell.z as i64]
    } else {
        // Adding +0.0 folds -0.0 into +0.0
        let p = position + Vec3::ZERO;
        [p.x.to_bits() as i64, p.y.to_bits() as i64, p.z.to_bits() as i64]
    }
}

/// Merge vertices whose attributes all agree within `epsilon`.
///
/// Each vertex maps to the lowest-numbered unique vertex it nearly equals,
/// exactly as a pairwise scan would, but candidates come from a spatial hash
/// of `epsilon`-sized cells. With `epsilon <= 0.0` only exact matches merge.
/// Out-of-range indices are left untouched. Returns the number of vertices
/// removed.
pub fn remove_duplicate_vertices(mesh: &mut Mesh, epsilon: f32) -> usize {
    let original_count = mesh.vertices.len();
    if original_count == 0 {
        return 0;
    }

    let tolerance = epsilon.max(0.0);
    let reach: i64 = if epsilon > 0.0 { 1 } else { 0 };

    let mut cells: AHashMap<CellKey, SmallVec<[u32; 4]>> = AHashMap::with_capacity(original_count);
    let mut unique: Vec<Vertex> = Vec::with_capacity(original_count);
    let mut remap: Vec<u32> = Vec::with_capacity(original_count);

    for vertex in &mesh.vertices {
        let key = cell_key(vertex.position, epsilon);

        let mut found: Option<u32> = None;
        for dx in -reach..=reach {
            for dy in -reach..=reach {
                for dz in -reach..=reach {
                    let neighbour = [
                        key[0].saturating_add(dx),
                        key[1].saturating_add(dy),
                        key[2].saturating_add(dz),
                    ];
                    let Some(candidates) = cells.get(&neighbour) else {
                        continue;
                    };
                    for &candidate in candidates {
                        if found.is_some_and(|f| f <= candidate) {
                            continue;
                        }
                        if unique[candidate as usize].is_nearly_equal(vertex, tolerance) {
                            found = Some(candidate);
                        }
                    }
                }
            }
        }

        let index = match found {
            Some(index) => index,
            None => {
                let index = unique.len() as u32;
                unique.push(*vertex);
                cells.entry(key).or_default().push(index);
                index
            }
        };
        remap.push(index);
    }

    for index in &mut mesh.indices {
        if let Some(&new) = remap.get(*index as usize) {
            *index = new;
        }
    }

    let removed = original_count - unique.len();
    mesh.vertices = unique;

    log::debug!("Removed {removed} duplicate vertices ({original_count} -> {})", mesh.vertices.len());
    removed
}

/// Recompute vertex normals from the triangles.
///
/// Smooth normals accumulate area-weighted face normals per vertex; flat
/// normals give every corner its face normal, so on shared vertices the last
/// triangle wins. Zero-area triangles contribute nothing.
pub fn generate_normals(mesh: &mut Mesh, smooth: bool) {
    let vertex_count = mesh.vertices.len();
    let mut normals = vec![Vec3::ZERO; vertex_count];

    for corners in mesh.indices.chunks_exact(3) {
        let Some(triangle) = Triangle::from_indices(&mesh.vertices, corners) else {
            continue;
        };

        // |cross| is twice the area, so the unnormalized normal is area-weighted
        let weighted = triangle.scaled_normal();
        if weighted.length_squared() <= f32::EPSILON * f32::EPSILON {
            continue;
        }

        for &index in corners {
            let slot = &mut normals[index as usize];
            if smooth {
                *slot += weighted;
            } else {
                *slot = weighted;
            }
        }
    }

    for (vertex, normal) in mesh.vertices.iter_mut().zip(normals) {
        vertex.normal = normal.normalize_or_zero();
    }

    log::debug!(
        "Generated {} normals for {vertex_count} vertices",
        if smooth { "smooth" } else { "flat" }
    );
}

/// Compute per-vertex tangents and bitangents from texture coordinates.
///
/// Triangles with a degenerate UV mapping are skipped. Tangents are made
/// orthogonal to the vertex normal when the vertex has one.
pub fn generate_tangents(mesh: &mut Mesh) {
    let vertex_count = mesh.vertices.len();
    let mut tangents = vec![Vec3::ZERO; vertex_count];
    let mut bitangents = vec![Vec3::ZERO; vertex_count];
    let mut skipped = 0usize;

    for corners in mesh.indices.chunks_exact(3) {
        let [Some(v0), Some(v1), Some(v2)] = [
            mesh.vertices.get(corners[0] as usize),
            mesh.vertices.get(corners[1] as usize),
            mesh.vertices.get(corners[2] as usize),
        ] else {
            continue;
        };

        let edge1 = v1.position - v0.position;
        let edge2 = v2.position - v0.position;
        let duv1 = v1.tex_coords - v0.tex_coords;
        let duv2 = v2.tex_coords - v0.tex_coords;

        let determinant = duv1.x * duv2.y - duv2.x * duv1.y;
        if determinant.abs() < UV_DETERMINANT_EPSILON {
            skipped += 1;
            continue;
        }

        let r = 1.0 / determinant;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
        let bitangent = (edge2 * duv1.x - edge1 * duv2.x) * r;

        for &index in corners {
            tangents[index as usize] += tangent;
            bitangents[index as usize] += bitangent;
        }
    }

    for (i, vertex) in mesh.vertices.iter_mut().enumerate() {
        let mut tangent = tangents[i];
        let normal = vertex.normal;
        if normal.length_squared() > 0.0 {
            let n = normal.normalize();
            tangent -= n * n.dot(tangent);
        }
        vertex.tangent = tangent.normalize_or_zero();
        vertex.bitangent = bitangents[i].normalize_or_zero();
    }

    if skipped > 0 {
        log::debug!("Skipped {skipped} triangles with degenerate UVs during tangent generation");
    }
}

/// Negate every vertex normal
pub fn flip_normals(mesh: &mut Mesh) {
    for vertex in &mut mesh.vertices {
        vertex.normal = -vertex.normal;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives;
    use glam::Vec2;

    #[test]
    fn test_cube_without_attributes_welds_to_corners() {
        let mut mesh = primitives::cube(1.0);
        for vertex in &mut mesh.vertices {
            *vertex = Vertex::from_position(vertex.position);
        }

        let removed = remove_duplicate_vertices(&mut mesh, 1e-4);
        assert_eq!(removed, 16);
        assert_eq!(mesh.vertex_count(), 8);
        assert_eq!(mesh.triangle_count(), 12);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < 8));
    }

    #[test]
    fn test_distinct_normals_are_kept() {
        let mut mesh = primitives::cube(1.0);
        assert_eq!(remove_duplicate_vertices(&mut mesh, 1e-4), 0);
        assert_eq!(mesh.vertex_count(), 24);
    }

    #[test]
    fn test_dedup_maps_to_lowest_match() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::from_position(Vec3::new(0.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(0.00005, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1.00005, 0.0, 0.0)),
            ],
            vec![2, 3, 1, 0, 9],
        );
        assert_eq!(remove_duplicate_vertices(&mut mesh, 1e-4), 2);
        assert_eq!(mesh.indices, vec![0, 1, 1, 0, 9]);
    }

    #[test]
    fn test_dedup_across_cell_boundary() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::from_position(Vec3::splat(0.99995)),
                Vertex::from_position(Vec3::splat(1.00004)),
            ],
            vec![0, 1, 0],
        );
        assert_eq!(remove_duplicate_vertices(&mut mesh, 1e-4), 1);
        assert_eq!(mesh.indices, vec![0, 0, 0]);
    }

    #[test]
    fn test_dedup_with_extreme_coordinates() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::from_position(Vec3::new(1e16, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(f32::INFINITY, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(-f32::INFINITY, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1e16, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(f32::NAN, 0.0, 0.0)),
                Vertex::from_position(Vec3::ZERO),
            ],
            vec![0, 1, 2, 3, 4, 5],
        );
        // Only the finite pair matches; inf - inf is NaN and never within tolerance
        assert_eq!(remove_duplicate_vertices(&mut mesh, 1e-4), 1);
        assert_eq!(mesh.indices, vec![0, 1, 2, 0, 3, 4]);
        assert_eq!(mesh.vertex_count(), 5);
    }

    #[test]
    fn test_exact_dedup_with_zero_epsilon() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::from_position(Vec3::new(0.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(-0.0, 0.0, 0.0)),
                Vertex::from_position(Vec3::new(1e-6, 0.0, 0.0)),
            ],
            vec![0, 1, 2],
        );
        assert_eq!(remove_duplicate_vertices(&mut mesh, 0.0), 1);
        assert_eq!(mesh.indices, vec![0, 0, 1]);
    }

    #[test]
    fn test_smooth_normals_on_grid() {
        let mut mesh = primitives::grid(3, 3, 1.0);
        for vertex in &mut mesh.vertices {
            vertex.normal = Vec3::ZERO;
        }
        generate_normals(&mut mesh, true);
        for vertex in &mesh.vertices {
            assert!((vertex.normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn test_flat_normals_match_faces() {
        let mut mesh = primitives::cube(2.0);
        let expected: Vec<Vec3> = mesh.vertices.iter().map(|v| v.normal).collect();
        flip_normals(&mut mesh);
        generate_normals(&mut mesh, false);
        for (vertex, normal) in mesh.vertices.iter().zip(expected) {
            assert!((vertex.normal - normal).length() < 1e-5);
        }
    }

    #[test]
    fn test_zero_area_faces_leave_zero_normals() {
        let mut mesh = Mesh::new(
            vec![Vertex::from_position(Vec3::ZERO), Vertex::from_position(Vec3::X), Vertex::from_position(Vec3::X * 2.0)],
            vec![0, 1, 2],
        );
        generate_normals(&mut mesh, true);
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::ZERO));
    }

    #[test]
    fn test_flip_normals() {
        let mut mesh = primitives::grid(1, 1, 1.0);
        flip_normals(&mut mesh);
        assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::NEG_Z));
    }

    #[test]
    fn test_tangents_follow_uv_axes() {
        let mut mesh = primitives::grid(2, 2, 1.0);
        generate_tangents(&mut mesh);
        for vertex in &mesh.vertices {
            assert!((vertex.tangent - Vec3::X).length() < 1e-5);
            assert!((vertex.bitangent - Vec3::Y).length() < 1e-5);
            assert!(vertex.tangent.dot(vertex.normal).abs() < 1e-5);
        }
    }

    #[test]
    fn test_degenerate_uvs_skipped() {
        let mut mesh = Mesh::new(
            vec![
                Vertex::new(Vec3::ZERO, Vec3::Z, Vec2::ZERO),
                Vertex::new(Vec3::X, Vec3::Z, Vec2::ZERO),
                Vertex::new(Vec3::Y, Vec3::Z, Vec2::ZERO),
            ],
            vec![0, 1, 2],
        );
        generate_tangents(&mut mesh);
        assert!(mesh.vertices.iter().all(|v| v.tangent == Vec3::ZERO));
    }
}
