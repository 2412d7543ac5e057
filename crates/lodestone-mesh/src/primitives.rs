//! Procedural meshes
//!
//! Small generated meshes with known topology, used as benchmark and test
//! input and by the command-line driver.

use glam::{Vec2, Vec3};
use lodestone_core::math::lerp;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::mesh::{Mesh, Vertex};

/// Axis-aligned cube of edge length `size` centered at the origin.
///
/// Four vertices per face so every face has its own normal and UVs
/// (24 vertices, 12 triangles).
pub fn cube(size: f32) -> Mesh {
    // (normal, u axis, v axis) with u × v = normal
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let corners = [
        (Vec2::new(-1.0, -1.0), Vec2::new(0.0, 0.0)),
        (Vec2::new(1.0, -1.0), Vec2::new(1.0, 0.0)),
        (Vec2::new(1.0, 1.0), Vec2::new(1.0, 1.0)),
        (Vec2::new(-1.0, 1.0), Vec2::new(0.0, 1.0)),
    ];

    let half = size * 0.5;
    let mut vertices = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        for (offset, uv) in corners {
            let position = (normal + u * offset.x + v * offset.y) * half;
            vertices.push(Vertex::new(position, normal, uv));
        }
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    Mesh::new(vertices, indices).with_name("cube")
}

/// Flat `columns` × `rows` grid in the XY plane facing +Z, emitted row by row
pub fn grid(columns: u32, rows: u32, size: f32) -> Mesh {
    let columns = columns.max(1);
    let rows = rows.max(1);
    let half = size * 0.5;
    let stride = columns + 1;

    let mut vertices = Vec::with_capacity((stride * (rows + 1)) as usize);
    for j in 0..=rows {
        for i in 0..=columns {
            let u = i as f32 / columns as f32;
            let v = j as f32 / rows as f32;
            let position = Vec3::new(lerp(-half, half, u), lerp(-half, half, v), 0.0);
            vertices.push(Vertex::new(position, Vec3::Z, Vec2::new(u, v)));
        }
    }

    let mut indices = Vec::with_capacity((columns * rows * 6) as usize);
    for j in 0..rows {
        for i in 0..columns {
            let v00 = j * stride + i;
            let v10 = v00 + 1;
            let v01 = v00 + stride;
            let v11 = v01 + 1;
            indices.extend_from_slice(&[v00, v10, v11, v00, v11, v01]);
        }
    }

    Mesh::new(vertices, indices).with_name(format!("grid_{columns}x{rows}"))
}

/// Latitude/longitude sphere with outward winding.
///
/// Pole and seam vertices are duplicated per segment (distinct UVs); the
/// zero-area triangles a naive pole fan would create are not emitted.
pub fn uv_sphere(rings: u32, segments: u32, radius: f32) -> Mesh {
    let rings = rings.max(2);
    let segments = segments.max(3);
    let stride = segments + 1;

    let mut vertices = Vec::with_capacity((stride * (rings + 1)) as usize);
    for r in 0..=rings {
        let v = r as f32 / rings as f32;
        let theta = v * std::f32::consts::PI;
        for s in 0..=segments {
            let u = s as f32 / segments as f32;
            let phi = u * std::f32::consts::TAU;
            let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
            vertices.push(Vertex::new(normal * radius, normal, Vec2::new(u, v)));
        }
    }

    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);
    for r in 0..rings {
        for s in 0..segments {
            let a = r * stride + s;
            let b = a + stride;
            if r != 0 {
                indices.extend_from_slice(&[a, a + 1, b]);
            }
            if r != rings - 1 {
                indices.extend_from_slice(&[a + 1, b + 1, b]);
            }
        }
    }

    Mesh::new(vertices, indices).with_name(format!("sphere_{rings}x{segments}"))
}

/// Copy of `mesh` with its triangles in a seeded random order
pub fn scramble_triangles(mesh: &Mesh, seed: u64) -> Mesh {
    let mut triangles: Vec<[u32; 3]> = mesh
        .indices
        .chunks_exact(3)
        .map(|t| [t[0], t[1], t[2]])
        .collect();

    let mut rng = StdRng::seed_from_u64(seed);
    triangles.shuffle(&mut rng);

    let mut scrambled = mesh.clone();
    scrambled.indices = triangles.into_iter().flatten().collect();
    scrambled
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_topology() {
        let mesh = cube(2.0);
        assert_eq!(mesh.vertex_count(), 24);
        assert_eq!(mesh.triangle_count(), 12);
        for (index, triangle) in mesh.triangles().enumerate() {
            let face_normal = mesh.vertices[mesh.indices[index * 3] as usize].normal;
            assert!((triangle.normal() - face_normal).length() < 1e-5);
            assert!((triangle.area() - 2.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_grid_faces_positive_z() {
        let mesh = grid(4, 3, 1.0);
        assert_eq!(mesh.vertex_count(), 20);
        assert_eq!(mesh.triangle_count(), 24);
        assert!(mesh.triangles().all(|t| t.normal().z > 0.99));
    }

    #[test]
    fn test_sphere_winding_outward() {
        let mesh = uv_sphere(6, 8, 2.0);
        assert_eq!(mesh.triangle_count(), (2 * 6 - 2) * 8);
        for triangle in mesh.triangles() {
            assert!(triangle.area() > 1e-4);
            assert!(triangle.normal().dot(triangle.centroid()) > 0.0);
        }
    }

    #[test]
    fn test_scramble_is_deterministic_permutation() {
        let mesh = grid(5, 5, 1.0);
        let a = scramble_triangles(&mesh, 42);
        let b = scramble_triangles(&mesh, 42);
        assert_eq!(a, b);
        assert_ne!(a.indices, mesh.indices);

        let mut original: Vec<_> = mesh.indices.chunks_exact(3).collect();
        let mut shuffled: Vec<_> = a.indices.chunks_exact(3).collect();
        original.sort();
        shuffled.sort();
        assert_eq!(original, shuffled);
    }
}
