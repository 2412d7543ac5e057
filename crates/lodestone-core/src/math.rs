//! Math utilities
//!
//! Re-exports from glam and the bounding/plane primitives the mesh tools share.

pub use glam::{DMat4, DVec3, DVec4, Vec2, Vec3, Vec4};

use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create an empty AABB
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    /// Create an AABB from min and max corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest AABB enclosing every point, or `EMPTY` for no points
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut result = Self::EMPTY;
        for point in points {
            result.expand_to_include(point);
        }
        result
    }

    /// Get the center of the AABB
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Get the full size of the AABB
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Check if the AABB is empty
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// A box is valid once it encloses at least one point
    pub fn is_valid(&self) -> bool {
        !self.is_empty()
    }

    /// Expand the AABB to include a point
    pub fn expand_to_include(&mut self, point: Vec3) {
        self.min = self.min.min(point);
        self.max = self.max.max(point);
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// A plane in 3D space (ax + by + cz + d = 0)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    /// Unit normal vector
    pub normal: Vec3,
    /// Distance term `d`
    pub distance: f32,
}

impl Plane {
    /// Create a plane from a point and normal
    pub fn from_point_normal(point: Vec3, normal: Vec3) -> Self {
        let normal = normal.normalize();
        Self {
            normal,
            distance: -normal.dot(point),
        }
    }

    /// Plane through three counter-clockwise points.
    ///
    /// Returns `None` when the points are collinear or coincident.
    pub fn from_triangle(p0: Vec3, p1: Vec3, p2: Vec3) -> Option<Self> {
        let normal = (p1 - p0).cross(p2 - p0).try_normalize()?;
        Some(Self {
            normal,
            distance: -normal.dot(p0),
        })
    }

    /// Plane coefficients `[a, b, c, d]` in double precision
    pub fn coefficients(&self) -> DVec4 {
        DVec4::new(
            self.normal.x as f64,
            self.normal.y as f64,
            self.normal.z as f64,
            self.distance as f64,
        )
    }
}

/// Linear interpolation
pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}
