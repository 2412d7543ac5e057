//! Mesh Simplification
//!
//! Two reducers behind one interface:
//! - **Edge collapse** (default): greedy quadric error metric collapse. Each
//!   vertex carries the sum of the plane quadrics of its triangles and the
//!   cheapest edge is collapsed onto whichever endpoint fits both quadrics
//!   best, so vertex positions never change and only the index buffer shrinks.
//! - **Decimate**: a deterministic stride filter that drops every n-th
//!   triangle. Fast and predictable, with no regard for shape.
//!
//! Edge collapse works on the position-welded surface: vertices that differ
//! only in normal or UV (flat-shaded edges, texture seams) move together, and
//! each surviving corner then picks the copy of its new position whose
//! attributes best match the vertex it replaces.
//!
//! Neither reducer compacts the vertex buffer; unreferenced vertices remain.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::ops::{Add, AddAssign};

use ahash::AHashMap;
use glam::{DMat4, DVec3, DVec4, Vec3};
use lodestone_core::{LodConfig, Plane};
use smallvec::SmallVec;

use crate::mesh::{Mesh, Triangle, Vertex};

/// Symmetric 4×4 matrix measuring squared distance to a set of planes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric(DMat4);

impl Default for Quadric {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Quadric {
    /// Quadric of no planes
    pub const ZERO: Self = Self(DMat4::ZERO);

    /// Outer product of plane coefficients `[a, b, c, d]`
    pub fn from_coefficients(plane: DVec4) -> Self {
        Self(DMat4::from_cols(
            plane * plane.x,
            plane * plane.y,
            plane * plane.z,
            plane * plane.w,
        ))
    }

    /// Quadric of the plane through `point` with normal `normal`
    pub fn from_plane(normal: Vec3, point: Vec3) -> Self {
        Self::from_coefficients(Plane::from_point_normal(point, normal).coefficients())
    }

    /// Quadric of a triangle's supporting plane; zero for degenerate triangles
    pub fn from_triangle(triangle: &Triangle) -> Self {
        let [a, b, c] = triangle.positions;
        Plane::from_triangle(a, b, c).map_or(Self::ZERO, |plane| Self::from_coefficients(plane.coefficients()))
    }

    /// Sum of squared plane distances at `point`
    pub fn error(&self, point: DVec3) -> f64 {
        let v = point.extend(1.0);
        v.dot(self.0 * v)
    }

    pub fn matrix(&self) -> &DMat4 {
        &self.0
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, other: Quadric) -> Quadric {
        Quadric(self.0 + other.0)
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, other: Quadric) {
        self.0 += other.0;
    }
}

/// Cost of merging two vertices with quadrics `qa` and `qb` at `target`
pub fn edge_collapse_cost(qa: &Quadric, qb: &Quadric, target: DVec3) -> f64 {
    (*qa + *qb).error(target)
}

/// Cost of merging `a` and `b` at their midpoint
pub fn midpoint_collapse_cost(a: DVec3, b: DVec3, qa: &Quadric, qb: &Quadric) -> f64 {
    edge_collapse_cost(qa, qb, (a + b) * 0.5)
}

/// Reduction algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimplifyMethod {
    /// Greedy quadric error metric edge collapse
    #[default]
    EdgeCollapse,
    /// Stride decimation in index order
    Decimate,
}

/// Simplifier settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimplifyOptions {
    pub method: SimplifyMethod,
    /// Never move vertices that lie on an open edge (edge collapse only)
    pub preserve_boundaries: bool,
}

impl Default for SimplifyOptions {
    fn default() -> Self {
        Self {
            method: SimplifyMethod::EdgeCollapse,
            preserve_boundaries: true,
        }
    }
}

impl From<&LodConfig> for SimplifyOptions {
    fn from(config: &LodConfig) -> Self {
        Self {
            preserve_boundaries: config.preserve_boundaries,
            ..Default::default()
        }
    }
}

/// Fraction of triangles kept by error-bounded simplification
const ERROR_BOUNDED_RATIO: f32 = 0.1;

fn target_for_ratio(triangle_count: usize, ratio: f32) -> usize {
    ((triangle_count as f32 * ratio).round() as usize).max(1)
}

/// Reduces meshes to a triangle budget
#[derive(Debug, Clone, Default)]
pub struct Simplifier {
    options: SimplifyOptions,
}

impl Simplifier {
    pub fn new(options: SimplifyOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &SimplifyOptions {
        &self.options
    }

    /// Keep roughly `ratio` of the triangles; `ratio >= 1` returns a copy
    pub fn simplify(&self, mesh: &Mesh, ratio: f32) -> Mesh {
        if ratio >= 1.0 {
            return mesh.clone();
        }
        let target = target_for_ratio(mesh.triangle_count(), ratio);
        self.simplify_to_triangle_count(mesh, target)
    }

    /// Reduce toward 10% of the triangles, stopping early once the next edge
    /// collapse would move the surface by more than `max_error`.
    ///
    /// The stride decimator has no error measure and only honours the budget.
    pub fn simplify_to_target_error(&self, mesh: &Mesh, max_error: f32) -> Mesh {
        let target = target_for_ratio(mesh.triangle_count(), ERROR_BOUNDED_RATIO);
        self.reduce(mesh, target, Some(max_error as f64))
    }

    /// Reduce to `target` triangles.
    ///
    /// A target at or above the current count returns an unmodified copy. When
    /// edge collapse runs out of legal collapses above the target, the
    /// remaining collapsible triangles are stride-decimated to land on it.
    pub fn simplify_to_triangle_count(&self, mesh: &Mesh, target: usize) -> Mesh {
        self.reduce(mesh, target, None)
    }

    fn reduce(&self, mesh: &Mesh, target: usize, max_error: Option<f64>) -> Mesh {
        let current = mesh.triangle_count();
        if target >= current {
            return mesh.clone();
        }

        let indices = match self.options.method {
            SimplifyMethod::Decimate => decimate(&mesh.indices, target),
            SimplifyMethod::EdgeCollapse => {
                let mut collapser = EdgeCollapser::new(mesh, self.options.preserve_boundaries);
                collapser.run(target, max_error);
                if max_error.is_none() {
                    collapser.decimate_remaining(target);
                }
                collapser.into_indices(mesh)
            }
        };

        log::debug!(
            "Simplified '{}' ({:?}): {} -> {} triangles (target {target})",
            mesh.name,
            self.options.method,
            current,
            indices.len() / 3
        );

        Mesh {
            name: mesh.name.clone(),
            vertices: mesh.vertices.clone(),
            indices,
        }
    }
}

/// Drop every `step`-th triangle until `target` remain
fn decimate(indices: &[u32], target: usize) -> Vec<u32> {
    let current = indices.len() / 3;
    let to_remove = current - target;
    let step = (current / to_remove).max(1);

    let mut removed = 0;
    let mut result = Vec::with_capacity(target * 3);
    for (i, corners) in indices.chunks_exact(3).enumerate() {
        if i % step != 0 || removed >= to_remove {
            result.extend_from_slice(corners);
        } else {
            removed += 1;
        }
    }
    result.truncate(target * 3);
    result
}

/// Heap entry: collapse `from` onto `to`
#[derive(Debug, Clone, Copy)]
struct Collapse {
    cost: f64,
    from: u32,
    to: u32,
    from_version: u32,
    to_version: u32,
}

impl PartialEq for Collapse {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Collapse {}

impl PartialOrd for Collapse {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Collapse {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the max-heap pops the cheapest collapse first
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| (other.from, other.to).cmp(&(self.from, self.to)))
    }
}

type Neighbours = SmallVec<[u32; 16]>;

/// Bit pattern of a position with -0.0 folded into +0.0
fn position_key(position: Vec3) -> [u32; 3] {
    (position + Vec3::ZERO).to_array().map(f32::to_bits)
}

/// How far apart two copies of one position are in shading attributes
fn attribute_distance(a: &Vertex, b: &Vertex) -> f32 {
    a.normal.distance_squared(b.normal)
        + a.tex_coords.distance_squared(b.tex_coords)
        + a.color.distance_squared(b.color)
}

/// Working state of one quadric simplification run
struct EdgeCollapser {
    positions: Vec<DVec3>,
    /// Lowest-numbered vertex sharing each vertex's position
    welded: Vec<u32>,
    /// Vertices welded onto each representative, ascending
    copies: Vec<SmallVec<[u32; 4]>>,
    /// Current welded corners of every triangle in the input
    triangles: Vec<[u32; 3]>,
    /// Triangle takes part in collapsing (in range, three distinct welded corners)
    active: Vec<bool>,
    alive: Vec<bool>,
    incident: Vec<SmallVec<[u32; 8]>>,
    quadrics: Vec<Quadric>,
    versions: Vec<u32>,
    collapsed: Vec<bool>,
    boundary: Vec<bool>,
    preserve_boundaries: bool,
    triangle_count: usize,
}

impl EdgeCollapser {
    fn new(mesh: &Mesh, preserve_boundaries: bool) -> Self {
        let vertex_count = mesh.vertex_count();
        let positions: Vec<DVec3> = mesh.positions().map(|p| p.as_dvec3()).collect();

        let mut first_at: AHashMap<[u32; 3], u32> = AHashMap::with_capacity(vertex_count);
        let mut welded = Vec::with_capacity(vertex_count);
        let mut copies: Vec<SmallVec<[u32; 4]>> = vec![SmallVec::new(); vertex_count];
        for (index, position) in mesh.positions().enumerate() {
            let representative = *first_at.entry(position_key(position)).or_insert(index as u32);
            welded.push(representative);
            copies[representative as usize].push(index as u32);
        }

        let in_range = |t: &[u32]| t.iter().all(|&v| (v as usize) < vertex_count);
        let active: Vec<bool> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| {
                in_range(t) && {
                    let [a, b, c] = [t[0], t[1], t[2]].map(|v| welded[v as usize]);
                    a != b && b != c && a != c
                }
            })
            .collect();

        let triangles: Vec<[u32; 3]> = mesh
            .indices
            .chunks_exact(3)
            .map(|t| {
                if in_range(t) {
                    [t[0], t[1], t[2]].map(|v| welded[v as usize])
                } else {
                    [t[0], t[1], t[2]]
                }
            })
            .collect();

        let mut incident: Vec<SmallVec<[u32; 8]>> = vec![SmallVec::new(); vertex_count];
        let mut quadrics = vec![Quadric::ZERO; vertex_count];
        let mut edge_use: AHashMap<(u32, u32), u32> = AHashMap::new();

        for (t, corners) in triangles.iter().enumerate() {
            if !active[t] {
                continue;
            }
            let quadric = mesh.triangle(t).map_or(Quadric::ZERO, |tri| Quadric::from_triangle(&tri));
            for i in 0..3 {
                let v = corners[i];
                incident[v as usize].push(t as u32);
                quadrics[v as usize] += quadric;
                *edge_use.entry(edge_key(v, corners[(i + 1) % 3])).or_insert(0) += 1;
            }
        }

        // Open and non-manifold edges of the welded surface pin their vertices
        let mut boundary = vec![false; vertex_count];
        for (&(a, b), &uses) in &edge_use {
            if uses != 2 {
                boundary[a as usize] = true;
                boundary[b as usize] = true;
            }
        }

        let triangle_count = active.iter().filter(|&&a| a).count();

        Self {
            positions,
            welded,
            copies,
            triangles,
            alive: active.clone(),
            active,
            incident,
            quadrics,
            versions: vec![0; vertex_count],
            collapsed: vec![false; vertex_count],
            boundary,
            preserve_boundaries,
            triangle_count,
        }
    }

    /// Collapse edges until at most `target` triangles remain (fixed
    /// triangles included), the candidates run out, or the cheapest
    /// collapse exceeds `max_error`.
    fn run(&mut self, target: usize, max_error: Option<f64>) {
        let fixed = self.active.iter().filter(|&&a| !a).count();

        let mut heap = BinaryHeap::new();
        for t in 0..self.triangles.len() {
            if !self.active[t] {
                continue;
            }
            let corners = self.triangles[t];
            for i in 0..3 {
                let (a, b) = (corners[i], corners[(i + 1) % 3]);
                // Each interior edge is seen from both triangles; push it once
                if a < b || self.is_open_edge(a, b) {
                    if let Some(collapse) = self.evaluate(a, b) {
                        heap.push(collapse);
                    }
                }
            }
        }

        while self.triangle_count + fixed > target {
            let Some(collapse) = heap.pop() else {
                break;
            };

            let (from, to) = (collapse.from as usize, collapse.to as usize);
            if self.collapsed[from]
                || self.collapsed[to]
                || self.versions[from] != collapse.from_version
                || self.versions[to] != collapse.to_version
            {
                continue;
            }

            if max_error.is_some_and(|max| collapse.cost.sqrt() > max) {
                break;
            }

            if !self.satisfies_link_condition(collapse.from, collapse.to)
                || self.flips_triangle(collapse.from, collapse.to)
            {
                continue;
            }

            self.apply(collapse.from, collapse.to);

            for neighbour in self.neighbours(collapse.to) {
                if let Some(candidate) = self.evaluate(collapse.to, neighbour) {
                    heap.push(candidate);
                }
            }
        }
    }

    /// Stride-drop collapsible triangles until at most `target` remain
    fn decimate_remaining(&mut self, target: usize) {
        let fixed = self.active.len() - self.active.iter().filter(|&&a| a).count();
        let excess = (self.triangle_count + fixed).saturating_sub(target);
        if excess == 0 {
            return;
        }

        let step = (self.triangle_count / excess).max(1);
        let mut removed = 0;
        let mut seen = 0;
        for t in 0..self.alive.len() {
            if removed == excess {
                break;
            }
            if !self.alive[t] {
                continue;
            }
            if seen % step == 0 {
                self.alive[t] = false;
                self.triangle_count -= 1;
                removed += 1;
            }
            seen += 1;
        }

        log::debug!("Edge collapse stalled; decimated {removed} remaining triangles");
    }

    fn is_open_edge(&self, a: u32, b: u32) -> bool {
        self.shared_triangles(a, b) < 2
    }

    /// Cheapest allowed direction for collapsing the edge `a`–`b`
    fn evaluate(&self, a: u32, b: u32) -> Option<Collapse> {
        let quadric = self.quadrics[a as usize] + self.quadrics[b as usize];

        let mut best: Option<Collapse> = None;
        for (from, to) in [(b, a), (a, b)] {
            if self.preserve_boundaries && self.boundary[from as usize] {
                continue;
            }
            let cost = quadric.error(self.positions[to as usize]).max(0.0);
            if best.is_none_or(|current| cost < current.cost) {
                best = Some(Collapse {
                    cost,
                    from,
                    to,
                    from_version: self.versions[from as usize],
                    to_version: self.versions[to as usize],
                });
            }
        }
        best
    }

    fn live_incident(&self, v: u32) -> impl Iterator<Item = u32> + '_ {
        self.incident[v as usize]
            .iter()
            .copied()
            .filter(|&t| self.alive[t as usize])
    }

    fn neighbours(&self, v: u32) -> Neighbours {
        let mut result = Neighbours::new();
        for t in self.live_incident(v) {
            for corner in self.triangles[t as usize] {
                if corner != v && !result.contains(&corner) {
                    result.push(corner);
                }
            }
        }
        result
    }

    fn shared_triangles(&self, a: u32, b: u32) -> usize {
        self.live_incident(a)
            .filter(|&t| self.triangles[t as usize].contains(&b))
            .count()
    }

    /// Collapsing must not pinch the surface: the endpoints may share only
    /// the neighbours opposite the edge
    fn satisfies_link_condition(&self, from: u32, to: u32) -> bool {
        let shared_triangles = self.shared_triangles(from, to);
        if shared_triangles == 0 {
            return false;
        }

        let to_neighbours = self.neighbours(to);
        let shared_neighbours = self
            .neighbours(from)
            .iter()
            .filter(|n| to_neighbours.contains(*n))
            .count();
        shared_neighbours <= shared_triangles
    }

    /// Whether moving `from` onto `to` turns any surviving triangle over or flat
    fn flips_triangle(&self, from: u32, to: u32) -> bool {
        let target = self.positions[to as usize];
        self.live_incident(from).any(|t| {
            let corners = self.triangles[t as usize];
            if corners.contains(&to) {
                return false;
            }
            let [a, b, c] = corners.map(|v| self.positions[v as usize]);
            let before = (b - a).cross(c - a);
            let [a, b, c] = corners.map(|v| {
                if v == from { target } else { self.positions[v as usize] }
            });
            let after = (b - a).cross(c - a);
            before.dot(after) <= 0.0
        })
    }

    fn apply(&mut self, from: u32, to: u32) {
        self.collapsed[from as usize] = true;

        let incident = std::mem::take(&mut self.incident[from as usize]);
        for t in incident {
            let slot = t as usize;
            if !self.alive[slot] {
                continue;
            }
            if self.triangles[slot].contains(&to) {
                self.alive[slot] = false;
                self.triangle_count -= 1;
            } else {
                for corner in &mut self.triangles[slot] {
                    if *corner == from {
                        *corner = to;
                    }
                }
                self.incident[to as usize].push(t);
            }
        }

        let alive = &self.alive;
        self.incident[to as usize].retain(|t| alive[*t as usize]);

        let merged = self.quadrics[from as usize];
        self.quadrics[to as usize] += merged;
        self.versions[to as usize] += 1;
    }

    /// Vertex for a corner that was `original` and now sits at welded `current`
    fn resolve_corner(&self, vertices: &[Vertex], original: u32, current: u32) -> u32 {
        if self.welded[original as usize] == current {
            return original;
        }

        let reference = &vertices[original as usize];
        let mut best = current;
        let mut best_distance = f32::INFINITY;
        for &copy in &self.copies[current as usize] {
            let distance = attribute_distance(reference, &vertices[copy as usize]);
            if distance < best_distance {
                best = copy;
                best_distance = distance;
            }
        }
        best
    }

    /// Surviving triangles in input order, followed by any partial triangle
    fn into_indices(self, mesh: &Mesh) -> Vec<u32> {
        let original = &mesh.indices;
        let mut result = Vec::with_capacity(original.len());
        for (t, corners) in self.triangles.iter().enumerate() {
            let source = &original[t * 3..t * 3 + 3];
            if !self.active[t] {
                result.extend_from_slice(source);
            } else if self.alive[t] {
                for (&before, &after) in source.iter().zip(corners) {
                    result.push(self.resolve_corner(&mesh.vertices, before, after));
                }
            }
        }
        result.extend_from_slice(original.chunks_exact(3).remainder());
        result
    }
}

fn edge_key(a: u32, b: u32) -> (u32, u32) {
    if a < b { (a, b) } else { (b, a) }
}
