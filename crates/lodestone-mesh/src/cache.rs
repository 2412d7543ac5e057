//! Vertex Cache Simulation
//!
//! A most-recently-used model of the GPU post-transform vertex cache, used as
//! the cost oracle behind ACMR.

use smallvec::SmallVec;

/// Fixed-capacity MRU cache of vertex indices.
///
/// The most recent entry is always at the front and the list never grows
/// beyond its capacity.
#[derive(Debug, Clone)]
pub struct VertexCacheSimulator {
    entries: SmallVec<[u32; 32]>,
    capacity: usize,
    misses: u32,
    accesses: u32,
}

impl VertexCacheSimulator {
    /// Create an empty cache holding up to `capacity` vertices
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity + 1),
            capacity,
            misses: 0,
            accesses: 0,
        }
    }

    /// Touch a vertex; returns `true` on a cache hit
    pub fn access_vertex(&mut self, vertex: u32) -> bool {
        self.accesses += 1;

        if let Some(position) = self.entries.iter().position(|&v| v == vertex) {
            self.entries.remove(position);
            self.entries.insert(0, vertex);
            return true;
        }

        self.misses += 1;
        self.entries.insert(0, vertex);
        self.entries.truncate(self.capacity);
        false
    }

    /// Misses divided by accesses, 0.0 before the first access
    pub fn cache_miss_ratio(&self) -> f32 {
        if self.accesses == 0 {
            return 0.0;
        }
        self.misses as f32 / self.accesses as f32
    }

    /// Clear the cache contents and counters
    pub fn reset(&mut self) {
        self.entries.clear();
        self.misses = 0;
        self.accesses = 0;
    }

    /// Number of misses so far
    pub fn misses(&self) -> u32 {
        self.misses
    }

    /// Number of accesses so far
    pub fn accesses(&self) -> u32 {
        self.accesses
    }

    /// Cached vertices, most recent first
    pub fn entries(&self) -> &[u32] {
        &self.entries
    }

    /// Maximum number of cached vertices
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Average cache miss ratio of streaming `indices` through a fresh cache.
///
/// Returns 0.0 for an empty index buffer.
pub fn calculate_acmr(indices: &[u32], cache_size: usize) -> f32 {
    if indices.is_empty() {
        return 0.0;
    }

    let mut cache = VertexCacheSimulator::new(cache_size);
    for &index in indices {
        cache.access_vertex(index);
    }
    cache.cache_miss_ratio()
}

/// Average transform-to-vertex ratio: indices processed per vertex
pub fn calculate_atvr(indices: &[u32], vertex_count: usize) -> f32 {
    if indices.is_empty() || vertex_count == 0 {
        return 0.0;
    }
    indices.len() as f32 / vertex_count as f32
}
