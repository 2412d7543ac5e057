//! # Lodestone Core
//!
//! Shared foundation for the Lodestone mesh optimization tools.
//!
//! This crate provides:
//! - **Math**: glam re-exports, bounding boxes and planes
//! - **Configuration**: explicit settings for the optimizer, simplifier and LOD selection
//!
//! Nothing here holds process-wide state. Every operation in `lodestone-mesh`
//! receives its configuration by reference, so independent meshes can be
//! processed from any thread.

pub mod math;

pub use math::{Aabb, Plane};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default simulated post-transform cache capacity
pub const DEFAULT_CACHE_SIZE: u32 = 32;

/// Configuration errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cache size must be at least 1")]
    ZeroCacheSize,

    #[error("{name} must be a non-negative finite number, got {value}")]
    InvalidThreshold { name: &'static str, value: f32 },

    #[error("Simplification ratio {0} is outside (0, 1]")]
    InvalidRatio(f32),

    #[error("LOD distance {index} ({value}) must be finite, non-negative and ascending")]
    InvalidDistance { index: usize, value: f32 },
}

/// Result type for configuration checks
pub type ConfigResult<T> = Result<T, ConfigError>;

fn check_threshold(name: &'static str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidThreshold { name, value })
    }
}

/// Settings shared by the analyzer and the GPU-order optimizers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Simulated GPU vertex cache capacity (ACMR and cache optimizer)
    pub cache_size: u32,
    /// Per-component tolerance for duplicate vertex removal
    pub duplicate_epsilon: f32,
    /// Triangles with an area at or below this are degenerate
    pub degenerate_area: f32,
    /// Triangles with an area below this are reported as small
    pub small_area: f32,
    /// Longest/shortest edge ratio above which a triangle is thin
    pub thin_aspect_ratio: f32,
    /// Overdraw threshold, accepted for compatibility with clustered overdraw optimizers
    pub overdraw_threshold: f32,
    /// Log before/after summaries at info level
    pub verbose_logging: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cache_size: DEFAULT_CACHE_SIZE,
            duplicate_epsilon: 1e-4,
            degenerate_area: 1e-4,
            small_area: 1e-4,
            thin_aspect_ratio: 10.0,
            overdraw_threshold: 1.05,
            verbose_logging: false,
        }
    }
}

impl OptimizerConfig {
    /// Check every field for a usable value
    pub fn validate(&self) -> ConfigResult<()> {
        if self.cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        check_threshold("duplicate_epsilon", self.duplicate_epsilon)?;
        check_threshold("degenerate_area", self.degenerate_area)?;
        check_threshold("small_area", self.small_area)?;
        check_threshold("thin_aspect_ratio", self.thin_aspect_ratio)?;
        check_threshold("overdraw_threshold", self.overdraw_threshold)?;
        Ok(())
    }

    /// Cache size as a buffer length
    pub fn cache_len(&self) -> usize {
        self.cache_size as usize
    }
}

/// LOD generation and selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LodConfig {
    /// Triangle ratios for LOD 1.. relative to the source mesh
    pub simplification_ratios: Vec<f32>,
    /// Maximum geometric error for error-bounded simplification
    pub max_error: f32,
    /// Keep open-boundary vertices in place during edge collapse
    pub preserve_boundaries: bool,
    /// Switch distances, one per chain level, ascending
    pub lod_distances: Vec<f32>,
    /// When disabled, selection always returns LOD 0
    pub enable_distance_based_selection: bool,
}

impl Default for LodConfig {
    fn default() -> Self {
        Self {
            simplification_ratios: vec![0.75, 0.5, 0.25, 0.1],
            max_error: 0.01,
            preserve_boundaries: true,
            lod_distances: vec![50.0, 100.0, 200.0, 500.0],
            enable_distance_based_selection: true,
        }
    }
}

impl LodConfig {
    /// Check ratios and switch distances
    pub fn validate(&self) -> ConfigResult<()> {
        for &ratio in &self.simplification_ratios {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ConfigError::InvalidRatio(ratio));
            }
        }
        check_threshold("max_error", self.max_error)?;

        let mut previous = 0.0f32;
        for (index, &value) in self.lod_distances.iter().enumerate() {
            if !value.is_finite() || value < previous {
                return Err(ConfigError::InvalidDistance { index, value });
            }
            previous = value;
        }
        Ok(())
    }
}

/// Full optimization pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Analyzer and optimizer settings
    pub optimizer: OptimizerConfig,
    /// LOD chain settings
    pub lod: LodConfig,
}

impl PipelineConfig {
    /// Validate both sections
    pub fn validate(&self) -> ConfigResult<()> {
        self.optimizer.validate()?;
        self.lod.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.optimizer.cache_size, 32);
        assert_eq!(config.optimizer.duplicate_epsilon, 1e-4);
        assert_eq!(config.lod.simplification_ratios, vec![0.75, 0.5, 0.25, 0.1]);
        assert_eq!(config.lod.lod_distances, vec![50.0, 100.0, 200.0, 500.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_cache_size_rejected() {
        let config = OptimizerConfig { cache_size: 0, ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCacheSize));
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let config = OptimizerConfig { thin_aspect_ratio: -1.0, ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidThreshold { name: "thin_aspect_ratio", .. })
        ));
    }

    #[test]
    fn test_ratio_out_of_range_rejected() {
        let config = LodConfig { simplification_ratios: vec![0.5, 1.5], ..Default::default() };
        assert_eq!(config.validate(), Err(ConfigError::InvalidRatio(1.5)));
    }

    #[test]
    fn test_descending_distances_rejected() {
        let config = LodConfig { lod_distances: vec![50.0, 20.0], ..Default::default() };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDistance { index: 1, .. })
        ));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "optimizer": { "cache_size": 16 } }"#).unwrap();
        assert_eq!(config.optimizer.cache_size, 16);
        assert_eq!(config.optimizer.thin_aspect_ratio, 10.0);
        assert_eq!(config.lod, LodConfig::default());
    }
}
