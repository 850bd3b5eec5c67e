//! Configuration for the tile pyramid
//!
//! Every toggle the resolution engine reads lives in [`PyramidOptions`], which
//! is handed to the pyramid at construction and threaded down to the nodes.
//! Presets are available through [`PyramidProfile`].

use crate::core::constants::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_MAX_BYTES, DEFAULT_DRILL_BIAS,
    DEFAULT_GRID_SAMPLE_DISTANCE, MAX_MESH_SUBDIVISIONS, MESH_SUBDIVISION_LIMIT,
};
use crate::{PyramidError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub enum PyramidProfile {
    Balanced,
    LowMemory,
    HighQuality,
    Custom(PyramidOptions),
}

impl PyramidProfile {
    pub fn resolve(&self) -> PyramidOptions {
        match self {
            Self::Balanced => PyramidOptions {
                hardware_transforms: true,
                texture_borrow: true,
                texture_copy: true,
                texture_cache: true,
                fallback_loads: FallbackLoadPolicy::UnresolvableChildren,
                cache_capacity: DEFAULT_CACHE_CAPACITY,
                cache_max_bytes: DEFAULT_CACHE_MAX_BYTES,
                drill_bias: DEFAULT_DRILL_BIAS,
                grid_sample_distance: DEFAULT_GRID_SAMPLE_DISTANCE,
                max_mesh_subdivisions: MAX_MESH_SUBDIVISIONS,
                draw_path: DrawPath::Batched,
                color: [1.0, 1.0, 1.0, 1.0],
            },
            Self::LowMemory => PyramidOptions {
                hardware_transforms: true,
                texture_borrow: true,
                texture_copy: false,
                texture_cache: true,
                fallback_loads: FallbackLoadPolicy::Disabled,
                cache_capacity: 64,
                cache_max_bytes: 16 * 1024 * 1024,
                drill_bias: 1.0,
                grid_sample_distance: 1.0,
                max_mesh_subdivisions: 8,
                draw_path: DrawPath::Batched,
                color: [1.0, 1.0, 1.0, 1.0],
            },
            Self::HighQuality => PyramidOptions {
                hardware_transforms: true,
                texture_borrow: true,
                texture_copy: true,
                texture_cache: true,
                fallback_loads: FallbackLoadPolicy::PinnedRoots,
                cache_capacity: 1024,
                cache_max_bytes: 256 * 1024 * 1024,
                drill_bias: 0.3,
                grid_sample_distance: 0.25,
                max_mesh_subdivisions: MAX_MESH_SUBDIVISIONS,
                draw_path: DrawPath::Batched,
                color: [1.0, 1.0, 1.0, 1.0],
            },
            Self::Custom(options) => options.clone(),
        }
    }
}

impl Default for PyramidProfile {
    fn default() -> Self {
        Self::Balanced
    }
}

/// When an interior node fetches its own tile purely to serve as a borrow source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FallbackLoadPolicy {
    /// Interior nodes never load their own tile
    Disabled,
    /// Load once any existing child has turned out to be unresolvable
    UnresolvableChildren,
    /// As `UnresolvableChildren`, and level-0 tiles always load and stay
    /// resident while the view drills below them
    PinnedRoots,
}

impl Default for FallbackLoadPolicy {
    fn default() -> Self {
        Self::UnresolvableChildren
    }
}

/// Drawing backend, chosen once when the pyramid is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawPath {
    /// Queue draws and flush them per frame with a shared program
    Batched,
    /// Issue each draw as soon as the node submits it
    Immediate,
}

impl Default for DrawPath {
    fn default() -> Self {
        Self::Batched
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidOptions {
    /// Keep vertices in projected space and let the GPU apply the forward matrix
    pub hardware_transforms: bool,
    /// Draw an ancestor's texture while a node has none of its own
    pub texture_borrow: bool,
    /// Composite children into the parent's texture before fetching it
    pub texture_copy: bool,
    /// Park released textures in the texture cache
    pub texture_cache: bool,
    pub fallback_loads: FallbackLoadPolicy,
    pub cache_capacity: usize,
    pub cache_max_bytes: usize,
    pub drill_bias: f64,
    pub grid_sample_distance: f64,
    pub max_mesh_subdivisions: u32,
    pub draw_path: DrawPath,
    pub color: [f32; 4],
}

impl Default for PyramidOptions {
    fn default() -> Self {
        PyramidProfile::default().resolve()
    }
}

impl PyramidOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json).map_err(PyramidError::from)?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<()> {
        if self.texture_cache && self.cache_capacity == 0 {
            return Err(Box::new(PyramidError::InvalidConfig(
                "cache_capacity must be non-zero when the texture cache is enabled".into(),
            )));
        }
        if !(self.grid_sample_distance > 0.0) {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "grid_sample_distance must be positive, got {}",
                self.grid_sample_distance
            ))));
        }
        if self.max_mesh_subdivisions == 0 || !self.max_mesh_subdivisions.is_power_of_two() {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "max_mesh_subdivisions must be a power of two, got {}",
                self.max_mesh_subdivisions
            ))));
        }
        if self.max_mesh_subdivisions > MESH_SUBDIVISION_LIMIT {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "max_mesh_subdivisions must be at most {}, got {}",
                MESH_SUBDIVISION_LIMIT, self.max_mesh_subdivisions
            ))));
        }
        if !self.drill_bias.is_finite() {
            return Err(Box::new(PyramidError::InvalidConfig(
                "drill_bias must be finite".into(),
            )));
        }
        if self.color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err(Box::new(PyramidError::InvalidConfig(format!(
                "color components must lie in [0, 1], got {:?}",
                self.color
            ))));
        }
        Ok(())
    }

    /// True if draws need the tinted program variant
    pub fn is_tinted(&self) -> bool {
        self.color != [1.0, 1.0, 1.0, 1.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_presets() {
        let balanced = PyramidProfile::Balanced.resolve();
        let low = PyramidProfile::LowMemory.resolve();
        let high = PyramidProfile::HighQuality.resolve();

        assert_eq!(balanced.drill_bias, 0.6);
        assert_eq!(balanced.fallback_loads, FallbackLoadPolicy::UnresolvableChildren);
        assert!(low.cache_max_bytes < balanced.cache_max_bytes);
        assert!(high.cache_capacity > balanced.cache_capacity);
        assert_eq!(high.fallback_loads, FallbackLoadPolicy::PinnedRoots);

        assert!(balanced.validate().is_ok());
        assert!(low.validate().is_ok());
        assert!(high.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let options =
            PyramidOptions::from_json(r#"{"texture_copy": false, "draw_path": "Immediate"}"#)
                .unwrap();
        assert!(!options.texture_copy);
        assert_eq!(options.draw_path, DrawPath::Immediate);
        assert_eq!(options.max_mesh_subdivisions, 32);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut options = PyramidOptions::default();
        options.max_mesh_subdivisions = 12;
        assert!(options.validate().is_err());

        // the largest mesh still fits u16 indices, one step up does not
        options.max_mesh_subdivisions = MESH_SUBDIVISION_LIMIT;
        assert!(options.validate().is_ok());
        options.max_mesh_subdivisions = MESH_SUBDIVISION_LIMIT * 2;
        assert!(options.validate().is_err());
        assert!(PyramidOptions::from_json(r#"{"max_mesh_subdivisions": 256}"#).is_err());

        let mut options = PyramidOptions::default();
        options.grid_sample_distance = 0.0;
        assert!(options.validate().is_err());

        assert!(PyramidOptions::from_json(r#"{"color": [2.0, 1.0, 1.0, 1.0]}"#).is_err());
        assert!(PyramidOptions::from_json("not json").is_err());
    }

    #[test]
    fn test_tint_detection() {
        let mut options = PyramidOptions::default();
        assert!(!options.is_tinted());
        options.color = [1.0, 0.5, 0.5, 1.0];
        assert!(options.is_tinted());
    }
}
