//! # quadtile
//!
//! A quad-tree resolution cache for rendering large, multi-resolution raster
//! tile pyramids.
//!
//! Every frame the [`QuadTilePyramid`] works out which pyramid level matches the
//! current view scale, walks the visible part of its quad tree and decides for
//! each node whether to draw its own texture, fetch it asynchronously,
//! synthesize it from its children or borrow a lower resolution ancestor while
//! the real data is on its way. Textures that fall out of view are parked in a
//! bounded [`TextureCache`] so panning back is cheap.
//!
//! GPU work goes through the [`GpuSurface`] trait. A recording
//! [`HeadlessSurface`] is always available; a wgpu backend lives behind the
//! `render` feature.

pub mod core;
pub mod prelude;
pub mod pyramid;
pub mod rendering;
pub mod runtime;
pub mod tiles;
pub mod traits;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    bounds::GeoBounds,
    builder::PyramidBuilder,
    config::{DrawPath, FallbackLoadPolicy, PyramidOptions, PyramidProfile},
    geo::{GeoPoint, Point3},
    view::{EquirectangularProjection, ViewState, WebMercatorProjection},
};

pub use pyramid::{
    node::{NodeId, QuadTileNode, Quadrant},
    patch::{FrameStats, QuadTilePyramid},
    state::ResolutionState,
};

pub use tiles::{
    cache::{CacheKey, TextureCache},
    grid::TileGrid,
    loader::{AsyncTileLoader, CancelToken, LoadOutcome, PendingLoad},
    source::{PixelBuffer, TileDecodeResult},
    version::{UnversionedTiles, VersionTable},
};

pub use rendering::{
    batch::BatchDrawQueue,
    headless::HeadlessSurface,
    surface::{FilterMode, GpuSurface, PrimitiveMode, TextureId},
    texture::TextureResource,
};

pub use traits::{MapProjection, TilePixelProvider, TileVersionOracle};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum PyramidError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "decode")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("GPU error: {0}")]
    Gpu(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid tile: {0}")]
    InvalidTile(String),
}

/// Error type alias for convenience
pub type Error = PyramidError;
