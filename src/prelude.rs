//! Prelude module for common quadtile types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use quadtile::prelude::*;`

pub use crate::core::{
    bounds::GeoBounds,
    builder::PyramidBuilder,
    config::{DrawPath, FallbackLoadPolicy, PyramidOptions, PyramidProfile},
    geo::{GeoPoint, Point3},
    view::{EquirectangularProjection, ViewState, WebMercatorProjection},
};

pub use crate::pyramid::{
    node::{NodeId, Quadrant},
    patch::{CompositingSupport, FrameStats, QuadTilePyramid},
    state::ResolutionState,
};

pub use crate::tiles::{
    cache::TextureCache,
    grid::TileGrid,
    source::{PixelBuffer, TileDecodeResult},
    version::{UnversionedTiles, VersionTable},
};

#[cfg(feature = "decode")]
pub use crate::tiles::providers::{FileTileProvider, UrlTemplateProvider};

pub use crate::rendering::{
    headless::HeadlessSurface,
    surface::{GpuSurface, TextureId},
};

#[cfg(feature = "render")]
pub use crate::rendering::wgpu_surface::WgpuSurface;

pub use crate::runtime::{
    init_runtime, runtime, spawn, spawners::ManualSpawner, AsyncHandle, AsyncSpawner,
};

pub use crate::traits::{MapProjection, TilePixelProvider, TileVersionOracle};

pub use crate::{Error as PyramidError, Result};

pub use std::{
    pin::Pin,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet, FxHasher};

pub use futures::Future;
