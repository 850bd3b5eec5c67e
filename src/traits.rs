//! Collaborator traits the resolution engine consumes
//!
//! Tile pixels, tile versions and the geodetic projection come from outside
//! the engine. Each concern is a small object-safe trait so embedders can plug
//! in their own decoders and projections.

use crate::core::geo::{GeoPoint, Point3};
use crate::tiles::loader::CancelToken;
use crate::tiles::source::TileDecodeResult;
use futures::future::BoxFuture;

/// Decodes the pixels of a single tile off the render thread
pub trait TilePixelProvider: Send + Sync {
    /// Decode the tile at `(level, row, col)`.
    ///
    /// Implementations should check `cancel` between expensive steps and may
    /// return [`TileDecodeResult::Unavailable`] early once it is set; the
    /// loader discards the result of a canceled request either way.
    fn decode(
        &self,
        level: u32,
        row: u32,
        col: u32,
        cancel: CancelToken,
    ) -> BoxFuture<'_, TileDecodeResult>;

    /// Human readable name used in log output
    fn name(&self) -> &str {
        "tiles"
    }
}

/// Reports the current version of a tile's data
pub trait TileVersionOracle: Send + Sync {
    /// Current version of the tile. `0` means the tile is not versioned and
    /// cached data is always current.
    fn version_of(&self, level: u32, row: u32, col: u32) -> u64;
}

/// Geodetic projection of a map view
pub trait MapProjection: Send + Sync {
    /// Spatial reference id of the projected space
    fn srid(&self) -> i32;

    /// Geodetic to projected coordinates
    fn forward(&self, point: GeoPoint) -> Point3;

    /// Projected to geodetic coordinates
    fn inverse(&self, point: Point3) -> GeoPoint;
}

/// Cache statistics
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size: usize,
    pub bytes: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        if self.hits + self.misses == 0 {
            0.0
        } else {
            self.hits as f64 / (self.hits + self.misses) as f64
        }
    }
}
