pub mod cache;
pub mod clip;
pub mod grid;
pub mod loader;
#[cfg(feature = "decode")]
pub mod providers;
pub mod source;
pub mod version;

// Re-exports for convenience
pub use cache::{CacheEntry, CacheKey, TextureCache};
pub use grid::TileGrid;
pub use loader::{AsyncTileLoader, CancelToken, LoadOutcome, PendingLoad};
#[cfg(feature = "decode")]
pub use providers::{FileTileProvider, UrlTemplateProvider};
pub use source::{PixelBuffer, TileDecodeResult};
pub use version::{UnversionedTiles, VersionTable};
