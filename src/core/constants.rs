//! Engine-wide constants for the tile pyramid.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Cache hint: the texture was fully resolved when it was parked.
pub const TEXTURE_HINT_RESOLVED: u32 = 0x0000_0001;

/// Subtracted from the raw log2 magnification before flooring to a level.
pub const DEFAULT_DRILL_BIAS: f64 = 0.6;

/// Target spacing, in degrees, between mesh vertices when subdividing a tile.
pub const DEFAULT_GRID_SAMPLE_DISTANCE: f64 = 0.5;

/// Upper bound on mesh subdivisions per tile edge.
pub const MAX_MESH_SUBDIVISIONS: u32 = 32;

/// Largest subdivision count whose `(n+1)^2` vertex grid is addressable by
/// `u16` strip indices.
pub const MESH_SUBDIVISION_LIMIT: u32 = 128;

/// The dataset boundary can cross a tile twice per edge.
pub const MAX_CLIPPED_POINTS: usize = 8;

/// Default number of textures the cache keeps.
pub const DEFAULT_CACHE_CAPACITY: usize = 256;

/// Default byte budget of the texture cache (64 MiB).
pub const DEFAULT_CACHE_MAX_BYTES: usize = 64 * 1024 * 1024;

/// Version reported by oracles that do not track tile versions.
pub const UNVERSIONED: u64 = 0;

/// Bytes per pixel of the RGBA textures the engine allocates.
pub const BYTES_PER_PIXEL: usize = 4;
