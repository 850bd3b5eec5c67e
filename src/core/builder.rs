//! Pyramid builder for fluent configuration
//!
//! [`PyramidBuilder`] collects the tile source, the options and the
//! collaborators a [`QuadTilePyramid`] needs, validates them and wires the
//! loader and draw backend together.

use crate::{
    core::config::{PyramidOptions, PyramidProfile},
    pyramid::patch::{CompositingSupport, QuadTilePyramid},
    rendering::{backend::backend_for, surface::GpuSurface},
    runtime::{self, AsyncSpawner},
    tiles::{grid::TileGrid, loader::AsyncTileLoader, version::UnversionedTiles},
    traits::{TilePixelProvider, TileVersionOracle},
    Result,
};
use std::sync::Arc;

/// Builder for creating and configuring pyramids
pub struct PyramidBuilder {
    /// Identifies the dataset in the texture cache
    uri: Arc<str>,
    grid: TileGrid,
    provider: Arc<dyn TilePixelProvider>,
    profile: PyramidProfile,
    versions: Option<Arc<dyn TileVersionOracle>>,
    /// Falls back to the global runtime when unset
    spawner: Option<Arc<dyn AsyncSpawner>>,
    compositing: Option<CompositingSupport>,
}

impl PyramidBuilder {
    pub fn new(
        uri: impl Into<Arc<str>>,
        grid: TileGrid,
        provider: Arc<dyn TilePixelProvider>,
    ) -> Self {
        Self {
            uri: uri.into(),
            grid,
            provider,
            profile: PyramidProfile::default(),
            versions: None,
            spawner: None,
            compositing: None,
        }
    }

    /// Use a preset profile
    pub fn with_profile(mut self, profile: PyramidProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Use explicit options
    pub fn with_options(mut self, options: PyramidOptions) -> Self {
        self.profile = PyramidProfile::Custom(options);
        self
    }

    /// Track tile versions so replaced tiles get reloaded
    pub fn with_versions(mut self, versions: Arc<dyn TileVersionOracle>) -> Self {
        self.versions = Some(versions);
        self
    }

    /// Run decodes on `spawner` instead of the global runtime
    pub fn with_spawner(mut self, spawner: Arc<dyn AsyncSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    /// Share a compositing flag other than the process-wide one
    pub fn with_compositing(mut self, compositing: CompositingSupport) -> Self {
        self.compositing = Some(compositing);
        self
    }

    /// Build the pyramid, drawing into `surface`
    pub fn build<S: GpuSurface>(self, surface: S) -> Result<QuadTilePyramid<S>> {
        let options = self.profile.resolve();
        options.validate()?;
        self.grid.validate()?;

        let spawner = self.spawner.unwrap_or_else(runtime::runtime);
        let loader = AsyncTileLoader::new(self.provider, spawner);
        let versions = self
            .versions
            .unwrap_or_else(|| Arc::new(UnversionedTiles) as Arc<dyn TileVersionOracle>);
        let backend = backend_for(options.draw_path);
        let compositing = self.compositing.unwrap_or_default();

        log::info!(
            "building pyramid {} from {} tiles ({:?} draws)",
            self.uri,
            loader.provider().name(),
            options.draw_path
        );

        Ok(QuadTilePyramid::from_parts(
            self.uri,
            self.grid,
            options,
            loader,
            versions,
            surface,
            backend,
            compositing,
        ))
    }
}
