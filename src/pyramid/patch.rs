//! The pyramid driver: owns the node arena, the texture cache and the GPU
//! surface, and runs one resolution pass per frame.

use crate::core::builder::PyramidBuilder;
use crate::core::config::PyramidOptions;
use crate::core::geo::GeoPoint;
use crate::core::view::ViewState;
use crate::pyramid::node::{NodeId, NodeTable, QuadTileNode};
use crate::pyramid::state::ResolutionState;
use crate::rendering::backend::DrawBackend;
use crate::rendering::surface::{DepthBufferId, FramebufferId, GpuSurface};
use crate::rendering::texture::TextureResource;
use crate::tiles::cache::TextureCache;
use crate::tiles::grid::TileGrid;
use crate::tiles::loader::AsyncTileLoader;
use crate::traits::{TilePixelProvider, TileVersionOracle};
use crate::Result;
use crossbeam_channel::Receiver;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static PROCESS_COMPOSITING: Lazy<CompositingSupport> =
    Lazy::new(|| CompositingSupport(Arc::new(AtomicBool::new(true))));

/// Whether offscreen compositing still works
///
/// The first framebuffer failure turns compositing off for everyone sharing
/// the flag. Pyramids share the process-wide flag unless given an
/// [`isolated`](CompositingSupport::isolated) one.
#[derive(Debug, Clone)]
pub struct CompositingSupport(Arc<AtomicBool>);

impl CompositingSupport {
    pub fn process() -> Self {
        PROCESS_COMPOSITING.clone()
    }

    pub fn isolated() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_available(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn disable(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for CompositingSupport {
    fn default() -> Self {
        Self::process()
    }
}

/// What one call to [`QuadTilePyramid::draw`] did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    /// `None` when the grid is degenerate and nothing was drawn
    pub draw_level: Option<u32>,
    /// Nodes that ran their leaf pass
    pub nodes_drawn: usize,
    pub loads_issued: usize,
    pub draws: usize,
    /// Draws that showed an ancestor's texture
    pub borrowed_draws: usize,
    pub composites: usize,
    /// Subtrees released for leaving the view
    pub pruned: usize,
}

/// Framebuffer and depth buffer used while compositing children into a
/// parent. Created on first use and torn down after every root pass.
#[derive(Debug, Default)]
pub(crate) struct FrameScratch {
    framebuffer: Option<FramebufferId>,
    depth: Option<(DepthBufferId, u32, u32)>,
}

impl FrameScratch {
    pub(crate) fn acquire<S: GpuSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        width: u32,
        height: u32,
    ) -> Result<(FramebufferId, DepthBufferId)> {
        let framebuffer = match self.framebuffer {
            Some(fb) => fb,
            None => {
                let fb = surface.create_framebuffer()?;
                self.framebuffer = Some(fb);
                fb
            }
        };
        let depth = match self.depth {
            Some((depth, w, h)) if w == width && h == height => depth,
            stale => {
                if let Some((depth, _, _)) = stale {
                    surface.destroy_depth_buffer(depth);
                    self.depth = None;
                }
                let depth = surface.create_depth_buffer(width, height)?;
                self.depth = Some((depth, width, height));
                depth
            }
        };
        Ok((framebuffer, depth))
    }

    pub(crate) fn teardown<S: GpuSurface + ?Sized>(&mut self, surface: &mut S) {
        if let Some(fb) = self.framebuffer.take() {
            surface.destroy_framebuffer(fb);
        }
        if let Some((depth, _, _)) = self.depth.take() {
            surface.destroy_depth_buffer(depth);
        }
    }
}

/// A raster tile pyramid drawn through a quad tree of resolution nodes
pub struct QuadTilePyramid<S: GpuSurface> {
    pub(crate) uri: Arc<str>,
    pub(crate) grid: TileGrid,
    pub(crate) options: PyramidOptions,
    pub(crate) nodes: NodeTable,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) cache: Option<TextureCache>,
    pub(crate) loader: AsyncTileLoader,
    pub(crate) versions: Arc<dyn TileVersionOracle>,
    pub(crate) surface: S,
    pub(crate) backend: Box<dyn DrawBackend>,
    pub(crate) scratch: FrameScratch,
    pub(crate) compositing: CompositingSupport,
    /// Textures let go of during a frame, destroyed once draws are flushed
    pub(crate) retired: Vec<TextureResource>,
    pub(crate) stats: FrameStats,
    pub(crate) color: [f32; 4],
}

impl<S: GpuSurface> QuadTilePyramid<S> {
    pub fn builder(
        uri: impl Into<Arc<str>>,
        grid: TileGrid,
        provider: Arc<dyn TilePixelProvider>,
    ) -> PyramidBuilder {
        PyramidBuilder::new(uri, grid, provider)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        uri: Arc<str>,
        grid: TileGrid,
        options: PyramidOptions,
        loader: AsyncTileLoader,
        versions: Arc<dyn TileVersionOracle>,
        surface: S,
        backend: Box<dyn DrawBackend>,
        compositing: CompositingSupport,
    ) -> Self {
        let cache = options
            .texture_cache
            .then(|| TextureCache::new(options.cache_capacity, options.cache_max_bytes));
        let roots = grid
            .root_tiles()
            .into_iter()
            .map(|(row, col)| NodeId::root(row, col))
            .collect::<Vec<_>>();
        log::debug!(
            "pyramid {} with {} root tiles and {} levels",
            uri,
            roots.len(),
            grid.level_count
        );
        let color = options.color;

        Self {
            uri,
            grid,
            options,
            nodes: NodeTable::new(),
            roots,
            cache,
            loader,
            versions,
            surface,
            backend,
            scratch: FrameScratch::default(),
            compositing,
            retired: Vec::new(),
            stats: FrameStats::default(),
            color,
        }
    }

    /// Runs one frame: picks the drill level for `view`, resolves and draws
    /// every visible root and flushes the queued draws.
    pub fn draw(&mut self, view: &ViewState) -> FrameStats {
        self.stats = FrameStats::default();
        let Some(level) = self.grid.drill_level(view.scale, self.options.drill_bias) else {
            log::trace!("{} has degenerate tiles, skipping frame", self.uri);
            return self.stats.clone();
        };
        self.stats.draw_level = Some(level);

        self.backend.begin_frame(view);
        self.backend.set_color(&mut self.surface, self.color);

        let visible = view.bounds();
        for i in 0..self.roots.len() {
            let id = self.roots[i];
            let bounds = self.grid.tile_bounds(0, id.row, id.col);
            if !bounds.intersects(&visible) {
                if self.nodes.contains(id) {
                    self.release_root(id);
                    self.stats.pruned += 1;
                }
                continue;
            }

            if !self.nodes.contains(id) {
                self.create_node(id);
            }
            if self.nodes.get(id).map_or(true, |n| n.dead) {
                continue;
            }
            self.draw_quad(id, view, level);
            self.scratch.teardown(&mut self.surface);
        }

        self.backend.flush(&mut self.surface);
        self.destroy_retired();
        log::trace!("frame done: {:?}", self.stats);
        self.stats.clone()
    }

    /// Cancels every in-flight load. Loading nodes become `Suspended`.
    pub fn suspend(&mut self) {
        for id in self.live_roots() {
            self.suspend_node(id);
        }
    }

    /// Suspended nodes go back to `Unresolved` and reload on the next frame
    pub fn resume(&mut self) {
        for id in self.live_roots() {
            self.resume_node(id);
        }
    }

    /// Releases every node and empties the texture cache. The pyramid can be
    /// drawn again afterwards.
    pub fn release(&mut self) {
        for id in self.live_roots() {
            self.release_root(id);
        }
        self.scratch.teardown(&mut self.surface);
        if let Some(cache) = self.cache.as_mut() {
            self.retired.extend(cache.clear());
        }
        self.destroy_retired();
    }

    /// Aggregate state: `Resolving` if anything is loading, otherwise the
    /// first state that is not `Resolved`.
    pub fn state(&self) -> ResolutionState {
        let mut result = None;
        for id in self.live_roots() {
            let state = self.aggregate_state(id);
            if state == ResolutionState::Resolving {
                return state;
            }
            if result.is_none() || (result != Some(state) && state != ResolutionState::Resolved) {
                result = Some(state);
            }
        }
        result.unwrap_or(ResolutionState::Unresolved)
    }

    pub fn node(&self, id: NodeId) -> Option<&QuadTileNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> &NodeTable {
        &self.nodes
    }

    /// Root tiles overlapping the dataset
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Color every draw is modulated with
    pub fn set_color(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
    }

    pub fn color(&self) -> [f32; 4] {
        self.color
    }

    pub fn drill_level(&self, view: &ViewState) -> Option<u32> {
        self.grid.drill_level(view.scale, self.options.drill_bias)
    }

    /// Ground position of pixel `(x, y)` in the image of tile `id`
    pub fn image_to_ground(&self, id: NodeId, x: f64, y: f64) -> GeoPoint {
        GeoPoint::new(
            self.grid.tile_pixel_lat(id.level, id.row, id.col, y),
            self.grid.tile_pixel_lng(id.level, id.row, id.col, x),
        )
    }

    /// Pixel position of `point` in the image of tile `id`
    pub fn ground_to_image(&self, id: NodeId, point: GeoPoint) -> (f64, f64) {
        (
            self.grid.tile_pixel_x(id.level, id.row, id.col, point.lng),
            self.grid.tile_pixel_y(id.level, id.row, id.col, point.lat),
        )
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn grid(&self) -> &TileGrid {
        &self.grid
    }

    pub fn options(&self) -> &PyramidOptions {
        &self.options
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn cache(&self) -> Option<&TextureCache> {
        self.cache.as_ref()
    }

    pub fn compositing(&self) -> &CompositingSupport {
        &self.compositing
    }

    /// Channel receiving the id of each tile whose decode finished, for
    /// waking an idle render loop
    pub fn completions(&mut self) -> Receiver<NodeId> {
        self.loader.completions()
    }

    fn live_roots(&self) -> Vec<NodeId> {
        self.roots
            .iter()
            .copied()
            .filter(|id| self.nodes.contains(*id))
            .collect()
    }

    fn release_root(&mut self, id: NodeId) {
        self.release_node(id);
        self.nodes.remove(id);
    }

    fn destroy_retired(&mut self) {
        for texture in self.retired.drain(..) {
            texture.release(&mut self.surface);
        }
    }
}

impl<S: GpuSurface> Drop for QuadTilePyramid<S> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<S: GpuSurface> std::fmt::Debug for QuadTilePyramid<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadTilePyramid")
            .field("uri", &self.uri)
            .field("nodes", &self.nodes.len())
            .field("roots", &self.roots.len())
            .field("cached", &self.cache.as_ref().map_or(0, |c| c.len()))
            .finish()
    }
}
