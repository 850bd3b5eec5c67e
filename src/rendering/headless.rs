//! A surface that records what it is asked to do instead of touching a GPU.
//!
//! Used by the tests and by embedders that want to drive the pyramid without
//! a window. Draws that reference a destroyed texture are counted as stale.

use crate::core::constants::BYTES_PER_PIXEL;
use crate::rendering::surface::{
    DepthBufferId, DrawCall, FilterMode, FramebufferId, FramebufferStatus, GpuSurface,
    PrimitiveMode, ShaderVariant, TextureId,
};
use crate::tiles::source::PixelBuffer;
use crate::{PyramidError, Result};
use fxhash::{FxHashMap, FxHashSet};
use nalgebra::Matrix4;

#[derive(Debug, Clone)]
struct HeadlessTexture {
    width: u32,
    height: u32,
    filter: FilterMode,
    uploads: u32,
    first_pixel: Option<[u8; 4]>,
}

/// One recorded draw
#[derive(Debug, Clone)]
pub struct DrawRecord {
    pub texture: TextureId,
    pub mode: PrimitiveMode,
    pub vertex_count: usize,
    pub element_count: usize,
    pub vertex_size: usize,
    pub vertices: Vec<f32>,
    pub tex_coords: Vec<f32>,
    /// Color attachment of the bound framebuffer, `None` for the screen
    pub target: Option<TextureId>,
    pub program: Option<ShaderVariant>,
    pub matrix: Matrix4<f32>,
    pub color: [f32; 4],
}

#[derive(Debug)]
pub struct HeadlessSurface {
    width: u32,
    height: u32,
    next_id: u32,
    textures: FxHashMap<TextureId, HeadlessTexture>,
    framebuffers: FxHashSet<FramebufferId>,
    depth_buffers: FxHashMap<DepthBufferId, (u32, u32)>,
    bound: Option<(FramebufferId, TextureId)>,
    program: Option<ShaderVariant>,
    matrix: Matrix4<f32>,
    color: [f32; 4],
    draws: Vec<DrawRecord>,
    program_binds: usize,
    matrix_uploads: usize,
    stale_draws: usize,
    destroyed: usize,
    fail_framebuffers: bool,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 0,
            textures: FxHashMap::default(),
            framebuffers: FxHashSet::default(),
            depth_buffers: FxHashMap::default(),
            bound: None,
            program: None,
            matrix: Matrix4::identity(),
            color: [1.0; 4],
            draws: Vec::new(),
            program_binds: 0,
            matrix_uploads: 0,
            stale_draws: 0,
            destroyed: 0,
            fail_framebuffers: false,
        }
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Makes every later framebuffer bind report incomplete
    pub fn set_fail_framebuffers(&mut self, fail: bool) {
        self.fail_framebuffers = fail;
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn is_live(&self, texture: TextureId) -> bool {
        self.textures.contains_key(&texture)
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<(u32, u32)> {
        self.textures.get(&texture).map(|t| (t.width, t.height))
    }

    pub fn texture_filter(&self, texture: TextureId) -> Option<FilterMode> {
        self.textures.get(&texture).map(|t| t.filter)
    }

    /// First texel of the last upload, if any
    pub fn texture_color(&self, texture: TextureId) -> Option<[u8; 4]> {
        self.textures.get(&texture).and_then(|t| t.first_pixel)
    }

    pub fn texture_uploads(&self, texture: TextureId) -> u32 {
        self.textures.get(&texture).map_or(0, |t| t.uploads)
    }

    pub fn live_framebuffers(&self) -> usize {
        self.framebuffers.len()
    }

    pub fn live_depth_buffers(&self) -> usize {
        self.depth_buffers.len()
    }

    pub fn destroyed_textures(&self) -> usize {
        self.destroyed
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Draws that went to the screen
    pub fn screen_draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draws.iter().filter(|d| d.target.is_none())
    }

    /// Draws that went into a framebuffer
    pub fn offscreen_draws(&self) -> impl Iterator<Item = &DrawRecord> {
        self.draws.iter().filter(|d| d.target.is_some())
    }

    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    pub fn program_binds(&self) -> usize {
        self.program_binds
    }

    pub fn matrix_uploads(&self) -> usize {
        self.matrix_uploads
    }

    /// Draws issued with a texture that was not alive at the time
    pub fn stale_draws(&self) -> usize {
        self.stale_draws
    }

    pub fn reset_counters(&mut self) {
        self.draws.clear();
        self.program_binds = 0;
        self.matrix_uploads = 0;
    }
}

impl GpuSurface for HeadlessSurface {
    fn create_texture(&mut self, width: u32, height: u32, filter: FilterMode) -> Result<TextureId> {
        if width == 0 || height == 0 {
            return Err(Box::new(PyramidError::Gpu(format!(
                "cannot create a {}x{} texture",
                width, height
            ))));
        }
        let id = TextureId(self.next());
        self.textures.insert(
            id,
            HeadlessTexture {
                width,
                height,
                filter,
                uploads: 0,
                first_pixel: None,
            },
        );
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()> {
        let entry = self
            .textures
            .get_mut(&texture)
            .ok_or_else(|| PyramidError::Gpu(format!("upload to unknown texture {}", texture.0)))?;
        if entry.width != pixels.width || entry.height != pixels.height {
            return Err(Box::new(PyramidError::Gpu(format!(
                "upload of {}x{} pixels into a {}x{} texture",
                pixels.width, pixels.height, entry.width, entry.height
            ))));
        }
        entry.uploads += 1;
        entry.first_pixel = pixels
            .data
            .get(..BYTES_PER_PIXEL)
            .map(|p| [p[0], p[1], p[2], p[3]]);
        Ok(())
    }

    fn set_texture_filter(&mut self, texture: TextureId, filter: FilterMode) {
        if let Some(entry) = self.textures.get_mut(&texture) {
            entry.filter = filter;
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        if self.textures.remove(&texture).is_none() {
            log::warn!("destroying unknown texture {}", texture.0);
            return;
        }
        self.destroyed += 1;
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId> {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id);
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        if self.bound.map(|(fb, _)| fb) == Some(framebuffer) {
            self.bound = None;
        }
        self.framebuffers.remove(&framebuffer);
    }

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<DepthBufferId> {
        let id = DepthBufferId(self.next());
        self.depth_buffers.insert(id, (width, height));
        Ok(id)
    }

    fn destroy_depth_buffer(&mut self, depth: DepthBufferId) {
        self.depth_buffers.remove(&depth);
    }

    fn bind_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: TextureId,
        depth: DepthBufferId,
    ) -> FramebufferStatus {
        if self.fail_framebuffers
            || !self.framebuffers.contains(&framebuffer)
            || !self.depth_buffers.contains_key(&depth)
        {
            return FramebufferStatus::Incomplete;
        }
        let color_size = self.texture_size(color);
        let depth_size = self.depth_buffers.get(&depth).copied();
        match (color_size, depth_size) {
            (Some((cw, ch)), Some((dw, dh))) if dw >= cw && dh >= ch => {
                self.bound = Some((framebuffer, color));
                FramebufferStatus::Complete
            }
            _ => FramebufferStatus::Incomplete,
        }
    }

    fn unbind_framebuffer(&mut self) {
        self.bound = None;
    }

    fn clear(&mut self, _rgba: [f32; 4]) {}

    fn use_program(&mut self, variant: ShaderVariant) {
        self.program = Some(variant);
        self.program_binds += 1;
    }

    fn set_matrix(&mut self, matrix: &Matrix4<f32>) {
        self.matrix = *matrix;
        self.matrix_uploads += 1;
    }

    fn set_color(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        if !self.textures.contains_key(&call.texture) {
            log::error!("draw references dead texture {}", call.texture.0);
            self.stale_draws += 1;
        }
        self.draws.push(DrawRecord {
            texture: call.texture,
            mode: call.mode,
            vertex_count: call.vertex_count,
            element_count: call.element_count(),
            vertex_size: call.vertex_size,
            vertices: call.vertices[..call.vertex_count * call.vertex_size].to_vec(),
            tex_coords: call.tex_coords[..call.vertex_count * 2].to_vec(),
            target: self.bound.map(|(_, color)| color),
            program: self.program,
            matrix: self.matrix,
            color: self.color,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_framebuffer_needs_large_enough_depth() {
        let mut surface = HeadlessSurface::new(32, 32);
        let color = surface.create_texture(16, 16, FilterMode::Linear).unwrap();
        let fb = surface.create_framebuffer().unwrap();
        let small = surface.create_depth_buffer(8, 8).unwrap();
        let big = surface.create_depth_buffer(32, 32).unwrap();

        assert_eq!(surface.bind_framebuffer(fb, color, small), FramebufferStatus::Incomplete);
        assert_eq!(surface.bind_framebuffer(fb, color, big), FramebufferStatus::Complete);

        surface.set_fail_framebuffers(true);
        assert_eq!(surface.bind_framebuffer(fb, color, big), FramebufferStatus::Incomplete);
    }

    #[test]
    fn test_draw_records_target_and_staleness() {
        let mut surface = HeadlessSurface::new(32, 32);
        let tex = surface.create_texture(4, 4, FilterMode::Linear).unwrap();
        let verts = [0.0f32; 8];
        let uvs = [0.0f32; 8];
        let call = DrawCall {
            texture: tex,
            mode: PrimitiveMode::TriangleFan,
            vertex_count: 4,
            vertex_size: 2,
            vertices: &verts,
            tex_coords: &uvs,
            indices: None,
        };
        surface.draw(&call);
        assert_eq!(surface.screen_draws().count(), 1);
        assert_eq!(surface.stale_draws(), 0);

        surface.destroy_texture(tex);
        surface.draw(&call);
        assert_eq!(surface.stale_draws(), 1);
    }

    #[test]
    fn test_upload_tracks_first_texel() {
        let mut surface = HeadlessSurface::new(8, 8);
        let tex = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let pixels = PixelBuffer::solid(2, 2, [9, 8, 7, 6]);
        surface.upload_texture(tex, &pixels).unwrap();
        assert_eq!(surface.texture_color(tex), Some([9, 8, 7, 6]));
        assert!(surface
            .upload_texture(tex, &PixelBuffer::solid(1, 1, [0; 4]))
            .is_err());
    }
}
