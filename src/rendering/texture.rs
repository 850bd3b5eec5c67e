use crate::core::constants::BYTES_PER_PIXEL;
use crate::rendering::surface::{FilterMode, GpuSurface, TextureId};
use crate::tiles::source::PixelBuffer;
use crate::Result;

/// A texture owned by exactly one holder: a node, the texture cache, or the
/// retire list waiting for the end of the frame.
///
/// There is no `Clone`. Moving the value moves ownership, and
/// [`TextureResource::release`] is the only way to destroy it.
#[derive(Debug)]
pub struct TextureResource {
    id: TextureId,
    width: u32,
    height: u32,
    filter: FilterMode,
    released: bool,
}

impl TextureResource {
    pub fn create<S: GpuSurface + ?Sized>(
        surface: &mut S,
        width: u32,
        height: u32,
        filter: FilterMode,
    ) -> Result<Self> {
        let id = surface.create_texture(width, height, filter)?;
        Ok(Self {
            id,
            width,
            height,
            filter,
            released: false,
        })
    }

    pub fn from_pixels<S: GpuSurface + ?Sized>(surface: &mut S, pixels: &PixelBuffer) -> Result<Self> {
        let mut texture = Self::create(surface, pixels.width, pixels.height, FilterMode::Linear)?;
        if let Err(e) = surface.upload_texture(texture.id, pixels) {
            texture.release(surface);
            return Err(e);
        }
        Ok(texture)
    }

    /// Uploads `pixels` into this texture if the dimensions match. Returns
    /// `false` without touching the GPU when they do not; the caller then
    /// retires this texture and creates a new one.
    pub fn reupload<S: GpuSurface + ?Sized>(&mut self, surface: &mut S, pixels: &PixelBuffer) -> Result<bool> {
        if self.width != pixels.width || self.height != pixels.height {
            return Ok(false);
        }
        surface.upload_texture(self.id, pixels)?;
        self.set_filter(surface, FilterMode::Linear);
        Ok(true)
    }

    pub fn set_filter<S: GpuSurface + ?Sized>(&mut self, surface: &mut S, filter: FilterMode) {
        if self.filter != filter {
            surface.set_texture_filter(self.id, filter);
            self.filter = filter;
        }
    }

    pub fn release<S: GpuSurface + ?Sized>(mut self, surface: &mut S) {
        surface.destroy_texture(self.id);
        self.released = true;
    }

    pub fn id(&self) -> TextureId {
        self.id
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    pub fn byte_size(&self) -> usize {
        self.width as usize * self.height as usize * BYTES_PER_PIXEL
    }
}

impl Drop for TextureResource {
    fn drop(&mut self) {
        if !self.released {
            log::warn!(
                "texture {} ({}x{}) dropped without release",
                self.id.0,
                self.width,
                self.height
            );
        }
    }
}
