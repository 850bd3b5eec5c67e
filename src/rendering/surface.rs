//! The GPU operations the resolution engine needs, as an object-safe trait.

use crate::tiles::source::PixelBuffer;
use crate::Result;
use nalgebra::Matrix4;

/// Handle to a surface texture. `0` is never a valid texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TextureId(pub u32);

impl TextureId {
    pub const INVALID: TextureId = TextureId(0);

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramebufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthBufferId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    #[default]
    Linear,
    /// Blocky sampling, used for low-fidelity stand-in textures
    Nearest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferStatus {
    Complete,
    Incomplete,
}

/// Program variants: `Tinted` multiplies texels by the draw color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderVariant {
    Plain,
    Tinted,
}

/// One textured draw. Vertices are `vertex_size` floats each, texture
/// coordinates two floats each.
#[derive(Debug, Clone, Copy)]
pub struct DrawCall<'a> {
    pub texture: TextureId,
    pub mode: PrimitiveMode,
    pub vertex_count: usize,
    pub vertex_size: usize,
    pub vertices: &'a [f32],
    pub tex_coords: &'a [f32],
    pub indices: Option<&'a [u16]>,
}

impl DrawCall<'_> {
    /// Number of vertices the primitive assembly walks
    pub fn element_count(&self) -> usize {
        self.indices.map_or(self.vertex_count, |i| i.len())
    }

    /// Vertex indices of the call as a plain triangle list. Degenerate
    /// triangles from strip joins are dropped.
    pub fn triangle_list(&self) -> Vec<u32> {
        let elements: Vec<u32> = match self.indices {
            Some(indices) => indices.iter().map(|&i| i as u32).collect(),
            None => (0..self.vertex_count as u32).collect(),
        };
        let mut out = Vec::with_capacity(elements.len().saturating_sub(2) * 3);
        match self.mode {
            PrimitiveMode::Triangles => {
                for tri in elements.chunks_exact(3) {
                    out.extend_from_slice(tri);
                }
            }
            PrimitiveMode::TriangleStrip => {
                for i in 0..elements.len().saturating_sub(2) {
                    let (a, b, c) = if i % 2 == 0 {
                        (elements[i], elements[i + 1], elements[i + 2])
                    } else {
                        (elements[i + 1], elements[i], elements[i + 2])
                    };
                    if a != b && b != c && a != c {
                        out.extend_from_slice(&[a, b, c]);
                    }
                }
            }
            PrimitiveMode::TriangleFan => {
                for i in 1..elements.len().saturating_sub(1) {
                    out.extend_from_slice(&[elements[0], elements[i], elements[i + 1]]);
                }
            }
        }
        out
    }
}

pub trait GpuSurface {
    fn create_texture(&mut self, width: u32, height: u32, filter: FilterMode) -> Result<TextureId>;

    /// Replaces the texture's pixels. Dimensions must match.
    fn upload_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()>;

    fn set_texture_filter(&mut self, texture: TextureId, filter: FilterMode);

    fn destroy_texture(&mut self, texture: TextureId);

    fn create_framebuffer(&mut self) -> Result<FramebufferId>;

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<DepthBufferId>;

    fn destroy_depth_buffer(&mut self, depth: DepthBufferId);

    /// Attaches `color` and `depth` to `framebuffer` and directs subsequent
    /// draws into it.
    fn bind_framebuffer(
        &mut self,
        framebuffer: FramebufferId,
        color: TextureId,
        depth: DepthBufferId,
    ) -> FramebufferStatus;

    /// Directs draws back to the screen
    fn unbind_framebuffer(&mut self);

    fn clear(&mut self, rgba: [f32; 4]);

    fn use_program(&mut self, variant: ShaderVariant);

    fn set_matrix(&mut self, matrix: &Matrix4<f32>);

    fn set_color(&mut self, rgba: [f32; 4]);

    fn draw(&mut self, call: &DrawCall<'_>);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_id_validity() {
        assert!(!TextureId::INVALID.is_valid());
        assert!(!TextureId::default().is_valid());
        assert!(TextureId(3).is_valid());
    }

    #[test]
    fn test_element_count() {
        let verts = [0.0; 12];
        let tex = [0.0; 8];
        let idx = [0u16, 1, 2, 3, 3, 2];
        let mut call = DrawCall {
            texture: TextureId(1),
            mode: PrimitiveMode::TriangleFan,
            vertex_count: 4,
            vertex_size: 3,
            vertices: &verts,
            tex_coords: &tex,
            indices: None,
        };
        assert_eq!(call.element_count(), 4);
        call.indices = Some(&idx);
        assert_eq!(call.element_count(), 6);
    }

    #[test]
    fn test_triangle_list() {
        let verts = [0.0; 18];
        let tex = [0.0; 12];
        let fan = DrawCall {
            texture: TextureId(1),
            mode: PrimitiveMode::TriangleFan,
            vertex_count: 5,
            vertex_size: 3,
            vertices: &verts,
            tex_coords: &tex,
            indices: None,
        };
        assert_eq!(fan.triangle_list(), vec![0, 1, 2, 0, 2, 3, 0, 3, 4]);

        // two rows of a 1x2 mesh joined by degenerate indices
        let strip_indices = [0u16, 2, 1, 3, 3, 2, 2, 4, 3, 5];
        let strip = DrawCall {
            mode: PrimitiveMode::TriangleStrip,
            vertex_count: 6,
            indices: Some(&strip_indices),
            ..fan
        };
        let tris = strip.triangle_list();
        assert_eq!(tris.len(), 12);
        assert_eq!(&tris[..6], &[0, 2, 1, 1, 2, 3]);
    }
}
