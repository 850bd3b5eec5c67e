//! Where screen draws go once a node has decided to draw.

use crate::core::config::DrawPath;
use crate::core::view::ViewState;
use crate::rendering::batch::BatchDrawQueue;
use crate::rendering::surface::{DrawCall, GpuSurface, ShaderVariant};
use nalgebra::Matrix4;

/// Sink for textured screen draws
///
/// Implementations may defer draws, so every texture a submitted draw
/// references must stay alive until [`DrawBackend::flush`] returns.
pub trait DrawBackend {
    /// Captures the matrices for this frame
    fn begin_frame(&mut self, view: &ViewState);

    /// Selects whether later draws carry projected (`true`) or screen space
    /// vertices.
    fn set_use_forward_matrix(&mut self, surface: &mut dyn GpuSurface, forward: bool);

    fn set_color(&mut self, surface: &mut dyn GpuSurface, rgba: [f32; 4]);

    fn submit(&mut self, surface: &mut dyn GpuSurface, call: &DrawCall<'_>);

    /// Issues everything still queued
    fn flush(&mut self, surface: &mut dyn GpuSurface);
}

pub fn backend_for(path: DrawPath) -> Box<dyn DrawBackend> {
    match path {
        DrawPath::Batched => Box::new(BatchDrawQueue::new()),
        DrawPath::Immediate => Box::new(ImmediateDraw::new()),
    }
}

pub(crate) fn variant_for(color: [f32; 4]) -> ShaderVariant {
    if color == [1.0, 1.0, 1.0, 1.0] {
        ShaderVariant::Plain
    } else {
        ShaderVariant::Tinted
    }
}

/// Binds program and matrix for every draw
#[derive(Debug)]
pub struct ImmediateDraw {
    screen: Matrix4<f32>,
    forward: Matrix4<f32>,
    use_forward: bool,
    color: [f32; 4],
}

impl ImmediateDraw {
    pub fn new() -> Self {
        Self {
            screen: Matrix4::identity(),
            forward: Matrix4::identity(),
            use_forward: false,
            color: [1.0; 4],
        }
    }
}

impl Default for ImmediateDraw {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawBackend for ImmediateDraw {
    fn begin_frame(&mut self, view: &ViewState) {
        self.screen = view.draw_matrix(false);
        self.forward = view.draw_matrix(true);
        self.use_forward = false;
    }

    fn set_use_forward_matrix(&mut self, _surface: &mut dyn GpuSurface, forward: bool) {
        self.use_forward = forward;
    }

    fn set_color(&mut self, _surface: &mut dyn GpuSurface, rgba: [f32; 4]) {
        self.color = rgba;
    }

    fn submit(&mut self, surface: &mut dyn GpuSurface, call: &DrawCall<'_>) {
        if !call.texture.is_valid() {
            return;
        }
        surface.use_program(variant_for(self.color));
        surface.set_matrix(if self.use_forward {
            &self.forward
        } else {
            &self.screen
        });
        surface.set_color(self.color);
        surface.draw(call);
    }

    fn flush(&mut self, _surface: &mut dyn GpuSurface) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::headless::HeadlessSurface;
    use crate::rendering::surface::{FilterMode, PrimitiveMode, TextureId};

    #[test]
    fn test_immediate_draws_right_away() {
        let mut surface = HeadlessSurface::new(16, 16);
        let tex = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let mut backend = backend_for(DrawPath::Immediate);
        let verts = [0.0f32; 12];
        let uvs = [0.0f32; 8];
        let mut call = DrawCall {
            texture: tex,
            mode: PrimitiveMode::TriangleFan,
            vertex_count: 4,
            vertex_size: 3,
            vertices: &verts,
            tex_coords: &uvs,
            indices: None,
        };
        backend.submit(&mut surface, &call);
        backend.submit(&mut surface, &call);
        assert_eq!(surface.draws().len(), 2);
        assert_eq!(surface.program_binds(), 2);

        call.texture = TextureId::INVALID;
        backend.submit(&mut surface, &call);
        assert_eq!(surface.draws().len(), 2);
    }

    #[test]
    fn test_variant_for_color() {
        assert_eq!(variant_for([1.0; 4]), ShaderVariant::Plain);
        assert_eq!(variant_for([1.0, 0.5, 0.5, 1.0]), ShaderVariant::Tinted);
    }
}
