//! Frame-level draw batching
//!
//! Nodes submit their draws during traversal; the queue copies the geometry
//! into contiguous buffers and replays everything at flush time with a single
//! program bind and matrix upload per run of draws that share a matrix mode
//! and color.

use crate::core::view::ViewState;
use crate::rendering::backend::{variant_for, DrawBackend};
use crate::rendering::surface::{DrawCall, GpuSurface, PrimitiveMode, TextureId};
use nalgebra::Matrix4;
use std::ops::Range;

#[derive(Debug, Clone)]
struct QueuedDraw {
    texture: TextureId,
    mode: PrimitiveMode,
    vertex_count: usize,
    vertex_size: usize,
    vertices: Range<usize>,
    tex_coords: Range<usize>,
    indices: Option<Range<usize>>,
}

#[derive(Debug)]
pub struct BatchDrawQueue {
    vertices: Vec<f32>,
    tex_coords: Vec<f32>,
    indices: Vec<u16>,
    queued: Vec<QueuedDraw>,
    screen: Matrix4<f32>,
    forward: Matrix4<f32>,
    use_forward: bool,
    color: [f32; 4],
    flushes: usize,
}

impl BatchDrawQueue {
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            tex_coords: Vec::new(),
            indices: Vec::new(),
            queued: Vec::new(),
            screen: Matrix4::identity(),
            forward: Matrix4::identity(),
            use_forward: false,
            color: [1.0; 4],
            flushes: 0,
        }
    }

    /// Draws waiting for the next flush
    pub fn pending(&self) -> usize {
        self.queued.len()
    }

    /// Flushes that actually issued draws
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    fn enqueue(&mut self, call: &DrawCall<'_>) {
        // texture 0 means the node had nothing to show
        if !call.texture.is_valid() {
            return;
        }
        let v_start = self.vertices.len();
        self.vertices
            .extend_from_slice(&call.vertices[..call.vertex_count * call.vertex_size]);
        let t_start = self.tex_coords.len();
        self.tex_coords
            .extend_from_slice(&call.tex_coords[..call.vertex_count * 2]);
        let indices = call.indices.map(|idx| {
            let start = self.indices.len();
            self.indices.extend_from_slice(idx);
            start..self.indices.len()
        });
        self.queued.push(QueuedDraw {
            texture: call.texture,
            mode: call.mode,
            vertex_count: call.vertex_count,
            vertex_size: call.vertex_size,
            vertices: v_start..self.vertices.len(),
            tex_coords: t_start..self.tex_coords.len(),
            indices,
        });
    }

    fn issue(&mut self, surface: &mut dyn GpuSurface) {
        if self.queued.is_empty() {
            return;
        }
        surface.use_program(variant_for(self.color));
        surface.set_matrix(if self.use_forward {
            &self.forward
        } else {
            &self.screen
        });
        surface.set_color(self.color);

        for draw in &self.queued {
            surface.draw(&DrawCall {
                texture: draw.texture,
                mode: draw.mode,
                vertex_count: draw.vertex_count,
                vertex_size: draw.vertex_size,
                vertices: &self.vertices[draw.vertices.clone()],
                tex_coords: &self.tex_coords[draw.tex_coords.clone()],
                indices: draw.indices.clone().map(|r| &self.indices[r]),
            });
        }
        log::trace!("flushed {} batched draws", self.queued.len());

        self.flushes += 1;
        self.queued.clear();
        self.vertices.clear();
        self.tex_coords.clear();
        self.indices.clear();
    }
}

impl Default for BatchDrawQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawBackend for BatchDrawQueue {
    fn begin_frame(&mut self, view: &ViewState) {
        self.screen = view.draw_matrix(false);
        self.forward = view.draw_matrix(true);
    }

    fn set_use_forward_matrix(&mut self, surface: &mut dyn GpuSurface, forward: bool) {
        if self.use_forward != forward {
            self.issue(surface);
            self.use_forward = forward;
        }
    }

    fn set_color(&mut self, surface: &mut dyn GpuSurface, rgba: [f32; 4]) {
        if self.color != rgba {
            self.issue(surface);
            self.color = rgba;
        }
    }

    fn submit(&mut self, _surface: &mut dyn GpuSurface, call: &DrawCall<'_>) {
        self.enqueue(call);
    }

    fn flush(&mut self, surface: &mut dyn GpuSurface) {
        self.issue(surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::headless::HeadlessSurface;
    use crate::rendering::surface::FilterMode;

    fn fan<'a>(texture: TextureId, verts: &'a [f32], uvs: &'a [f32]) -> DrawCall<'a> {
        DrawCall {
            texture,
            mode: PrimitiveMode::TriangleFan,
            vertex_count: 4,
            vertex_size: 3,
            vertices: verts,
            tex_coords: uvs,
            indices: None,
        }
    }

    #[test]
    fn test_flush_binds_program_once() {
        let mut surface = HeadlessSurface::new(64, 64);
        let a = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let b = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let verts: Vec<f32> = (0..12).map(|v| v as f32).collect();
        let uvs = [0.0f32; 8];

        let mut queue = BatchDrawQueue::new();
        queue.submit(&mut surface, &fan(a, &verts, &uvs));
        queue.submit(&mut surface, &fan(b, &verts, &uvs));
        queue.submit(&mut surface, &fan(TextureId::INVALID, &verts, &uvs));
        assert_eq!(queue.pending(), 2);
        assert!(surface.draws().is_empty());

        queue.flush(&mut surface);
        assert_eq!(surface.draws().len(), 2);
        assert_eq!(surface.program_binds(), 1);
        assert_eq!(surface.matrix_uploads(), 1);
        assert_eq!(surface.draws()[1].texture, b);
        assert_eq!(surface.draws()[1].vertices, verts);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_matrix_switch_flushes_earlier_draws() {
        let mut surface = HeadlessSurface::new(64, 64);
        let a = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let verts = [0.0f32; 12];
        let uvs = [0.0f32; 8];

        let mut queue = BatchDrawQueue::new();
        queue.submit(&mut surface, &fan(a, &verts, &uvs));
        queue.set_use_forward_matrix(&mut surface, true);
        assert_eq!(surface.draws().len(), 1);
        queue.submit(&mut surface, &fan(a, &verts, &uvs));
        queue.flush(&mut surface);
        assert_eq!(surface.draws().len(), 2);
        assert_eq!(queue.flushes(), 2);
    }

    #[test]
    fn test_indexed_draws_keep_their_indices() {
        let mut surface = HeadlessSurface::new(64, 64);
        let a = surface.create_texture(2, 2, FilterMode::Linear).unwrap();
        let verts = [0.0f32; 27];
        let uvs = [0.0f32; 18];
        let indices = [0u16, 3, 1, 4, 2, 5, 5, 3, 3, 6, 4, 7, 5, 8];

        let mut queue = BatchDrawQueue::new();
        queue.submit(
            &mut surface,
            &DrawCall {
                texture: a,
                mode: PrimitiveMode::TriangleStrip,
                vertex_count: 9,
                vertex_size: 3,
                vertices: &verts,
                tex_coords: &uvs,
                indices: Some(&indices),
            },
        );
        queue.flush(&mut surface);
        assert_eq!(surface.draws()[0].element_count, indices.len());
    }
}
