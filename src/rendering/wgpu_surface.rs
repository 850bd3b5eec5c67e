//! [`GpuSurface`] on top of wgpu.
//!
//! The surface renders into its own RGBA target texture; embedders either
//! read it back with [`WgpuSurface::read_pixels`] or sample it in their own
//! passes through [`WgpuSurface::target_view`]. Fans and strips are expanded
//! to triangle lists on the CPU.

use crate::core::constants::BYTES_PER_PIXEL;
use crate::rendering::surface::{
    DepthBufferId, DrawCall, FilterMode, FramebufferId, FramebufferStatus, GpuSurface,
    ShaderVariant, TextureId,
};
use crate::tiles::source::PixelBuffer;
use crate::{PyramidError, Result};
use bytemuck::{Pod, Zeroable};
use fxhash::FxHashMap;
use nalgebra::Matrix4;
use wgpu::util::DeviceExt;

const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth16Unorm;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    matrix: [[f32; 4]; 4],
    color: [f32; 4],
    flags: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    tex_coord: [f32; 2],
}

struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    filter: FilterMode,
}

struct GpuDepth {
    // kept alive for the view
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

pub struct WgpuSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    linear: wgpu::Sampler,
    nearest: wgpu::Sampler,
    target: GpuTexture,
    target_depth: GpuDepth,
    textures: FxHashMap<TextureId, GpuTexture>,
    framebuffers: FxHashMap<FramebufferId, ()>,
    depth_buffers: FxHashMap<DepthBufferId, GpuDepth>,
    bound: Option<(TextureId, DepthBufferId)>,
    variant: ShaderVariant,
    matrix: Matrix4<f32>,
    color: [f32; 4],
    next_id: u32,
}

impl WgpuSurface {
    /// Creates a device and a `width` x `height` render target
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            dx12_shader_compiler: Default::default(),
            flags: wgpu::InstanceFlags::default(),
            gles_minor_version: wgpu::Gles3MinorVersion::Automatic,
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| PyramidError::Gpu("no suitable adapter".into()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("quadtile device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| PyramidError::Gpu(format!("failed to create device: {}", e)))?;

        Self::with_device(device, queue, width, height)
    }

    /// Blocking variant of [`WgpuSurface::new`]
    pub fn new_blocking(width: u32, height: u32) -> Result<Self> {
        pollster::block_on(Self::new(width, height))
    }

    /// Uses an existing device, for embedders that already own one
    pub fn with_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Box::new(PyramidError::Gpu(format!(
                "invalid target size {}x{}",
                width, height
            ))));
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("quad shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/quad.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("quad bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("quad pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("quad pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x3,
                            offset: 0,
                            shader_location: 0,
                        },
                        wgpu::VertexAttribute {
                            format: wgpu::VertexFormat::Float32x2,
                            offset: 12,
                            shader_location: 1,
                        },
                    ],
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: COLOR_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let sampler = |filter: wgpu::FilterMode, label: &str| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some(label),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                address_mode_w: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            })
        };
        let linear = sampler(wgpu::FilterMode::Linear, "linear sampler");
        let nearest = sampler(wgpu::FilterMode::Nearest, "nearest sampler");

        let target = new_color_texture(&device, width, height, FilterMode::Linear, true);
        let target_depth = new_depth(&device, width, height);

        log::info!("wgpu surface ready ({}x{})", width, height);

        Ok(Self {
            device,
            queue,
            pipeline,
            bind_group_layout,
            linear,
            nearest,
            target,
            target_depth,
            textures: FxHashMap::default(),
            framebuffers: FxHashMap::default(),
            depth_buffers: FxHashMap::default(),
            bound: None,
            variant: ShaderVariant::Plain,
            matrix: Matrix4::identity(),
            color: [1.0; 4],
            next_id: 0,
        })
    }

    pub fn target_view(&self) -> &wgpu::TextureView {
        &self.target.view
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Copies the render target back to the CPU
    pub fn read_pixels(&self) -> Result<PixelBuffer> {
        let (width, height) = (self.target.width, self.target.height);
        let unpadded = width as usize * BYTES_PER_PIXEL;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback"),
            size: (padded * height as usize) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded as u32),
                    rows_per_image: Some(height),
                },
            },
            extent(width, height),
        );
        self.queue.submit(Some(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| PyramidError::Gpu(format!("readback channel closed: {}", e)))?
            .map_err(|e| PyramidError::Gpu(format!("readback failed: {}", e)))?;

        let mapped = slice.get_mapped_range();
        let mut data = Vec::with_capacity(unpadded * height as usize);
        for row in mapped.chunks(padded) {
            data.extend_from_slice(&row[..unpadded]);
        }
        drop(mapped);
        buffer.unmap();

        PixelBuffer::new(width, height, data)
    }

    fn next(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Color and depth views draws currently go to
    fn current_target(&self) -> Option<(&wgpu::TextureView, &wgpu::TextureView, bool)> {
        match self.bound {
            None => Some((&self.target.view, &self.target_depth.view, false)),
            Some((color, depth)) => {
                let color = self.textures.get(&color)?;
                let depth = self.depth_buffers.get(&depth)?;
                Some((&color.view, &depth.view, true))
            }
        }
    }
}

fn extent(width: u32, height: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    }
}

fn new_color_texture(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    filter: FilterMode,
    readable: bool,
) -> GpuTexture {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
        | wgpu::TextureUsages::COPY_DST
        | wgpu::TextureUsages::RENDER_ATTACHMENT;
    if readable {
        usage |= wgpu::TextureUsages::COPY_SRC;
    }
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("tile texture"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COLOR_FORMAT,
        usage,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width,
        height,
        filter,
    }
}

fn new_depth(device: &wgpu::Device, width: u32, height: u32) -> GpuDepth {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("depth buffer"),
        size: extent(width, height),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuDepth {
        _texture: texture,
        view,
        width,
        height,
    }
}

impl GpuSurface for WgpuSurface {
    fn create_texture(&mut self, width: u32, height: u32, filter: FilterMode) -> Result<TextureId> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > limit || height > limit {
            return Err(Box::new(PyramidError::Gpu(format!(
                "cannot create a {}x{} texture",
                width, height
            ))));
        }
        let id = TextureId(self.next());
        let texture = new_color_texture(&self.device, width, height, filter, false);
        self.textures.insert(id, texture);
        Ok(id)
    }

    fn upload_texture(&mut self, texture: TextureId, pixels: &PixelBuffer) -> Result<()> {
        let entry = self
            .textures
            .get(&texture)
            .ok_or_else(|| PyramidError::Gpu(format!("upload to unknown texture {}", texture.0)))?;
        if entry.width != pixels.width || entry.height != pixels.height {
            return Err(Box::new(PyramidError::Gpu(format!(
                "upload of {}x{} pixels into a {}x{} texture",
                pixels.width, pixels.height, entry.width, entry.height
            ))));
        }
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &pixels.data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(pixels.width * BYTES_PER_PIXEL as u32),
                rows_per_image: Some(pixels.height),
            },
            extent(pixels.width, pixels.height),
        );
        Ok(())
    }

    fn set_texture_filter(&mut self, texture: TextureId, filter: FilterMode) {
        if let Some(entry) = self.textures.get_mut(&texture) {
            entry.filter = filter;
        }
    }

    fn destroy_texture(&mut self, texture: TextureId) {
        match self.textures.remove(&texture) {
            Some(entry) => entry.texture.destroy(),
            None => log::warn!("destroying unknown texture {}", texture.0),
        }
    }

    fn create_framebuffer(&mut self) -> Result<FramebufferId> {
        let id = FramebufferId(self.next());
        self.framebuffers.insert(id, ());
        Ok(id)
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId) {
        self.framebuffers.remove(&framebuffer);
    }

    fn create_depth_buffer(&mut self, width: u32, height: u32) -> Result<DepthBufferId> {
        let id = DepthBufferId(self.next());
        let depth = new_depth(&self.device, width, height);
        self.depth_buffers.insert(id, depth);
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
        if !self.framebuffers.contains_key(&framebuffer) {
            return FramebufferStatus::Incomplete;
        }
        let (Some(c), Some(d)) = (self.textures.get(&color), self.depth_buffers.get(&depth)) else {
            return FramebufferStatus::Incomplete;
        };
        // wgpu wants attachments of equal size
        if c.width != d.width || c.height != d.height {
            return FramebufferStatus::Incomplete;
        }
        self.bound = Some((color, depth));
        FramebufferStatus::Complete
    }

    fn unbind_framebuffer(&mut self) {
        self.bound = None;
    }

    fn clear(&mut self, rgba: [f32; 4]) {
        let Some((color, depth, _)) = self.current_target() else {
            return;
        };
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear encoder"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: rgba[0] as f64,
                            g: rgba[1] as f64,
                            b: rgba[2] as f64,
                            a: rgba[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(Some(encoder.finish()));
    }

    fn use_program(&mut self, variant: ShaderVariant) {
        self.variant = variant;
    }

    fn set_matrix(&mut self, matrix: &Matrix4<f32>) {
        self.matrix = *matrix;
    }

    fn set_color(&mut self, rgba: [f32; 4]) {
        self.color = rgba;
    }

    fn draw(&mut self, call: &DrawCall<'_>) {
        let Some(texture) = self.textures.get(&call.texture) else {
            log::error!("draw references dead texture {}", call.texture.0);
            return;
        };

        let vertices: Vec<Vertex> = call
            .triangle_list()
            .into_iter()
            .filter_map(|i| {
                let i = i as usize;
                if i >= call.vertex_count {
                    return None;
                }
                let v = &call.vertices[i * call.vertex_size..(i + 1) * call.vertex_size];
                let t = &call.tex_coords[i * 2..i * 2 + 2];
                Some(Vertex {
                    position: [v[0], v[1], if call.vertex_size > 2 { v[2] } else { 0.0 }],
                    tex_coord: [t[0], t[1]],
                })
            })
            .collect();
        if vertices.is_empty() {
            return;
        }

        let Some((color_view, depth_view, offscreen)) = self.current_target() else {
            log::error!("draw into a framebuffer with missing attachments");
            return;
        };

        let uniforms = Uniforms {
            matrix: self.matrix.into(),
            color: self.color,
            flags: [
                if offscreen { -1.0 } else { 1.0 },
                if self.variant == ShaderVariant::Tinted { 1.0 } else { 0.0 },
                0.0,
                0.0,
            ],
        };
        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("quad vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let sampler = match texture.filter {
            FilterMode::Linear => &self.linear,
            FilterMode::Nearest => &self.nearest,
        };
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("quad bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("quad encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("quad pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, vertex_buffer.slice(..));
            pass.draw(0..vertices.len() as u32, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
    }
}
