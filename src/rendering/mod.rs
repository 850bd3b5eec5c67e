pub mod backend;
pub mod batch;
pub mod headless;
pub mod surface;
pub mod texture;
#[cfg(feature = "render")]
pub mod wgpu_surface;

// Re-export main types
pub use backend::{backend_for, DrawBackend, ImmediateDraw};
pub use batch::BatchDrawQueue;
pub use headless::{DrawRecord, HeadlessSurface};
pub use surface::{
    DepthBufferId, DrawCall, FilterMode, FramebufferId, FramebufferStatus, GpuSurface,
    PrimitiveMode, ShaderVariant, TextureId,
};
pub use texture::TextureResource;
#[cfg(feature = "render")]
pub use wgpu_surface::WgpuSurface;

pub mod shaders {
    pub const QUAD: &str = include_str!("shaders/quad.wgsl");
}
