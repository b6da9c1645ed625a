// GPU renderer module
// Planar I420 frames uploaded as three textures and converted in the fragment shader

pub mod context;
pub mod frame_renderer;
pub mod frame_slot;
pub mod geometry;
pub mod planes;
pub mod shader;
pub mod texture_set;
mod wgpu_renderer;
mod window;

#[cfg(test)]
pub(crate) mod recording;

pub use context::{
    BufferHandle, DrawCall, GraphicsContext, ProgramHandle, TextureHandle, TextureParams, Viewport,
};
pub use frame_renderer::{DrawOutcome, FrameRenderer, LifecycleEvent, RenderOptions, RendererState};
pub use frame_slot::{FrameSlot, FrameSubmitter, I420Frame, SlotStats};
pub use planes::{I420Planes, Plane, PlaneView, i420_frame_len, split_i420};
pub use shader::{LinkedProgram, ProgramBindings, ShaderPipeline, ShaderSources, ShaderStage};
pub use wgpu_renderer::WgpuContext;
pub use window::{RenderWindow, RenderWindowHandle, WindowEvent};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Invalid I420 frame: {width}x{height} with {len} bytes")]
    InvalidFrameSize { width: u32, height: u32, len: usize },
    #[error("Failed to compile {stage} shader:\n{log}")]
    ShaderCompile { stage: ShaderStage, log: String },
    #[error("Failed to link shader program:\n{log}")]
    ShaderLink { log: String },
    #[error("Failed to load shader source: {0}")]
    ShaderSource(String),
    #[error("Failed to initialize renderer: {0}")]
    InitError(String),
    #[error("Render failed: {0}")]
    RenderError(String),
    #[error("Window error: {0}")]
    WindowError(String),
    #[error("GPU not available: {0}")]
    GpuNotAvailable(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// How the video is placed inside the surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    /// Viewport covers the whole surface
    #[default]
    Stretch,
    /// Letterbox/pillarbox to keep the frame aspect ratio
    Fit,
}

impl ScaleMode {
    /// Viewport for a surface of `surface` size showing a frame of `frame` size
    pub fn viewport(self, surface: (u32, u32), frame: (u32, u32)) -> Viewport {
        let (surface_w, surface_h) = surface;
        let full = Viewport {
            x: 0.0,
            y: 0.0,
            width: surface_w as f32,
            height: surface_h as f32,
        };

        let (frame_w, frame_h) = frame;
        if self == ScaleMode::Stretch || frame_w == 0 || frame_h == 0 || surface_h == 0 {
            return full;
        }

        let surface_w = surface_w as f32;
        let surface_h = surface_h as f32;
        let frame_aspect = frame_w as f32 / frame_h as f32;
        let surface_aspect = surface_w / surface_h;

        if frame_aspect > surface_aspect {
            // Video wider than surface - fit width, letterbox top/bottom
            let h = surface_w / frame_aspect;
            Viewport {
                x: 0.0,
                y: (surface_h - h) / 2.0,
                width: surface_w,
                height: h,
            }
        } else {
            // Video taller than surface - fit height, pillarbox left/right
            let w = surface_h * frame_aspect;
            Viewport {
                x: (surface_w - w) / 2.0,
                y: 0.0,
                width: w,
                height: surface_h,
            }
        }
    }
}
