// I420 Player - GPU rendering of planar YUV 4:2:0 video frames
// Main library entry point

pub mod config;
pub mod convert;
pub mod renderer;

pub use config::{PlayerConfig, PowerMode};
pub use renderer::{
    FrameRenderer, FrameSubmitter, RenderWindow, RenderWindowHandle, RendererError, WindowEvent,
};
