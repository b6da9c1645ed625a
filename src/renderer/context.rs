// Graphics context abstraction
// Every GPU call made by the I420 pipeline goes through this trait

use super::RendererError;
use super::geometry::Vertex;
use super::shader::LinkedProgram;

/// Compiled program owned by a graphics context
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub(crate) u32);

/// Single-channel texture owned by a graphics context
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub(crate) u32);

/// Vertex buffer owned by a graphics context
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u32);

impl ProgramHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl TextureHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

impl BufferHandle {
    pub fn id(&self) -> u32 {
        self.0
    }
}

/// Creation parameters of a plane texture.
///
/// Every plane texture samples with repeat addressing and linear
/// minification and magnification; backends apply that without options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureParams {
    pub label: &'static str,
}

/// Render area inside the surface, in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One draw of the full-screen quad
#[derive(Debug)]
pub struct DrawCall<'a> {
    pub program: &'a ProgramHandle,
    /// Textures bound to units 0, 1 and 2
    pub textures: [&'a TextureHandle; 3],
    pub vertices: &'a BufferHandle,
    pub vertex_count: u32,
    pub viewport: Viewport,
    pub clear_color: [f64; 4],
}

/// GPU operations needed by the I420 pipeline.
///
/// Implementations are confined to the render thread. Handles are
/// move-only, so deleting one consumes it.
pub trait GraphicsContext {
    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramHandle, RendererError>;

    fn delete_program(&mut self, program: ProgramHandle);

    fn create_texture(&mut self, params: &TextureParams) -> Result<TextureHandle, RendererError>;

    /// Replace the whole image of `texture` with `width x height` bytes and
    /// bind it to texture unit `unit`. The texture takes the new dimensions.
    fn upload_texture(
        &mut self,
        texture: &TextureHandle,
        unit: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), RendererError>;

    fn delete_texture(&mut self, texture: TextureHandle);

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<BufferHandle, RendererError>;

    fn delete_buffer(&mut self, buffer: BufferHandle);

    fn resize_surface(&mut self, width: u32, height: u32);

    /// Current render target size in pixels
    fn surface_size(&self) -> (u32, u32);

    /// Clear and draw. Returns `false` when the target was unavailable and
    /// the frame was skipped.
    fn draw(&mut self, call: &DrawCall<'_>) -> Result<bool, RendererError>;
}
