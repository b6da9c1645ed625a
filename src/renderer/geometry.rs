// Full-screen quad geometry
// Two triangles in NDC, each vertex carrying (x, y, z, s, t)

use super::RendererError;
use super::context::{BufferHandle, GraphicsContext};

/// Interleaved vertex: position at location 0, texture coordinate at location 1
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub tex_coord: [f32; 2],
}

/// Floats per vertex
pub const VERTEX_FLOATS: usize = 5;
/// Byte stride of one vertex
pub const VERTEX_STRIDE: u64 = (VERTEX_FLOATS * std::mem::size_of::<f32>()) as u64;
/// Byte offset of the texture coordinate inside a vertex
pub const TEX_COORD_OFFSET: u64 = (3 * std::mem::size_of::<f32>()) as u64;

pub const POSITION_LOCATION: u32 = 0;
pub const TEX_COORD_LOCATION: u32 = 1;

/// t = 0 is the first image row and maps to the top of the viewport
pub const QUAD_VERTICES: [Vertex; 6] = [
    // first triangle
    Vertex { position: [1.0, 1.0, 0.0], tex_coord: [1.0, 0.0] },
    Vertex { position: [1.0, -1.0, 0.0], tex_coord: [1.0, 1.0] },
    Vertex { position: [-1.0, -1.0, 0.0], tex_coord: [0.0, 1.0] },
    // second triangle
    Vertex { position: [1.0, 1.0, 0.0], tex_coord: [1.0, 0.0] },
    Vertex { position: [-1.0, -1.0, 0.0], tex_coord: [0.0, 1.0] },
    Vertex { position: [-1.0, 1.0, 0.0], tex_coord: [0.0, 0.0] },
];

/// Static quad uploaded once per graphics context
#[derive(Debug)]
pub struct GeometryBuffer {
    buffer: BufferHandle,
    vertex_count: u32,
}

impl GeometryBuffer {
    pub fn new<C: GraphicsContext>(ctx: &mut C) -> Result<Self, RendererError> {
        let buffer = ctx.create_vertex_buffer(&QUAD_VERTICES)?;
        Ok(Self {
            buffer,
            vertex_count: QUAD_VERTICES.len() as u32,
        })
    }

    pub fn buffer(&self) -> &BufferHandle {
        &self.buffer
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn release<C: GraphicsContext>(self, ctx: &mut C) {
        ctx.delete_buffer(self.buffer);
    }
}
