// Recording graphics context for tests
// Logs every GPU call so tests can assert on the draw protocol

use super::RendererError;
use super::context::{
    BufferHandle, DrawCall, GraphicsContext, ProgramHandle, TextureHandle, TextureParams, Viewport,
};
use super::geometry::Vertex;
use super::shader::LinkedProgram;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub texture: u32,
    pub unit: u32,
    pub width: u32,
    pub height: u32,
    pub len: usize,
    /// The byte value when every byte of the upload is equal
    pub uniform: Option<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GpuCall {
    CreateProgram { id: u32, vertex_entry: String },
    DeleteProgram { id: u32 },
    CreateTexture { id: u32, params: TextureParams },
    Upload(Upload),
    DeleteTexture { id: u32 },
    CreateBuffer { id: u32, vertex_count: usize },
    DeleteBuffer { id: u32 },
    ResizeSurface { width: u32, height: u32 },
    Draw {
        program: u32,
        textures: [u32; 3],
        vertex_count: u32,
        viewport: Viewport,
    },
}

#[derive(Default)]
struct LogInner {
    calls: Vec<GpuCall>,
    live: HashSet<(char, u32)>,
}

/// Shared view of the calls made on a `RecordingContext`
#[derive(Clone, Default)]
pub struct CallLog {
    inner: Arc<Mutex<LogInner>>,
}

impl CallLog {
    pub fn calls(&self) -> Vec<GpuCall> {
        self.inner.lock().calls.clone()
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                GpuCall::Upload(upload) => Some(upload),
                _ => None,
            })
            .collect()
    }

    pub fn draw_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, GpuCall::Draw { .. }))
            .count()
    }

    /// Objects created and not yet deleted
    pub fn live_objects(&self) -> usize {
        self.inner.lock().live.len()
    }

    pub fn clear(&self) {
        self.inner.lock().calls.clear();
    }

    fn push(&self, call: GpuCall) {
        self.inner.lock().calls.push(call);
    }

    fn create(&self, kind: char, id: u32) {
        self.inner.lock().live.insert((kind, id));
    }

    fn delete(&self, kind: char, id: u32) {
        let removed = self.inner.lock().live.remove(&(kind, id));
        assert!(removed, "object {}{} deleted twice or never created", kind, id);
    }
}

/// Failure injection points
#[derive(Debug, Clone, Copy, Default)]
pub struct Failures {
    pub program: bool,
    pub texture: bool,
    pub buffer: bool,
}

pub struct RecordingContext {
    log: CallLog,
    next_id: u32,
    failures: Failures,
    size: (u32, u32),
}

impl RecordingContext {
    pub fn new() -> (Self, CallLog) {
        Self::with_failures(Failures::default())
    }

    pub fn with_failures(failures: Failures) -> (Self, CallLog) {
        let log = CallLog::default();
        (
            Self {
                log: log.clone(),
                next_id: 1,
                failures,
                size: (800, 600),
            },
            log,
        )
    }

    fn next(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

impl GraphicsContext for RecordingContext {
    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramHandle, RendererError> {
        if self.failures.program {
            return Err(RendererError::InitError("program creation failed".to_string()));
        }
        let id = self.next();
        self.log.create('p', id);
        self.log.push(GpuCall::CreateProgram {
            id,
            vertex_entry: program.vertex_entry.clone(),
        });
        Ok(ProgramHandle(id))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        self.log.delete('p', program.0);
        self.log.push(GpuCall::DeleteProgram { id: program.0 });
    }

    fn create_texture(&mut self, params: &TextureParams) -> Result<TextureHandle, RendererError> {
        if self.failures.texture {
            return Err(RendererError::InitError("texture creation failed".to_string()));
        }
        let id = self.next();
        self.log.create('t', id);
        self.log.push(GpuCall::CreateTexture { id, params: *params });
        Ok(TextureHandle(id))
    }

    fn upload_texture(
        &mut self,
        texture: &TextureHandle,
        unit: u32,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> Result<(), RendererError> {
        assert_eq!(data.len(), width as usize * height as usize);
        let uniform = match data.first() {
            Some(&first) if data.iter().all(|&b| b == first) => Some(first),
            _ => None,
        };
        self.log.push(GpuCall::Upload(Upload {
            texture: texture.0,
            unit,
            width,
            height,
            len: data.len(),
            uniform,
        }));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        self.log.delete('t', texture.0);
        self.log.push(GpuCall::DeleteTexture { id: texture.0 });
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<BufferHandle, RendererError> {
        if self.failures.buffer {
            return Err(RendererError::InitError("buffer creation failed".to_string()));
        }
        let id = self.next();
        self.log.create('b', id);
        self.log.push(GpuCall::CreateBuffer {
            id,
            vertex_count: vertices.len(),
        });
        Ok(BufferHandle(id))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        self.log.delete('b', buffer.0);
        self.log.push(GpuCall::DeleteBuffer { id: buffer.0 });
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        self.size = (width, height);
        self.log.push(GpuCall::ResizeSurface { width, height });
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<bool, RendererError> {
        self.log.push(GpuCall::Draw {
            program: call.program.0,
            textures: [call.textures[0].0, call.textures[1].0, call.textures[2].0],
            vertex_count: call.vertex_count,
            viewport: call.viewport,
        });
        Ok(true)
    }
}
