//! Frame renderer state machine.
//!
//! The host surface owner drives it from the render thread with
//! [`LifecycleEvent`]s. Frames arrive separately through the shared
//! [`FrameSlot`] and are uploaded on the next draw tick.

use super::frame_slot::{FrameSlot, FrameSubmitter, I420Frame};
use super::geometry::GeometryBuffer;
use super::shader::{ShaderPipeline, ShaderSources};
use super::texture_set::TextureSet;
use super::{DrawCall, GraphicsContext, RendererError, ScaleMode};
use std::sync::Arc;

/// Lifecycle inputs from the host surface owner
#[derive(Debug)]
pub enum LifecycleEvent<C> {
    /// A graphics context for a new surface
    SurfaceCreated(C),
    SurfaceResized { width: u32, height: u32 },
    DrawTick,
    SurfaceDestroyed,
}

/// Result of one draw tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawOutcome {
    /// The current frame was drawn
    Drawn { width: u32, height: u32 },
    /// No frame was ever submitted; nothing cleared or drawn
    NoFrameYet,
    /// No surface exists
    NoSurface,
    /// The surface was unavailable for this tick
    Skipped,
}

/// Public view of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initialized,
    Ready,
}

/// Drawing options fixed at construction
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub scale_mode: ScaleMode,
    pub clear_color: [f64; 4],
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            scale_mode: ScaleMode::Stretch,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Everything that lives exactly as long as one graphics context
struct GpuResources<C: GraphicsContext> {
    ctx: C,
    shader: ShaderPipeline,
    textures: TextureSet,
    geometry: GeometryBuffer,
}

impl<C: GraphicsContext> GpuResources<C> {
    fn create(mut ctx: C, sources: &ShaderSources) -> Result<Self, RendererError> {
        let shader = ShaderPipeline::create(&mut ctx, sources)?;

        let textures = match TextureSet::initialize(&mut ctx) {
            Ok(textures) => textures,
            Err(e) => {
                shader.release(&mut ctx);
                return Err(e);
            }
        };

        let geometry = match GeometryBuffer::new(&mut ctx) {
            Ok(geometry) => geometry,
            Err(e) => {
                textures.release(&mut ctx);
                shader.release(&mut ctx);
                return Err(e);
            }
        };

        Ok(Self {
            ctx,
            shader,
            textures,
            geometry,
        })
    }

    fn draw(&mut self, frame: &I420Frame, options: &RenderOptions) -> Result<DrawOutcome, RendererError> {
        let Some(planes) = frame.planes() else {
            return Ok(DrawOutcome::NoFrameYet);
        };

        self.textures.upload(&mut self.ctx, &planes)?;

        let (width, height) = planes.dimensions();
        let call = DrawCall {
            program: self.shader.program(),
            textures: self.textures.units(),
            vertices: self.geometry.buffer(),
            vertex_count: self.geometry.vertex_count(),
            viewport: options
                .scale_mode
                .viewport(self.ctx.surface_size(), (width, height)),
            clear_color: options.clear_color,
        };

        if self.ctx.draw(&call)? {
            Ok(DrawOutcome::Drawn { width, height })
        } else {
            Ok(DrawOutcome::Skipped)
        }
    }

    fn release(self) {
        let Self {
            mut ctx,
            shader,
            textures,
            geometry,
        } = self;
        geometry.release(&mut ctx);
        textures.release(&mut ctx);
        shader.release(&mut ctx);
    }
}

enum RenderState<C: GraphicsContext> {
    Uninitialized,
    Initialized(GpuResources<C>),
    Ready(GpuResources<C>),
}

/// Drives the I420 pipeline for one host surface
pub struct FrameRenderer<C: GraphicsContext> {
    state: RenderState<C>,
    slot: Arc<FrameSlot>,
    /// Render-side copy of the latest frame
    current: I420Frame,
    sources: ShaderSources,
    options: RenderOptions,
}

impl<C: GraphicsContext> FrameRenderer<C> {
    pub fn new(slot: Arc<FrameSlot>, sources: ShaderSources, options: RenderOptions) -> Self {
        Self {
            state: RenderState::Uninitialized,
            slot,
            current: I420Frame::new(),
            sources,
            options,
        }
    }

    /// Renderer with the bundled shaders and default options
    pub fn with_defaults(slot: Arc<FrameSlot>) -> Self {
        Self::new(slot, ShaderSources::bundled(), RenderOptions::default())
    }

    /// Handle for producer threads
    pub fn submitter(&self) -> FrameSubmitter {
        FrameSubmitter::new(self.slot.clone())
    }

    /// The graphics context while a surface is attached
    pub fn context(&self) -> Option<&C> {
        match &self.state {
            RenderState::Uninitialized => None,
            RenderState::Initialized(res) | RenderState::Ready(res) => Some(&res.ctx),
        }
    }

    pub fn state(&self) -> RendererState {
        match self.state {
            RenderState::Uninitialized => RendererState::Uninitialized,
            RenderState::Initialized(_) => RendererState::Initialized,
            RenderState::Ready(_) => RendererState::Ready,
        }
    }

    /// Dispatch one lifecycle event. Draw ticks report their outcome.
    pub fn handle(&mut self, event: LifecycleEvent<C>) -> Result<Option<DrawOutcome>, RendererError> {
        match event {
            LifecycleEvent::SurfaceCreated(ctx) => self.surface_created(ctx).map(|_| None),
            LifecycleEvent::SurfaceResized { width, height } => {
                self.surface_resized(width, height);
                Ok(None)
            }
            LifecycleEvent::DrawTick => self.draw_tick().map(Some),
            LifecycleEvent::SurfaceDestroyed => {
                self.surface_destroyed();
                Ok(None)
            }
        }
    }

    /// Build the program, textures and geometry in `ctx`
    pub fn surface_created(&mut self, ctx: C) -> Result<(), RendererError> {
        if !matches!(self.state, RenderState::Uninitialized) {
            log::warn!("Surface created while a context is live, releasing the old one");
            self.surface_destroyed();
        }

        let resources = GpuResources::create(ctx, &self.sources).inspect_err(|e| {
            log::error!("Renderer initialization failed: {}", e);
        })?;
        self.state = RenderState::Initialized(resources);
        log::info!("Renderer initialized");
        Ok(())
    }

    pub fn surface_resized(&mut self, width: u32, height: u32) {
        match &mut self.state {
            RenderState::Uninitialized => {
                log::debug!("Resize to {}x{} ignored, no surface", width, height);
            }
            RenderState::Initialized(res) | RenderState::Ready(res) => {
                res.ctx.resize_surface(width, height);
                log::debug!("Surface resized to {}x{}", width, height);
            }
        }
    }

    /// Upload and draw the most recently submitted frame
    pub fn draw_tick(&mut self) -> Result<DrawOutcome, RendererError> {
        self.slot.take_latest(&mut self.current);

        let outcome = match &mut self.state {
            RenderState::Uninitialized => return Ok(DrawOutcome::NoSurface),
            RenderState::Initialized(res) | RenderState::Ready(res) => {
                res.draw(&self.current, &self.options)?
            }
        };

        if let DrawOutcome::Drawn { width, height } = outcome {
            if let RenderState::Initialized(_) = self.state {
                if let RenderState::Initialized(res) =
                    std::mem::replace(&mut self.state, RenderState::Uninitialized)
                {
                    self.state = RenderState::Ready(res);
                    log::info!("Renderer ready, first frame {}x{}", width, height);
                }
            }
        }

        Ok(outcome)
    }

    /// Release every GPU object owned for the current context
    pub fn surface_destroyed(&mut self) {
        match std::mem::replace(&mut self.state, RenderState::Uninitialized) {
            RenderState::Uninitialized => {}
            RenderState::Initialized(res) | RenderState::Ready(res) => {
                res.release();
                log::info!("Renderer resources released");
            }
        }
    }
}

impl<C: GraphicsContext> Drop for FrameRenderer<C> {
    fn drop(&mut self) {
        self.surface_destroyed();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::recording::{CallLog, Failures, GpuCall, RecordingContext};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn frame(width: u32, height: u32, value: u8) -> Vec<u8> {
        vec![value; width as usize * height as usize * 3 / 2]
    }

    fn ready_renderer() -> (FrameRenderer<RecordingContext>, CallLog) {
        let mut renderer = FrameRenderer::with_defaults(Arc::new(FrameSlot::new()));
        let (ctx, log) = RecordingContext::new();
        renderer.surface_created(ctx).unwrap();
        (renderer, log)
    }

    #[test]
    fn test_tick_before_surface_is_noop() {
        let mut renderer: FrameRenderer<RecordingContext> =
            FrameRenderer::with_defaults(Arc::new(FrameSlot::new()));
        assert_eq!(renderer.draw_tick().unwrap(), DrawOutcome::NoSurface);
        assert_eq!(renderer.state(), RendererState::Uninitialized);
    }

    #[test]
    fn test_tick_before_first_frame_draws_nothing() {
        let (mut renderer, log) = ready_renderer();
        assert_eq!(renderer.state(), RendererState::Initialized);
        log.clear();

        assert_eq!(renderer.draw_tick().unwrap(), DrawOutcome::NoFrameYet);
        assert!(log.calls().is_empty());
        assert_eq!(renderer.state(), RendererState::Initialized);
    }

    #[test]
    fn test_initialization_creates_pipeline_objects() {
        let (_renderer, log) = ready_renderer();
        let calls = log.calls();
        assert!(matches!(&calls[0], GpuCall::CreateProgram { vertex_entry, .. } if vertex_entry == "vs_main"));
        let textures = calls
            .iter()
            .filter(|c| matches!(c, GpuCall::CreateTexture { .. }))
            .count();
        assert_eq!(textures, 3);
        assert!(calls.contains(&GpuCall::CreateBuffer { id: 5, vertex_count: 6 }));
        assert_eq!(log.live_objects(), 5);
    }

    #[test]
    fn test_draw_protocol() {
        let (mut renderer, log) = ready_renderer();
        log.clear();

        renderer.submitter().submit(&frame(1280, 720, 16), 1280, 720).unwrap();
        // Submission does not touch the context
        assert!(log.calls().is_empty());

        assert_eq!(
            renderer.draw_tick().unwrap(),
            DrawOutcome::Drawn { width: 1280, height: 720 }
        );
        assert_eq!(renderer.state(), RendererState::Ready);

        let calls = log.calls();
        assert_eq!(calls.len(), 4);
        let units: Vec<u32> = log.uploads().iter().map(|u| u.unit).collect();
        assert_eq!(units, vec![0, 1, 2]);
        match &calls[3] {
            GpuCall::Draw {
                program,
                textures,
                vertex_count,
                viewport,
            } => {
                assert_eq!(*program, 1);
                assert_eq!(*textures, [2, 3, 4]);
                assert_eq!(*vertex_count, 6);
                assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
            }
            other => panic!("expected draw, got {:?}", other),
        }

        // Later ticks redraw the same frame
        assert!(matches!(renderer.draw_tick().unwrap(), DrawOutcome::Drawn { .. }));
        assert_eq!(log.draw_count(), 2);
    }

    #[test]
    fn test_frame_submitted_before_surface_is_drawn() {
        let slot = Arc::new(FrameSlot::new());
        let mut renderer = FrameRenderer::with_defaults(slot.clone());
        FrameSubmitter::new(slot).submit(&frame(64, 48, 100), 64, 48).unwrap();
        assert_eq!(renderer.draw_tick().unwrap(), DrawOutcome::NoSurface);

        let (ctx, log) = RecordingContext::new();
        renderer.surface_created(ctx).unwrap();
        assert_eq!(
            renderer.draw_tick().unwrap(),
            DrawOutcome::Drawn { width: 64, height: 48 }
        );
        assert_eq!(log.uploads()[0].uniform, Some(100));
    }

    #[test]
    fn test_resolution_change_between_ticks() {
        let (mut renderer, log) = ready_renderer();
        let submitter = renderer.submitter();

        submitter.submit(&frame(1280, 720, 235), 1280, 720).unwrap();
        renderer.draw_tick().unwrap();
        submitter.submit(&frame(640, 480, 128), 640, 480).unwrap();
        assert_eq!(
            renderer.draw_tick().unwrap(),
            DrawOutcome::Drawn { width: 640, height: 480 }
        );

        let uploads = log.uploads();
        let last = &uploads[uploads.len() - 3..];
        assert_eq!((last[0].width, last[0].height), (640, 480));
        assert_eq!((last[1].width, last[1].height), (320, 240));
        assert_eq!((last[2].width, last[2].height), (320, 240));
        assert!(last.iter().all(|u| u.uniform == Some(128)));
    }

    #[test]
    fn test_resize_updates_viewport_only() {
        let (mut renderer, log) = ready_renderer();
        renderer.submitter().submit(&frame(64, 48, 1), 64, 48).unwrap();
        log.clear();

        renderer.handle(LifecycleEvent::SurfaceResized { width: 1080, height: 1920 }).unwrap();
        assert_eq!(log.calls(), vec![GpuCall::ResizeSurface { width: 1080, height: 1920 }]);

        renderer.handle(LifecycleEvent::DrawTick).unwrap();
        let viewport = log
            .calls()
            .into_iter()
            .find_map(|c| match c {
                GpuCall::Draw { viewport, .. } => Some(viewport),
                _ => None,
            })
            .unwrap();
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1080.0, 1920.0));
    }

    #[test]
    fn test_fit_mode_letterboxes() {
        let options = RenderOptions {
            scale_mode: ScaleMode::Fit,
            ..RenderOptions::default()
        };
        let mut renderer =
            FrameRenderer::new(Arc::new(FrameSlot::new()), ShaderSources::bundled(), options);
        let (ctx, log) = RecordingContext::new();
        renderer.surface_created(ctx).unwrap();
        renderer.surface_resized(1000, 1000);
        renderer.submitter().submit(&frame(200, 100, 1), 200, 100).unwrap();
        renderer.draw_tick().unwrap();

        let viewport = log
            .calls()
            .into_iter()
            .find_map(|c| match c {
                GpuCall::Draw { viewport, .. } => Some(viewport),
                _ => None,
            })
            .unwrap();
        assert_eq!((viewport.width, viewport.height), (1000.0, 500.0));
        assert_eq!(viewport.y, 250.0);
    }

    #[test]
    fn test_teardown_releases_everything_once() {
        let (mut renderer, log) = ready_renderer();
        renderer.submitter().submit(&frame(64, 48, 1), 64, 48).unwrap();
        renderer.draw_tick().unwrap();

        renderer.handle(LifecycleEvent::SurfaceDestroyed).unwrap();
        assert_eq!(log.live_objects(), 0);
        assert_eq!(renderer.state(), RendererState::Uninitialized);

        // A second destroy has nothing left to release
        renderer.surface_destroyed();
        let deletes = log
            .calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    GpuCall::DeleteProgram { .. } | GpuCall::DeleteTexture { .. } | GpuCall::DeleteBuffer { .. }
                )
            })
            .count();
        assert_eq!(deletes, 5);
        assert_eq!(renderer.draw_tick().unwrap(), DrawOutcome::NoSurface);
    }

    #[test]
    fn test_recreated_surface_shows_last_frame() {
        let (mut renderer, first_log) = ready_renderer();
        renderer.submitter().submit(&frame(64, 48, 9), 64, 48).unwrap();
        renderer.draw_tick().unwrap();
        renderer.surface_destroyed();

        let (ctx, log) = RecordingContext::new();
        renderer.handle(LifecycleEvent::SurfaceCreated(ctx)).unwrap();
        assert!(matches!(renderer.draw_tick().unwrap(), DrawOutcome::Drawn { .. }));
        assert_eq!(log.uploads()[0].uniform, Some(9));
        assert_eq!(first_log.live_objects(), 0);
    }

    #[test]
    fn test_drop_releases_resources() {
        let (renderer, log) = ready_renderer();
        drop(renderer);
        assert_eq!(log.live_objects(), 0);
    }

    #[test]
    fn test_init_failure_stays_uninitialized() {
        for failures in [
            Failures { program: true, ..Failures::default() },
            Failures { texture: true, ..Failures::default() },
            Failures { buffer: true, ..Failures::default() },
        ] {
            let mut renderer = FrameRenderer::with_defaults(Arc::new(FrameSlot::new()));
            let (ctx, log) = RecordingContext::with_failures(failures);
            assert!(matches!(
                renderer.surface_created(ctx),
                Err(RendererError::InitError(_))
            ));
            assert_eq!(renderer.state(), RendererState::Uninitialized);
            assert_eq!(log.live_objects(), 0);
        }
    }

    #[test]
    fn test_shader_error_is_fatal() {
        let sources = ShaderSources {
            vertex: "not wgsl".to_string(),
            fragment: ShaderSources::bundled().fragment,
        };
        let mut renderer =
            FrameRenderer::new(Arc::new(FrameSlot::new()), sources, RenderOptions::default());
        let (ctx, log) = RecordingContext::new();
        assert!(matches!(
            renderer.surface_created(ctx),
            Err(RendererError::ShaderCompile { .. })
        ));
        assert_eq!(renderer.state(), RendererState::Uninitialized);
        assert!(log.calls().is_empty());
    }

    #[test]
    fn test_concurrent_submit_with_tick_loop() {
        let (mut renderer, log) = ready_renderer();
        let submitter = renderer.submitter();
        let done = Arc::new(AtomicBool::new(false));

        let producer = {
            let done = done.clone();
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    let (w, h) = if i % 3 == 0 { (32, 16) } else { (64, 48) };
                    submitter.submit(&frame(w, h, (i % 251) as u8), w, h).unwrap();
                }
                done.store(true, Ordering::Release);
            })
        };

        while !done.load(Ordering::Acquire) {
            renderer.draw_tick().unwrap();
        }
        producer.join().unwrap();
        renderer.draw_tick().unwrap();

        // Every draw uploaded three planes of one and the same frame
        let uploads = log.uploads();
        assert_eq!(uploads.len() % 3, 0);
        for set in uploads.chunks(3) {
            let value = set[0].uniform.expect("uniform plane");
            assert!(set.iter().all(|u| u.uniform == Some(value)));
            assert_eq!((set[0].width / 2, set[0].height / 2), (set[1].width, set[1].height));
            assert_eq!((set[1].width, set[1].height), (set[2].width, set[2].height));
        }
        let last = &uploads[uploads.len() - 3];
        assert_eq!(last.uniform, Some((499 % 251) as u8));
    }
}
