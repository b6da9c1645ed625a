// Render window for the I420 player
// Uses winit for window management and drives the frame renderer lifecycle from its event loop

use super::frame_renderer::{DrawOutcome, FrameRenderer};
use super::frame_slot::{FrameSlot, FrameSubmitter, SlotStats};
use super::shader::ShaderSources;
use super::wgpu_renderer::WgpuContext;
use super::RendererError;
use crate::config::PlayerConfig;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent as WinitWindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop, EventLoopProxy},
    window::{Window, WindowAttributes, WindowId},
};

/// Events from the render window
#[derive(Debug, Clone, PartialEq)]
pub enum WindowEvent {
    Resized(u32, u32),
    CloseRequested,
    Focused(bool),
    /// The renderer could not be brought up; the window closes
    Failed(String),
}

/// Command to the render window
enum WindowCommand {
    SetTitle(String),
    Close,
}

/// Wakes the idle event loop from other threads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowWake {
    FrameReady,
    Command,
}

/// Handle to control the render window from another thread
#[derive(Clone)]
pub struct RenderWindowHandle {
    command_tx: Sender<WindowCommand>,
    proxy: EventLoopProxy<WindowWake>,
    event_rx: Receiver<WindowEvent>,
    is_open: Arc<AtomicBool>,
    slot: Arc<FrameSlot>,
}

impl RenderWindowHandle {
    /// Handle for producer threads to submit I420 frames
    pub fn submitter(&self) -> FrameSubmitter {
        FrameSubmitter::new(self.slot.clone())
    }

    /// Set window title
    pub fn set_title(&self, title: &str) -> Result<(), RendererError> {
        self.command_tx
            .send(WindowCommand::SetTitle(title.to_string()))
            .map_err(|_| RendererError::WindowError("Failed to send command".to_string()))?;
        self.proxy
            .send_event(WindowWake::Command)
            .map_err(|_| RendererError::WindowError("Window event loop closed".to_string()))
    }

    /// Close the window
    pub fn close(&self) {
        let _ = self.command_tx.send(WindowCommand::Close);
        let _ = self.proxy.send_event(WindowWake::Command);
    }

    /// Check if window is still open
    pub fn is_open(&self) -> bool {
        self.is_open.load(Ordering::Relaxed)
    }

    pub fn stats(&self) -> SlotStats {
        self.slot.stats()
    }

    /// Try to receive a window event (non-blocking)
    pub fn try_recv_event(&self) -> Option<WindowEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Receive a window event (blocking)
    pub fn recv_event(&self) -> Option<WindowEvent> {
        self.event_rx.recv().ok()
    }

    /// Receive a window event, giving up after `timeout`
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<WindowEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }
}

/// Render window state
pub struct RenderWindow {
    config: PlayerConfig,
    command_rx: Receiver<WindowCommand>,
    event_tx: Sender<WindowEvent>,
    is_open: Arc<AtomicBool>,
    window: Option<Arc<Window>>,
    renderer: FrameRenderer<WgpuContext>,
}

fn build_event_loop() -> Result<EventLoop<WindowWake>, RendererError> {
    #[allow(unused_mut)]
    let mut builder = EventLoop::<WindowWake>::with_user_event();
    // The loop runs off the main thread
    #[cfg(target_os = "linux")]
    winit::platform::x11::EventLoopBuilderExtX11::with_any_thread(&mut builder, true);
    #[cfg(target_os = "windows")]
    winit::platform::windows::EventLoopBuilderExtWindows::with_any_thread(&mut builder, true);
    builder
        .build()
        .map_err(|e| RendererError::WindowError(format!("Failed to create event loop: {}", e)))
}

impl RenderWindow {
    /// Create a new render window and return a handle to control it
    pub fn create(config: PlayerConfig) -> Result<RenderWindowHandle, RendererError> {
        config.validate()?;
        let sources = config.shader_sources()?;

        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let is_open = Arc::new(AtomicBool::new(true));
        let is_open_clone = is_open.clone();

        // Spawn window thread
        std::thread::Builder::new()
            .name("render-window".to_string())
            .spawn(move || {
                let event_loop = match build_event_loop() {
                    Ok(event_loop) => event_loop,
                    Err(e) => {
                        is_open_clone.store(false, Ordering::Relaxed);
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Each accepted frame wakes the loop for one redraw
                let proxy = event_loop.create_proxy();
                let frame_proxy = Mutex::new(proxy.clone());
                let slot = Arc::new(FrameSlot::with_waker(move || {
                    let _ = frame_proxy.lock().send_event(WindowWake::FrameReady);
                }));
                let _ = ready_tx.send(Ok((slot.clone(), proxy)));

                let mut app = RenderWindow::new(
                    config,
                    sources,
                    slot,
                    command_rx,
                    event_tx,
                    is_open_clone,
                );
                if let Err(e) = event_loop.run_app(&mut app) {
                    log::error!("Render window event loop failed: {}", e);
                }
                app.shutdown();
            })
            .map_err(|e| RendererError::WindowError(format!("Failed to spawn window thread: {}", e)))?;

        let (slot, proxy) = ready_rx
            .recv()
            .map_err(|_| RendererError::WindowError("Window thread exited".to_string()))??;

        Ok(RenderWindowHandle {
            command_tx,
            proxy,
            event_rx,
            is_open,
            slot,
        })
    }

    fn new(
        config: PlayerConfig,
        sources: ShaderSources,
        slot: Arc<FrameSlot>,
        command_rx: Receiver<WindowCommand>,
        event_tx: Sender<WindowEvent>,
        is_open: Arc<AtomicBool>,
    ) -> Self {
        let renderer = FrameRenderer::new(slot, sources, config.render_options());
        Self {
            config,
            command_rx,
            event_tx,
            is_open,
            window: None,
            renderer,
        }
    }

    fn process_commands(&mut self) {
        while let Ok(cmd) = self.command_rx.try_recv() {
            match cmd {
                WindowCommand::SetTitle(title) => {
                    if let Some(ref window) = self.window {
                        window.set_title(&title);
                    }
                    self.config.title = title;
                }
                WindowCommand::Close => {
                    self.is_open.store(false, Ordering::Relaxed);
                }
            }
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: RendererError) {
        log::error!("Render window failed: {}", error);
        let _ = self.event_tx.send(WindowEvent::Failed(error.to_string()));
        self.is_open.store(false, Ordering::Relaxed);
        event_loop.exit();
    }

    fn shutdown(&mut self) {
        self.renderer.surface_destroyed();
        self.is_open.store(false, Ordering::Relaxed);
    }
}

impl ApplicationHandler<WindowWake> for RenderWindow {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let window = match self.window {
            Some(ref window) => window.clone(),
            None => {
                let window_attrs = WindowAttributes::default()
                    .with_title(&self.config.title)
                    .with_inner_size(PhysicalSize::new(self.config.width, self.config.height));

                match event_loop.create_window(window_attrs) {
                    Ok(window) => {
                        let window = Arc::new(window);
                        self.window = Some(window.clone());
                        window
                    }
                    Err(e) => {
                        self.fail(
                            event_loop,
                            RendererError::WindowError(format!("Failed to create window: {}", e)),
                        );
                        return;
                    }
                }
            }
        };

        let power_preference = self.config.power_preference.into();
        let context = pollster::block_on(async {
            WgpuContext::new_with_surface(window.clone(), power_preference).await
        });

        match context.and_then(|ctx| self.renderer.surface_created(ctx)) {
            Ok(()) => {
                let size = window.inner_size();
                log::info!("Render window created: {}x{}", size.width, size.height);
                window.request_redraw();
            }
            Err(e) => self.fail(event_loop, e),
        }
    }

    fn user_event(&mut self, _event_loop: &ActiveEventLoop, wake: WindowWake) {
        match wake {
            WindowWake::FrameReady => {
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
            }
            WindowWake::Command => self.process_commands(),
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        self.renderer.surface_destroyed();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WinitWindowEvent,
    ) {
        match event {
            WinitWindowEvent::CloseRequested => {
                self.renderer.surface_destroyed();
                self.is_open.store(false, Ordering::Relaxed);
                let _ = self.event_tx.send(WindowEvent::CloseRequested);
                event_loop.exit();
            }
            WinitWindowEvent::Resized(size) => {
                self.renderer.surface_resized(size.width, size.height);
                if let Some(ref window) = self.window {
                    window.request_redraw();
                }
                let _ = self.event_tx.send(WindowEvent::Resized(size.width, size.height));
            }
            WinitWindowEvent::Focused(focused) => {
                let _ = self.event_tx.send(WindowEvent::Focused(focused));
            }
            WinitWindowEvent::RedrawRequested => match self.renderer.draw_tick() {
                Ok(DrawOutcome::Drawn { .. }) | Ok(DrawOutcome::NoFrameYet) => {}
                Ok(outcome) => log::trace!("Draw tick: {:?}", outcome),
                Err(e) => log::error!("Render failed: {}", e),
            },
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        // Process commands even when idle
        self.process_commands();

        // Check if we should close
        if !self.is_open.load(Ordering::Relaxed) {
            self.renderer.surface_destroyed();
            event_loop.exit();
            return;
        }

        // Submissions and commands wake the loop through the proxy
        if self.config.continuous_redraw {
            if let Some(ref window) = self.window {
                window.request_redraw();
            }
            event_loop.set_control_flow(ControlFlow::Poll);
        } else {
            event_loop.set_control_flow(ControlFlow::Wait);
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}
