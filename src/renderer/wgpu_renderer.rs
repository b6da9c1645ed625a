// wgpu-based graphics context
// Plane textures, the I420 pipeline and the quad, rendered to a window surface or offscreen

use super::context::{
    BufferHandle, DrawCall, GraphicsContext, ProgramHandle, TextureHandle, TextureParams,
};
use super::geometry::{TEX_COORD_OFFSET, VERTEX_STRIDE, Vertex};
use super::shader::LinkedProgram;
use super::RendererError;
use std::collections::HashMap;
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// Format of the offscreen target in headless mode
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

struct GpuProgram {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
}

struct PlaneTexture {
    label: &'static str,
    sampler: wgpu::Sampler,
    /// Created on first upload, recreated when the dimensions change
    texture: Option<wgpu::Texture>,
    width: u32,
    height: u32,
}

enum RenderTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
        width: u32,
        height: u32,
    },
}

/// `GraphicsContext` backed by a wgpu device
pub struct WgpuContext {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: RenderTarget,
    format: wgpu::TextureFormat,
    max_texture_dimension: u32,

    programs: HashMap<u32, GpuProgram>,
    textures: HashMap<u32, PlaneTexture>,
    buffers: HashMap<u32, wgpu::Buffer>,
    next_id: u32,
}

impl WgpuContext {
    /// Create a context rendering into a window
    pub async fn new_with_surface(
        window: Arc<winit::window::Window>,
        power_preference: wgpu::PowerPreference,
    ) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let size = window.inner_size();
        let surface = instance
            .create_surface(window)
            .map_err(|e| RendererError::InitError(format!("Failed to create surface: {}", e)))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RendererError::GpuNotAvailable(format!("Failed to request adapter: {}", e)))?;

        log::info!("Using GPU adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| RendererError::InitError(format!("Failed to create device: {}", e)))?;

        let capabilities = surface.get_capabilities(&adapter);
        let format = capabilities
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .copied()
            .or_else(|| capabilities.formats.first().copied())
            .ok_or_else(|| RendererError::InitError("Surface reports no formats".to_string()))?;

        // Pick the best present mode from what's supported
        let present_mode = if capabilities.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else if capabilities.present_modes.contains(&wgpu::PresentMode::Immediate) {
            wgpu::PresentMode::Immediate
        } else {
            wgpu::PresentMode::Fifo // always supported
        };
        log::info!(
            "wgpu surface format: {:?}, present mode: {:?} (available: {:?})",
            format,
            present_mode,
            capabilities.present_modes
        );

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self::from_parts(
            device,
            queue,
            RenderTarget::Surface { surface, config },
            format,
        ))
    }

    /// Create a context rendering into an offscreen `width x height` texture
    pub async fn headless(width: u32, height: u32) -> Result<Self, RendererError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .map_err(|e| RendererError::GpuNotAvailable(format!("Failed to request adapter: {}", e)))?;

        log::info!("Using GPU adapter (headless): {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor::default())
            .await
            .map_err(|e| RendererError::InitError(format!("Failed to create device: {}", e)))?;

        let texture = Self::create_offscreen(&device, width, height);
        Ok(Self::from_parts(
            device,
            queue,
            RenderTarget::Offscreen {
                texture,
                width: width.max(1),
                height: height.max(1),
            },
            OFFSCREEN_FORMAT,
        ))
    }

    fn from_parts(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: RenderTarget,
        format: wgpu::TextureFormat,
    ) -> Self {
        let max_texture_dimension = device.limits().max_texture_dimension_2d;
        log::info!(
            "wgpu graphics context initialized, max texture size {}",
            max_texture_dimension
        );
        Self {
            device,
            queue,
            target,
            format,
            max_texture_dimension,
            programs: HashMap::new(),
            textures: HashMap::new(),
            buffers: HashMap::new(),
            next_id: 1,
        }
    }

    fn create_offscreen(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Largest plane width or height the device accepts
    pub fn max_texture_dimension(&self) -> u32 {
        self.max_texture_dimension
    }

    /// Copy the offscreen target back as tightly packed RGBA rows
    pub fn read_pixels(&self) -> Result<Vec<u8>, RendererError> {
        let RenderTarget::Offscreen {
            texture,
            width,
            height,
        } = &self.target
        else {
            return Err(RendererError::RenderError(
                "Pixel readback needs an offscreen target".to_string(),
            ));
        };
        let (width, height) = (*width, *height);

        let row_bytes = width * 4;
        let padded_row_bytes = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_row_bytes as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row_bytes),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (map_tx, map_rx) = crossbeam_channel::bounded(1);
        buffer.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = map_tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map_err(|e| RendererError::RenderError(format!("Device poll failed: {}", e)))?;
        map_rx
            .recv()
            .map_err(|_| RendererError::RenderError("Readback was never mapped".to_string()))?
            .map_err(|e| RendererError::RenderError(format!("Failed to map readback: {}", e)))?;

        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        {
            let mapped = buffer.slice(..).get_mapped_range();
            for row in mapped.chunks_exact(padded_row_bytes as usize) {
                pixels.extend_from_slice(&row[..row_bytes as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }

    fn plane_view(&self, handle: &TextureHandle) -> Result<(wgpu::TextureView, &wgpu::Sampler), RendererError> {
        let plane = self
            .textures
            .get(&handle.0)
            .ok_or_else(|| RendererError::RenderError(format!("Unknown texture {}", handle.0)))?;
        let texture = plane.texture.as_ref().ok_or_else(|| {
            RendererError::RenderError(format!("{} has no image uploaded", plane.label))
        })?;
        Ok((
            texture.create_view(&wgpu::TextureViewDescriptor::default()),
            &plane.sampler,
        ))
    }
}

/// Plane dimensions must fit the device's 2D texture limit
fn check_texture_size(
    label: &str,
    width: u32,
    height: u32,
    max_dimension: u32,
) -> Result<(), RendererError> {
    if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
        return Err(RendererError::RenderError(format!(
            "{} of {}x{} exceeds the device texture limit of {}",
            label, width, height, max_dimension
        )));
    }
    Ok(())
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

impl GraphicsContext for WgpuContext {
    fn create_program(&mut self, program: &LinkedProgram) -> Result<ProgramHandle, RendererError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let vertex_shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("I420 Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(program.vertex_source.as_str().into()),
        });
        let fragment_shader = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("I420 Fragment Shader"),
            source: wgpu::ShaderSource::Wgsl(program.fragment_source.as_str().into()),
        });

        let mut entries = Vec::with_capacity(6);
        for sampler in &program.bindings.samplers {
            entries.push(texture_entry(sampler.texture_binding));
        }
        for sampler in &program.bindings.samplers {
            entries.push(sampler_entry(sampler.sampler_binding));
        }
        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("I420 Bind Group Layout"),
                    entries: &entries,
                });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("I420 Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                immediate_size: 0,
            });

        let attributes = [
            wgpu::VertexAttribute {
                offset: 0,
                shader_location: program.bindings.position_location,
                format: wgpu::VertexFormat::Float32x3,
            },
            wgpu::VertexAttribute {
                offset: TEX_COORD_OFFSET,
                shader_location: program.bindings.tex_coord_location,
                format: wgpu::VertexFormat::Float32x2,
            },
        ];

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("I420 Pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &vertex_shader,
                    entry_point: Some(program.vertex_entry.as_str()),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: VERTEX_STRIDE,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &attributes,
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &fragment_shader,
                    entry_point: Some(program.fragment_entry.as_str()),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview_mask: None,
                cache: None,
            });

        if let Some(err) = pollster::block_on(scope.pop()) {
            return Err(RendererError::ShaderLink {
                log: err.to_string(),
            });
        }

        let id = self.next_id();
        self.programs.insert(
            id,
            GpuProgram {
                pipeline,
                bind_group_layout,
            },
        );
        log::debug!("Created render pipeline {}", id);
        Ok(ProgramHandle(id))
    }

    fn delete_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program.0).is_none() {
            log::warn!("Program {} was not live", program.0);
        }
    }

    fn create_texture(&mut self, params: &TextureParams) -> Result<TextureHandle, RendererError> {
        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(params.label),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::MipmapFilterMode::Nearest,
            ..Default::default()
        });

        let id = self.next_id();
        self.textures.insert(
            id,
            PlaneTexture {
                label: params.label,
                sampler,
                texture: None,
                width: 0,
                height: 0,
            },
        );
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
        let plane = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| RendererError::RenderError(format!("Unknown texture {}", texture.0)))?;

        if data.len() != width as usize * height as usize {
            return Err(RendererError::RenderError(format!(
                "{}: {} bytes for {}x{}",
                plane.label,
                data.len(),
                width,
                height
            )));
        }

        // Recreate texture if dimensions changed
        if plane.texture.is_none() || plane.width != width || plane.height != height {
            check_texture_size(plane.label, width, height, self.max_texture_dimension)?;
            if let Some(old) = plane.texture.take() {
                old.destroy();
            }
            plane.width = 0;
            plane.height = 0;

            let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let created = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some(plane.label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });
            if let Some(err) = pollster::block_on(scope.pop()) {
                created.destroy();
                return Err(RendererError::RenderError(format!(
                    "Failed to allocate {} at {}x{}: {}",
                    plane.label, width, height, err
                )));
            }
            plane.texture = Some(created);
            plane.width = width;
            plane.height = height;
            log::debug!("{} allocated at {}x{} for unit {}", plane.label, width, height, unit);
        }

        if let Some(ref tex) = plane.texture {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: tex,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(width),
                    rows_per_image: None,
                },
                wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
            );
        }
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture.0) {
            Some(plane) => {
                if let Some(tex) = plane.texture {
                    tex.destroy();
                }
            }
            None => log::warn!("Texture {} was not live", texture.0),
        }
    }

    fn create_vertex_buffer(&mut self, vertices: &[Vertex]) -> Result<BufferHandle, RendererError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertex Buffer"),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let id = self.next_id();
        self.buffers.insert(id, buffer);
        Ok(BufferHandle(id))
    }

    fn delete_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer.0) {
            Some(buf) => buf.destroy(),
            None => log::warn!("Buffer {} was not live", buffer.0),
        }
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        match &mut self.target {
            RenderTarget::Surface { surface, config } => {
                config.width = width.max(1);
                config.height = height.max(1);
                surface.configure(&self.device, config);
            }
            RenderTarget::Offscreen {
                texture,
                width: w,
                height: h,
            } => {
                *texture = Self::create_offscreen(&self.device, width, height);
                *w = width.max(1);
                *h = height.max(1);
            }
        }
        log::debug!("Render target resized to {}x{}", width, height);
    }

    fn surface_size(&self) -> (u32, u32) {
        match &self.target {
            RenderTarget::Surface { config, .. } => (config.width, config.height),
            RenderTarget::Offscreen { width, height, .. } => (*width, *height),
        }
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> Result<bool, RendererError> {
        let program = self
            .programs
            .get(&call.program.0)
            .ok_or_else(|| RendererError::RenderError(format!("Unknown program {}", call.program.0)))?;
        let vertex_buffer = self
            .buffers
            .get(&call.vertices.0)
            .ok_or_else(|| RendererError::RenderError(format!("Unknown buffer {}", call.vertices.0)))?;

        let (y_view, y_sampler) = self.plane_view(call.textures[0])?;
        let (u_view, u_sampler) = self.plane_view(call.textures[1])?;
        let (v_view, v_sampler) = self.plane_view(call.textures[2])?;

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("I420 Bind Group"),
            layout: &program.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&y_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&u_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&v_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(y_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(u_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(v_sampler),
                },
            ],
        });

        let (frame, view) = match &self.target {
            RenderTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(frame) => {
                    let view = frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    (Some(frame), view)
                }
                Err(wgpu::SurfaceError::Outdated) | Err(wgpu::SurfaceError::Lost) => {
                    log::warn!("Surface outdated, reconfiguring and skipping frame");
                    surface.configure(&self.device, config);
                    return Ok(false);
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    log::debug!("Surface texture timed out, skipping frame");
                    return Ok(false);
                }
                Err(e) => {
                    return Err(RendererError::RenderError(format!(
                        "Failed to get surface texture: {}",
                        e
                    )));
                }
            },
            RenderTarget::Offscreen { texture, .. } => {
                (None, texture.create_view(&wgpu::TextureViewDescriptor::default()))
            }
        };

        let (target_w, target_h) = self.surface_size();
        let vp = call.viewport;
        let vp_x = vp.x.clamp(0.0, target_w as f32);
        let vp_y = vp.y.clamp(0.0, target_h as f32);
        let vp_w = vp.width.min(target_w as f32 - vp_x);
        let vp_h = vp.height.min(target_h as f32 - vp_y);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let [r, g, b, a] = call.clear_color;
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            if vp_w >= 1.0 && vp_h >= 1.0 {
                render_pass.set_viewport(vp_x, vp_y, vp_w, vp_h, 0.0, 1.0);
                render_pass.set_pipeline(&program.pipeline);
                render_pass.set_bind_group(0, &bind_group, &[]);
                render_pass.set_vertex_buffer(0, vertex_buffer.slice(..));
                render_pass.draw(0..call.vertex_count, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(frame) = frame {
            frame.present();
        }

        Ok(true)
    }
}
