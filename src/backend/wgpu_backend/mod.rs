//! wgpu backend implementation
//!
//! Headless: the "screen" is an owned texture the embedding application presents or
//! reads back. Every command is encoded and submitted immediately, which keeps the
//! ordering identical to the order render modes issue them.

use std::collections::HashMap;

use wgpu::util::DeviceExt;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::postprocess::FULLSCREEN_VERTEX_SHADER;

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Fragment stage used by [`GraphicsBackend::blit`]
const BLIT_SHADER: &str = r#"
struct BlitParams {
    flip_y: u32,
}

@group(0) @binding(0) var blit_sampler: sampler;
@group(0) @binding(1) var source: texture_2d<f32>;
@group(0) @binding(8) var<uniform> params: BlitParams;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    var uv = input.uv;
    if (params.flip_y != 0u) {
        uv.y = 1.0 - uv.y;
    }
    return textureSample(source, blit_sampler, uv);
}
"#;

struct GpuFrameBuffer {
    color: wgpu::Texture,
    color_view: wgpu::TextureView,
    depth_view: Option<wgpu::TextureView>,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
}

struct FullscreenPipeline {
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline: wgpu::RenderPipeline,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PipelineKey {
    label: String,
    inputs: usize,
    uniforms: bool,
    format: wgpu::TextureFormat,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    #[allow(dead_code)]
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    sampler: wgpu::Sampler,

    screen: GpuFrameBuffer,
    frame_buffers: HashMap<u64, GpuFrameBuffer>,
    next_frame_buffer_id: u64,
    bound: Option<FrameBufferHandle>,
    viewport: Option<ViewportRect>,

    pipelines: HashMap<PipelineKey, FullscreenPipeline>,
}

impl WgpuBackend {
    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Depth32Float => wgpu::TextureFormat::Depth32Float,
        }
    }

    fn convert_texture_usage(usage: TextureUsage) -> wgpu::TextureUsages {
        let mut result = wgpu::TextureUsages::empty();
        if usage.contains(TextureUsage::COPY_SRC) {
            result |= wgpu::TextureUsages::COPY_SRC;
        }
        if usage.contains(TextureUsage::COPY_DST) {
            result |= wgpu::TextureUsages::COPY_DST;
        }
        if usage.contains(TextureUsage::TEXTURE_BINDING) {
            result |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        if usage.contains(TextureUsage::RENDER_ATTACHMENT) {
            result |= wgpu::TextureUsages::RENDER_ATTACHMENT;
        }
        result
    }

    fn clear_color(color: [f32; 4]) -> wgpu::Color {
        wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        }
    }
}

impl WgpuBackend {
    /// Create a headless backend whose screen target is `width` x `height`
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new(width: u32, height: u32) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(width, height))
    }

    pub async fn new_async(width: u32, height: u32) -> BackendResult<Self> {
        let backends = if std::env::var("WGPU_BACKEND").is_ok() {
            wgpu::util::backend_bits_from_env().unwrap_or(wgpu::Backends::all())
        } else {
            wgpu::Backends::all()
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("No suitable adapter found".into()))?;

        let adapter_info = adapter.get_info();
        log::info!(
            "Selected GPU: {} ({:?} backend)",
            adapter_info.name,
            adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Render Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Fullscreen Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let screen = Self::allocate(
            &device,
            &FrameBufferDescriptor::new("Screen", width.max(1), height.max(1)),
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            sampler,
            screen,
            frame_buffers: HashMap::new(),
            next_frame_buffer_id: 1,
            bound: None,
            viewport: None,
            pipelines: HashMap::new(),
        })
    }

    fn allocate(device: &wgpu::Device, desc: &FrameBufferDescriptor) -> GpuFrameBuffer {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let format = Self::convert_texture_format(desc.format);
        let color = device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: Self::convert_texture_usage(desc.usage),
            view_formats: &[],
        });
        let color_view = color.create_view(&wgpu::TextureViewDescriptor::default());

        let depth_view = desc.depth.then(|| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some("Frame Buffer Depth"),
                    size,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: DEPTH_FORMAT,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        });

        GpuFrameBuffer {
            color,
            color_view,
            depth_view,
            format,
            width: desc.width,
            height: desc.height,
        }
    }

    fn target(&self, frame_buffer: Option<FrameBufferHandle>) -> BackendResult<&GpuFrameBuffer> {
        match frame_buffer {
            None => Ok(&self.screen),
            Some(handle) => self
                .frame_buffers
                .get(&handle.0)
                .ok_or(BackendError::UnknownFrameBuffer(handle)),
        }
    }

    fn ensure_pipeline(&mut self, key: &PipelineKey, fragment: &str) {
        if self.pipelines.contains_key(key) {
            return;
        }
        log::debug!(
            "Creating fullscreen pipeline '{}' ({} inputs)",
            key.label,
            key.inputs
        );

        let source = format!("{}\n{}", FULLSCREEN_VERTEX_SHADER, fragment);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&key.label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: 0,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        for i in 0..key.inputs {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: 1 + i as u32,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }
        if key.uniforms {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FULLSCREEN_UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }

        let bind_group_layout = self
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(&key.label),
                entries: &entries,
            });

        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: None,
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(&key.label),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
            });

        self.pipelines.insert(
            key.clone(),
            FullscreenPipeline {
                bind_group_layout,
                pipeline,
            },
        );
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn screen_size(&self) -> (u32, u32) {
        (self.screen.width, self.screen.height)
    }

    fn resize_screen(&mut self, width: u32, height: u32) -> BackendResult<()> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.screen = Self::allocate(&self.device, &FrameBufferDescriptor::new("Screen", width, height));
        Ok(())
    }

    fn create_frame_buffer(
        &mut self,
        desc: &FrameBufferDescriptor,
    ) -> BackendResult<FrameBufferHandle> {
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(BackendError::FrameBufferCreationFailed(format!(
                "{:?}: invalid size {}x{}",
                desc.label, desc.width, desc.height
            )));
        }

        let frame_buffer = Self::allocate(&self.device, desc);
        let id = self.next_frame_buffer_id;
        self.next_frame_buffer_id += 1;
        self.frame_buffers.insert(id, frame_buffer);

        Ok(FrameBufferHandle(id))
    }

    fn destroy_frame_buffer(&mut self, frame_buffer: FrameBufferHandle) {
        if let Some(fb) = self.frame_buffers.remove(&frame_buffer.0) {
            fb.color.destroy();
        }
        if self.bound == Some(frame_buffer) {
            self.bound = None;
        }
    }

    fn frame_buffer_size(&self, frame_buffer: FrameBufferHandle) -> Option<(u32, u32)> {
        self.frame_buffers
            .get(&frame_buffer.0)
            .map(|fb| (fb.width, fb.height))
    }

    fn bind_frame_buffer(&mut self, frame_buffer: Option<FrameBufferHandle>) {
        self.bound = frame_buffer;
    }

    fn bound_frame_buffer(&self) -> Option<FrameBufferHandle> {
        self.bound
    }

    fn clear(&mut self, color: [f32; 4]) -> BackendResult<()> {
        let target = self.target(self.bound)?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Clear"),
            });
        {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(Self::clear_color(color)),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: target.depth_view.as_ref().map(|view| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.viewport = Some(viewport);
    }

    fn viewport(&self) -> Option<ViewportRect> {
        self.viewport
    }

    fn draw_fullscreen(&mut self, pass: &FullscreenPass) -> BackendResult<()> {
        if pass.inputs.len() > MAX_FULLSCREEN_INPUTS {
            return Err(BackendError::TooManyInputs {
                label: pass.label.to_string(),
                count: pass.inputs.len(),
            });
        }

        let key = PipelineKey {
            label: pass.label.to_string(),
            inputs: pass.inputs.len(),
            uniforms: !pass.uniforms.is_empty(),
            format: self.target(pass.target)?.format,
        };
        self.ensure_pipeline(&key, pass.shader);
        let pipeline = self
            .pipelines
            .get(&key)
            .ok_or_else(|| BackendError::PipelineCreationFailed(key.label.clone()))?;

        let target = self.target(pass.target)?;
        let mut input_views = Vec::with_capacity(pass.inputs.len());
        for input in pass.inputs {
            input_views.push(&self.target(Some(*input))?.color_view);
        }

        let uniform_buffer = (!pass.uniforms.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Fullscreen Uniforms"),
                    contents: pass.uniforms,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Sampler(&self.sampler),
        }];
        for (i, view) in input_views.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: 1 + i as u32,
                resource: wgpu::BindingResource::TextureView(view),
            });
        }
        if let Some(buffer) = uniform_buffer.as_ref() {
            entries.push(wgpu::BindGroupEntry {
                binding: FULLSCREEN_UNIFORM_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(pass.label),
            layout: &pipeline.bind_group_layout,
            entries: &entries,
        });

        let viewport = pass
            .viewport
            .unwrap_or_else(|| ViewportRect::full(target.width, target.height));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.label),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target.color_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: match pass.load_op {
                            LoadOp::Clear(color) => wgpu::LoadOp::Clear(Self::clear_color(color)),
                            LoadOp::Load => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_viewport(
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                0.0,
                1.0,
            );
            render_pass.set_pipeline(&pipeline.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn blit(
        &mut self,
        src: FrameBufferHandle,
        dst: Option<FrameBufferHandle>,
        rect: ViewportRect,
        flip_y: bool,
    ) -> BackendResult<()> {
        let flip: u32 = flip_y.into();
        // Uniform blocks are padded to 16 bytes
        let uniforms = [flip, 0, 0, 0];
        let inputs = [src];
        let pass = FullscreenPass::new("Blit", BLIT_SHADER)
            .inputs(&inputs)
            .uniforms(bytemuck::cast_slice(&uniforms))
            .target(dst)
            .viewport(rect)
            .load();
        self.draw_fullscreen(&pass)
    }

    fn reset_texture_unit(&mut self) {
        // Bind groups are rebuilt per pass, no sampler state leaks between passes
        log::trace!("wgpu: texture unit reset");
    }

    fn read_pixels(&mut self, frame_buffer: FrameBufferHandle) -> BackendResult<Vec<u8>> {
        let fb = self.target(Some(frame_buffer))?;
        if fb.format != wgpu::TextureFormat::Rgba8Unorm {
            return Err(BackendError::ReadbackFailed(format!(
                "unsupported format {:?}",
                fb.format
            )));
        }

        let unpadded = fb.width * 4;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback"),
            size: (padded * fb.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &fb.color,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(fb.height),
                },
            },
            wgpu::Extent3d {
                width: fb.width,
                height: fb.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let (tx, rx) = std::sync::mpsc::channel();
        let slice = buffer.slice(..);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?
            .map_err(|e| BackendError::ReadbackFailed(e.to_string()))?;

        let mut pixels = Vec::with_capacity((unpadded * fb.height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }
}

impl WgpuBackend {
    /// Get the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Color view of a frame buffer (`None` for the screen), for scene renderers drawing with raw wgpu
    pub fn color_view(&self, frame_buffer: Option<FrameBufferHandle>) -> Option<&wgpu::TextureView> {
        self.target(frame_buffer).ok().map(|fb| &fb.color_view)
    }

    /// Depth view of a frame buffer, if it has one
    pub fn depth_view(&self, frame_buffer: Option<FrameBufferHandle>) -> Option<&wgpu::TextureView> {
        self.target(frame_buffer).ok().and_then(|fb| fb.depth_view.as_ref())
    }
}
