//! wgpu rendering context. Each `draw` is one render pass over a fullscreen
//! triangle pair; pipelines are built lazily per target format.

mod surface;

use std::collections::HashMap;
use std::num::NonZeroU64;

use glam::Vec4;
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use wgpu::{BindGroupLayout, Buffer, Device, PipelineLayout, Queue, RenderPipeline, Sampler, ShaderModule, Texture, TextureView};

use crate::context::{
    Channels, ContextTier, FilterMode, GpuContext, ProgramId, RenderTarget, ShaderId, TexelType, TextureFormat,
    TextureId,
};
use crate::error::{Error, Result};
use crate::program::{Keywords, ShaderKind, ShaderStage, Uniforms, with_keywords};

pub use surface::HeadlessSurface;

const DRAWING_BUFFER_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

fn native_format(format: TextureFormat) -> wgpu::TextureFormat {
    match (format.channels, format.texel) {
        (Channels::R, TexelType::Float) => wgpu::TextureFormat::R32Float,
        (Channels::Rg, TexelType::Float) => wgpu::TextureFormat::Rg32Float,
        (Channels::Rgba, TexelType::Float) => wgpu::TextureFormat::Rgba32Float,
        (Channels::R, TexelType::HalfFloat) => wgpu::TextureFormat::R16Float,
        (Channels::Rg, TexelType::HalfFloat) => wgpu::TextureFormat::Rg16Float,
        (Channels::Rgba, TexelType::HalfFloat) => wgpu::TextureFormat::Rgba16Float,
    }
}

fn is_blendable(format: wgpu::TextureFormat) -> bool {
    !matches!(
        format,
        wgpu::TextureFormat::R32Float | wgpu::TextureFormat::Rg32Float | wgpu::TextureFormat::Rgba32Float
    )
}

struct GpuTexture {
    texture: Texture,
    view: TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    channels: usize,
    filter: FilterMode,
}

struct ShaderEntry {
    module: ShaderModule,
    kind: ShaderKind,
}

struct ProgramEntry {
    vertex: ShaderId,
    fragment: ShaderId,
    kind: ShaderKind,
    pipelines: HashMap<(wgpu::TextureFormat, bool), RenderPipeline>,
}

pub struct WgpuContext {
    runtime: Runtime,
    device: Device,
    queue: Queue,
    tier: ContextTier,
    linear_filtering: bool,
    bind_group_layout: BindGroupLayout,
    pipeline_layout: PipelineLayout,
    uniform_buffer: Buffer,
    nearest: Sampler,
    linear: Sampler,
    placeholder: GpuTexture,
    drawing_buffer: GpuTexture,
    textures: HashMap<TextureId, GpuTexture>,
    shaders: HashMap<ShaderId, ShaderEntry>,
    programs: HashMap<ProgramId, ProgramEntry>,
    blending: bool,
    next_id: u32,
}

impl WgpuContext {
    pub fn new(tier: ContextTier) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;

        let instance = wgpu::Instance::default();
        let adapter = runtime
            .block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            }))
            .ok_or_else(|| Error::Gpu(String::from("no GPU adapter found")))?;

        let linear_filtering = adapter.features().contains(wgpu::Features::FLOAT32_FILTERABLE);
        let required_features = if linear_filtering {
            wgpu::Features::FLOAT32_FILTERABLE
        } else {
            wgpu::Features::empty()
        };
        let required_limits = match tier {
            ContextTier::Extended => wgpu::Limits::downlevel_defaults(),
            ContextTier::Baseline => wgpu::Limits::downlevel_webgl2_defaults(),
        };

        let (device, queue) = runtime
            .block_on(adapter.request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Splash Fluid"),
                    required_features,
                    required_limits,
                },
                None,
            ))
            .map_err(|err| Error::Gpu(err.to_string()))?;

        let sampler_type = if linear_filtering {
            wgpu::SamplerBindingType::Filtering
        } else {
            wgpu::SamplerBindingType::NonFiltering
        };
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float {
                    filterable: linear_filtering,
                },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(sampler_type),
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(std::mem::size_of::<Uniforms>() as u64),
                    },
                    count: None,
                },
                texture_entry(1),
                sampler_entry(2),
                texture_entry(3),
                sampler_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Uniforms"),
            size: std::mem::size_of::<Uniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let sampler = |filter: wgpu::FilterMode| {
            device.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("Clamped Sampler"),
                address_mode_u: wgpu::AddressMode::ClampToEdge,
                address_mode_v: wgpu::AddressMode::ClampToEdge,
                mag_filter: filter,
                min_filter: filter,
                ..Default::default()
            })
        };
        let nearest = sampler(wgpu::FilterMode::Nearest);
        let linear = sampler(if linear_filtering {
            wgpu::FilterMode::Linear
        } else {
            wgpu::FilterMode::Nearest
        });

        let placeholder = create_gpu_texture(
            &device,
            1,
            1,
            wgpu::TextureFormat::Rgba32Float,
            4,
            FilterMode::Nearest,
        );
        let drawing_buffer = create_gpu_texture(&device, 1, 1, DRAWING_BUFFER_FORMAT, 4, FilterMode::Nearest);

        log::info!(
            "wgpu context on {:?} ({:?} tier)",
            adapter.get_info().name,
            tier
        );

        Ok(Self {
            runtime,
            device,
            queue,
            tier,
            linear_filtering,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            nearest,
            linear,
            placeholder,
            drawing_buffer,
            textures: HashMap::new(),
            shaders: HashMap::new(),
            programs: HashMap::new(),
            blending: false,
            next_id: 0,
        })
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn target(&self, target: RenderTarget) -> Option<&GpuTexture> {
        match target {
            RenderTarget::Surface => Some(&self.drawing_buffer),
            RenderTarget::Texture(id) => self.textures.get(&id),
        }
    }

    /// Run `f` and turn any validation error it raises into a message.
    fn validated<T>(&self, f: impl FnOnce(&Device) -> T) -> (T, Option<String>) {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let error = self.runtime.block_on(self.device.pop_error_scope());
        (value, error.map(|err| err.to_string()))
    }

    fn build_pipeline(&self, program: &ProgramEntry, format: wgpu::TextureFormat, blend: bool) -> Option<RenderPipeline> {
        let vertex = self.shaders.get(&program.vertex)?;
        let fragment = self.shaders.get(&program.fragment)?;
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Kernel Pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex.module,
                entry_point: "vs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[],
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &fragment.module,
                entry_point: "fs_main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: blend.then_some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview: None,
        });
        Some(pipeline)
    }

    fn submit_pass(&self, view: &TextureView, load: wgpu::LoadOp<wgpu::Color>, draw: Option<(&RenderPipeline, &wgpu::BindGroup)>) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Kernel Encoder"),
        });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Kernel Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some((pipeline, bind_group)) = draw {
                pass.set_pipeline(pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..6, 0..1);
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }
}

fn create_gpu_texture(
    device: &Device,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    channels: usize,
    filter: FilterMode,
) -> GpuTexture {
    let (width, height) = (width.max(1), height.max(1));
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Field Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    GpuTexture {
        texture,
        view,
        width,
        height,
        format,
        channels,
        filter,
    }
}

impl GpuContext for WgpuContext {
    fn tier(&self) -> ContextTier {
        self.tier
    }

    fn texel_type(&self) -> TexelType {
        TexelType::Float
    }

    fn supports_linear_filtering(&self) -> bool {
        self.linear_filtering
    }

    fn supports_render_target(&mut self, format: TextureFormat) -> bool {
        let native = native_format(format);
        let channels = format.channels.count();
        let (probe, error) = self.validated(|device| create_gpu_texture(device, 4, 4, native, channels, FilterMode::Nearest));
        let (_, pass_error) = self.validated(|_| self.submit_pass(&probe.view, wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT), None));
        probe.texture.destroy();
        error.or(pass_error).is_none()
    }

    fn create_texture(&mut self, width: u32, height: u32, format: TextureFormat, filter: FilterMode) -> TextureId {
        let id = TextureId(self.next_id());
        let texture = create_gpu_texture(
            &self.device,
            width,
            height,
            native_format(format),
            format.channels.count(),
            filter,
        );
        self.textures.insert(id, texture);
        id
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if let Some(entry) = self.textures.remove(&texture) {
            entry.texture.destroy();
        }
    }

    fn upload(&mut self, texture: TextureId, texels: &[Vec4]) {
        let Some(entry) = self.textures.get(&texture) else {
            log::warn!("upload to unknown texture {:?}", texture);
            return;
        };
        let data: Vec<f32> = texels
            .iter()
            .take(entry.width as usize * entry.height as usize)
            .flat_map(|texel| texel.to_array().into_iter().take(entry.channels))
            .collect();
        let bytes_per_texel = (entry.channels * std::mem::size_of::<f32>()) as u32;
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(&data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(entry.width * bytes_per_texel),
                rows_per_image: Some(entry.height),
            },
            wgpu::Extent3d {
                width: entry.width,
                height: entry.height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn read_texels(&mut self, target: RenderTarget) -> Vec<Vec4> {
        let Some(entry) = self.target(target) else {
            return Vec::new();
        };
        let unorm = entry.format == DRAWING_BUFFER_FORMAT;
        let bytes_per_texel = if unorm { 4 } else { (entry.channels * 4) as u32 };
        let unpadded = entry.width * bytes_per_texel;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let read_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded as u64 * entry.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &entry.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &read_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(entry.height),
                },
            },
            wgpu::Extent3d {
                width: entry.width,
                height: entry.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = read_buffer.slice(..);
        let (sender, receiver) = oneshot::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match self.runtime.block_on(receiver) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                log::error!("readback failed: {}", err);
                return Vec::new();
            }
            Err(err) => {
                log::error!("readback channel closed: {}", err);
                return Vec::new();
            }
        }

        let data = slice.get_mapped_range();
        let mut texels = Vec::with_capacity(entry.width as usize * entry.height as usize);
        for row in data.chunks(padded as usize) {
            let row = &row[..unpadded as usize];
            if unorm {
                texels.extend(row.chunks_exact(4).map(|px| {
                    Vec4::new(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32) / 255.0
                }));
            } else {
                let values: &[f32] = bytemuck::cast_slice(row);
                texels.extend(values.chunks_exact(entry.channels).map(|c| match c {
                    [r] => Vec4::new(*r, 0.0, 0.0, 1.0),
                    [r, g] => Vec4::new(*r, *g, 0.0, 1.0),
                    [r, g, b, a] => Vec4::new(*r, *g, *b, *a),
                    _ => Vec4::ZERO,
                }));
            }
        }
        drop(data);
        read_buffer.unmap();
        texels
    }

    fn compile_shader(&mut self, kind: ShaderKind, keywords: Keywords) -> Result<ShaderId> {
        let unknown = keywords.difference(kind.accepted_keywords());
        if !unknown.is_empty() {
            let names: Vec<&str> = unknown.names().collect();
            return Err(Error::ShaderCompile {
                kind,
                log: format!("unused keywords {}", names.join(", ")),
            });
        }
        let source = with_keywords(kind.source(), keywords);
        let (module, error) = self.validated(|device| {
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some("Kernel Shader"),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        if let Some(log) = error {
            return Err(Error::ShaderCompile { kind, log });
        }
        let id = ShaderId(self.next_id());
        self.shaders.insert(id, ShaderEntry { module, kind });
        Ok(id)
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId> {
        let kinds = (
            self.shaders.get(&vertex).map(|s| s.kind),
            self.shaders.get(&fragment).map(|s| s.kind),
        );
        let kind = match kinds {
            (Some(v), Some(f)) if v.stage() == ShaderStage::Vertex && f.stage() == ShaderStage::Fragment => f,
            _ => {
                return Err(Error::ProgramLink {
                    log: format!("cannot link {:?} with {:?}", vertex, fragment),
                });
            }
        };

        let mut entry = ProgramEntry {
            vertex,
            fragment,
            kind,
            pipelines: HashMap::new(),
        };
        let format = wgpu::TextureFormat::Rgba32Float;
        let (pipeline, error) = self.validated(|_| self.build_pipeline(&entry, format, false));
        if let Some(log) = error {
            return Err(Error::ProgramLink { log });
        }
        if let Some(pipeline) = pipeline {
            entry.pipelines.insert((format, false), pipeline);
        }
        let id = ProgramId(self.next_id());
        self.programs.insert(id, entry);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.programs.remove(&program);
    }

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn draw(&mut self, program: ProgramId, uniforms: &Uniforms, inputs: &[TextureId], target: RenderTarget) {
        let Some(format) = self.target(target).map(|t| t.format) else {
            log::warn!("draw into unknown target {:?}", target);
            return;
        };
        let blend = self.blending && is_blendable(format);
        if self.blending && !blend {
            log::warn!("{:?} targets are not blendable; drawing unblended", format);
        }

        let missing = match self.programs.get(&program) {
            Some(entry) => !entry.pipelines.contains_key(&(format, blend)),
            None => {
                log::warn!("draw with unknown program {:?}", program);
                return;
            }
        };
        if missing {
            let built = self
                .programs
                .get(&program)
                .and_then(|entry| self.build_pipeline(entry, format, blend));
            if let (Some(pipeline), Some(entry)) = (built, self.programs.get_mut(&program)) {
                entry.pipelines.insert((format, blend), pipeline);
            }
        }
        let Some(entry) = self.programs.get(&program) else {
            return;
        };
        let Some(pipeline) = entry.pipelines.get(&(format, blend)) else {
            log::warn!("no pipeline for {:?} into {:?}", entry.kind, format);
            return;
        };

        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));

        let unit = |index: usize| {
            let texture = inputs
                .get(index)
                .and_then(|id| self.textures.get(id))
                .unwrap_or(&self.placeholder);
            let sampler = match texture.filter {
                FilterMode::Nearest => &self.nearest,
                FilterMode::Linear => &self.linear,
            };
            (&texture.view, sampler)
        };
        let (view0, sampler0) = unit(0);
        let (view1, sampler1) = unit(1);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Kernel Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(view0),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(sampler0),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(view1),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(sampler1),
                },
            ],
        });

        if let Some(output) = self.target(target) {
            self.submit_pass(&output.view, wgpu::LoadOp::Load, Some((pipeline, &bind_group)));
        }
    }

    fn clear(&mut self, target: RenderTarget, color: Vec4) {
        let Some(output) = self.target(target) else {
            return;
        };
        let color = wgpu::Color {
            r: color.x as f64,
            g: color.y as f64,
            b: color.z as f64,
            a: color.w as f64,
        };
        self.submit_pass(&output.view, wgpu::LoadOp::Clear(color), None);
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.drawing_buffer.width, self.drawing_buffer.height)
    }

    fn resize_drawing_buffer(&mut self, width: u32, height: u32) {
        let old = std::mem::replace(
            &mut self.drawing_buffer,
            create_gpu_texture(&self.device, width, height, DRAWING_BUFFER_FORMAT, 4, FilterMode::Nearest),
        );
        old.texture.destroy();
    }
}
