//! wgpu backend implementation
//!
//! A headless implementation of [`GraphicsBackend`]. Every program is a
//! full-screen render pipeline whose vertex stage and resource declarations
//! are generated from its [`ProgramDescriptor`]; every draw is encoded as one
//! render pass and submitted immediately, which keeps the bind-and-draw model
//! of the trait.

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::{EngineConfig, PowerPreference};
use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::ops::Range;
use wgpu::util::DeviceExt;

const SAMPLER_BINDING: u32 = 0;
const UNIFORM_BINDING: u32 = 1;
const FIRST_TEXTURE_BINDING: u32 = 2;

const VERTEX_STAGE: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
    );
    let p = positions[index];
    var out: VertexOutput;
    out.position = vec4<f32>(p, 0.0, 1.0);
    out.uv = vec2<f32>(p.x * 0.5 + 0.5, 0.5 - p.y * 0.5);
    return out;
}
"#;

struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    desc: TextureDescriptor,
}

struct WgpuProgram {
    desc: ProgramDescriptor,
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    offsets: Vec<Option<u32>>,
    /// CPU copy of the uniform block, uploaded on every draw
    staging: Vec<u8>,
    sampler_units: HashMap<usize, u32>,
}

/// wgpu backend implementation
pub struct WgpuBackend {
    #[allow(dead_code)]
    instance: wgpu::Instance,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    target_format: TextureFormat,
    linear_sampler: wgpu::Sampler,

    // Resource storage
    textures: HashMap<u64, WgpuTexture>,
    framebuffers: HashMap<u64, Vec<TextureHandle>>,
    programs: HashMap<u64, WgpuProgram>,
    program_cache: HashMap<(String, String), ProgramHandle>,
    next_id: u64,

    // Bind state
    bound_target: Option<FramebufferHandle>,
    current_program: Option<ProgramHandle>,
    viewport: Option<(u32, u32, u32, u32)>,
    pending_clear: Option<[f32; 4]>,
    texture_units: BTreeMap<u32, TextureHandle>,
}

impl WgpuBackend {
    /// Create a headless backend on the adapter selected by `config`
    pub fn new(config: &EngineConfig) -> BackendResult<Self> {
        pollster::block_on(Self::new_async(config))
    }

    async fn new_async(config: &EngineConfig) -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = match config.power_preference {
            PowerPreference::LowPower => wgpu::PowerPreference::LowPower,
            PowerPreference::HighPerformance => wgpu::PowerPreference::HighPerformance,
        };
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
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
                    label: Some("Filter Graph Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            target_format: config.target_format,
            linear_sampler,
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            programs: HashMap::new(),
            program_cache: HashMap::new(),
            next_id: 1,
            bound_target: None,
            current_program: None,
            viewport: None,
            pending_clear: None,
            texture_units: BTreeMap::new(),
        })
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Get the underlying wgpu texture for a handle
    pub fn texture(&self, texture: TextureHandle) -> Option<&wgpu::Texture> {
        self.textures.get(&texture.0).map(|t| &t.texture)
    }

    fn convert_texture_format(format: TextureFormat) -> wgpu::TextureFormat {
        match format {
            TextureFormat::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            TextureFormat::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            TextureFormat::Rgba32Float => wgpu::TextureFormat::Rgba32Float,
            TextureFormat::R32Float => wgpu::TextureFormat::R32Float,
            TextureFormat::Rg32Float => wgpu::TextureFormat::Rg32Float,
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Compose the module source: generated declarations, the shared vertex
    /// stage, then the program's own fragment stage.
    fn compose_source(desc: &ProgramDescriptor) -> String {
        let mut source = String::new();

        let fields: Vec<_> = desc
            .uniforms
            .iter()
            .filter_map(|decl| decl.ty.wgsl().map(|ty| (decl.name.as_ref(), ty)))
            .collect();
        if !fields.is_empty() {
            source.push_str("struct Uniforms {\n");
            for (name, ty) in &fields {
                let _ = writeln!(source, "    {name}: {ty},");
            }
            source.push_str("};\n");
            let _ = writeln!(
                source,
                "@group(0) @binding({UNIFORM_BINDING}) var<uniform> u: Uniforms;"
            );
        }

        let _ = writeln!(
            source,
            "@group(0) @binding({SAMPLER_BINDING}) var linear_sampler: sampler;"
        );
        let samplers = desc.uniforms.iter().filter(|decl| decl.ty.is_sampler());
        for (slot, decl) in samplers.enumerate() {
            let _ = writeln!(
                source,
                "@group(0) @binding({}) var {}: texture_2d<f32>;",
                FIRST_TEXTURE_BINDING + slot as u32,
                decl.name
            );
        }

        source.push_str(VERTEX_STAGE);
        source.push_str(&desc.fragment_source);
        source
    }

    /// Parse and validate the composed module of `desc` and check that it
    /// provides both entry points
    pub(crate) fn validate_program(desc: &ProgramDescriptor) -> BackendResult<String> {
        let link_failed = |log: String| BackendError::ProgramLinkFailed {
            label: desc.label.to_string(),
            log,
        };
        let source = Self::compose_source(desc);

        let module = naga::front::wgsl::parse_str(&source)
            .map_err(|e| link_failed(format!("WGSL parse error: {}", e.emit_to_string(&source))))?;
        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        validator
            .validate(&module)
            .map_err(|e| link_failed(format!("Validation error: {e}")))?;

        for (name, stage) in [
            ("vs_main", naga::ShaderStage::Vertex),
            ("fs_main", naga::ShaderStage::Fragment),
        ] {
            if !module
                .entry_points
                .iter()
                .any(|ep| ep.name == name && ep.stage == stage)
            {
                return Err(link_failed(format!("Entry point '{name}' not found for stage {stage:?}")));
            }
        }
        Ok(source)
    }

    fn bind_group_layout(&self, desc: &ProgramDescriptor, block_size: u32) -> wgpu::BindGroupLayout {
        let mut entries = vec![wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        }];
        if block_size > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: UNIFORM_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            });
        }
        for slot in 0..desc.sampler_count() as u32 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: FIRST_TEXTURE_BINDING + slot,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            });
        }

        self.device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(desc.label.as_ref()),
                entries: &entries,
            })
    }

    /// Encode a pass that only clears the bound target.
    fn flush_clear(&mut self) {
        let (Some(color), Some(framebuffer)) = (self.pending_clear.take(), self.bound_target) else {
            return;
        };
        let Some(attachments) = self.framebuffers.get(&framebuffer.0) else {
            return;
        };

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("clear") });
        {
            let color_attachments: Vec<_> = attachments
                .iter()
                .filter_map(|t| self.textures.get(&t.0))
                .map(|t| {
                    Some(wgpu::RenderPassColorAttachment {
                        view: &t.view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(Self::clear_value(color)),
                            store: wgpu::StoreOp::Store,
                        },
                    })
                })
                .collect();
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear"),
                color_attachments: &color_attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn clear_value(color: [f32; 4]) -> wgpu::Color {
        wgpu::Color {
            r: color[0] as f64,
            g: color[1] as f64,
            b: color[2] as f64,
            a: color[3] as f64,
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn name(&self) -> &str {
        "wgpu"
    }

    fn create_texture(&mut self, desc: &TextureDescriptor) -> BackendResult<TextureHandle> {
        let limit = self.adapter.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > limit || desc.height > limit {
            return Err(BackendError::TextureCreationFailed(format!(
                "{:?} has unsupported extent {}x{}",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: desc.label.as_deref(),
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::convert_texture_format(desc.format),
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = self.next_handle();
        log::trace!("WgpuBackend: creating texture {} {:?}", id, desc.label);
        self.textures.insert(
            id,
            WgpuTexture {
                texture,
                view,
                desc: desc.clone(),
            },
        );
        Ok(TextureHandle(id))
    }

    fn write_texture(&mut self, texture: TextureHandle, data: &[u8]) -> BackendResult<()> {
        let tex = self
            .textures
            .get(&texture.0)
            .ok_or(BackendError::UnknownTexture(texture))?;
        if data.len() != tex.desc.byte_size() {
            return Err(BackendError::UploadSizeMismatch {
                expected: tex.desc.byte_size(),
                actual: data.len(),
            });
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &tex.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(tex.desc.width * tex.desc.format.bytes_per_pixel()),
                rows_per_image: Some(tex.desc.height),
            },
            wgpu::Extent3d {
                width: tex.desc.width,
                height: tex.desc.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_framebuffer(
        &mut self,
        label: &str,
        attachments: &[TextureHandle],
    ) -> BackendResult<FramebufferHandle> {
        if attachments.is_empty() || attachments.len() > MAX_COLOR_ATTACHMENTS {
            return Err(BackendError::IncompleteRenderTarget(format!(
                "{label}: {} colour attachments (expected 1..={MAX_COLOR_ATTACHMENTS})",
                attachments.len()
            )));
        }

        let mut extent = None;
        for texture in attachments {
            let tex = self.textures.get(&texture.0).ok_or_else(|| {
                BackendError::IncompleteRenderTarget(format!(
                    "{label}: attachment {texture:?} does not exist"
                ))
            })?;
            let size = (tex.desc.width, tex.desc.height);
            if *extent.get_or_insert(size) != size {
                return Err(BackendError::IncompleteRenderTarget(format!(
                    "{label}: attachments differ in size"
                )));
            }
        }

        let id = self.next_handle();
        self.framebuffers.insert(id, attachments.to_vec());
        Ok(FramebufferHandle(id))
    }

    fn create_program(&mut self, desc: &ProgramDescriptor) -> BackendResult<ProgramHandle> {
        let key = (desc.label.to_string(), desc.fragment_source.to_string());
        if let Some(&program) = self.program_cache.get(&key) {
            return Ok(program);
        }

        let (offsets, block_size) = desc.uniform_layout();
        let source = Self::validate_program(desc).inspect_err(|e| log::error!("{e}"))?;
        let format = Self::convert_texture_format(self.target_format);

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let bind_group_layout = self.bind_group_layout(desc, block_size);
        let shader = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(desc.label.as_ref()),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });
        let layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(desc.label.as_ref()),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });
        let targets: Vec<_> = (0..desc.outputs)
            .map(|_| {
                Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(desc.label.as_ref()),
                layout: Some(&layout),
                vertex: wgpu::VertexState {
                    module: &shader,
                    entry_point: "vs_main",
                    buffers: &[],
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                },
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &shader,
                    entry_point: "fs_main",
                    targets: &targets,
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                }),
                multiview: None,
            });

        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            log::error!("Program `{}` failed validation: {}", desc.label, error);
            return Err(BackendError::ProgramLinkFailed {
                label: desc.label.to_string(),
                log: error.to_string(),
            });
        }

        let program = ProgramHandle(self.next_handle());
        log::debug!("WgpuBackend: linked program `{}` as {:?}", desc.label, program);
        self.programs.insert(
            program.0,
            WgpuProgram {
                desc: desc.clone(),
                pipeline,
                bind_group_layout,
                offsets,
                staging: vec![0; block_size as usize],
                sampler_units: HashMap::new(),
            },
        );
        self.program_cache.insert(key, program);
        Ok(program)
    }

    fn uniform_location(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        let index = self
            .programs
            .get(&program.0)?
            .desc
            .uniforms
            .iter()
            .position(|decl| decl.name == name)?;
        Some(UniformLocation { program, index })
    }

    fn bind_render_target(&mut self, framebuffer: FramebufferHandle) -> BackendResult<()> {
        if !self.framebuffers.contains_key(&framebuffer.0) {
            return Err(BackendError::UnknownFramebuffer(framebuffer));
        }
        self.flush_clear();
        self.bound_target = Some(framebuffer);
        self.viewport = None;
        Ok(())
    }

    fn unbind_render_target(&mut self) {
        self.flush_clear();
        self.bound_target = None;
        self.viewport = None;
    }

    fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn clear(&mut self, color: [f32; 4]) {
        self.pending_clear = Some(color);
    }

    fn use_program(&mut self, program: ProgramHandle) -> BackendResult<()> {
        if !self.programs.contains_key(&program.0) {
            return Err(BackendError::UnknownProgram(program));
        }
        self.current_program = Some(program);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: TextureHandle) -> BackendResult<()> {
        if !self.textures.contains_key(&texture.0) {
            return Err(BackendError::UnknownTexture(texture));
        }
        self.texture_units.insert(unit, texture);
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> BackendResult<()> {
        let program = self
            .programs
            .get_mut(&location.program.0)
            .ok_or(BackendError::UnknownProgram(location.program))?;
        let decl = program.desc.uniforms.get(location.index).ok_or_else(|| {
            BackendError::MissingUniform {
                program: program.desc.label.to_string(),
                name: format!("#{}", location.index),
            }
        })?;
        if !value.matches(decl.ty) {
            return Err(BackendError::UniformTypeMismatch {
                program: program.desc.label.to_string(),
                name: decl.name.to_string(),
                value: format!("{value:?}"),
            });
        }

        let offset = program.offsets[location.index].unwrap_or(0) as usize;
        let staging = &mut program.staging;
        match value {
            UniformValue::TextureUnit(unit) => {
                program.sampler_units.insert(location.index, unit);
            }
            UniformValue::Int(v) => staging[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&v)),
            UniformValue::Float(v) => staging[offset..offset + 4].copy_from_slice(bytemuck::bytes_of(&v)),
            UniformValue::Vec2(v) => staging[offset..offset + 8].copy_from_slice(bytemuck::bytes_of(&v)),
            UniformValue::Vec4(v) => staging[offset..offset + 16].copy_from_slice(bytemuck::bytes_of(&v)),
            UniformValue::FloatArray(values) => {
                let bytes: &[u8] = bytemuck::cast_slice(&values);
                staging[offset..offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        Ok(())
    }

    fn draw(&mut self, vertices: Range<u32>) -> BackendResult<()> {
        let framebuffer = self.bound_target.ok_or(BackendError::NoRenderTargetBound)?;
        let program_handle = self.current_program.ok_or(BackendError::NoProgramBound)?;
        let program = self
            .programs
            .get(&program_handle.0)
            .ok_or(BackendError::UnknownProgram(program_handle))?;
        let attachments = self
            .framebuffers
            .get(&framebuffer.0)
            .ok_or(BackendError::UnknownFramebuffer(framebuffer))?;

        if attachments.len() != program.desc.outputs as usize {
            return Err(BackendError::IncompleteRenderTarget(format!(
                "program `{}` writes {} outputs but the target has {} attachments",
                program.desc.label,
                program.desc.outputs,
                attachments.len()
            )));
        }

        let mut targets = Vec::with_capacity(attachments.len());
        for texture in attachments {
            let tex = self
                .textures
                .get(&texture.0)
                .ok_or(BackendError::UnknownTexture(*texture))?;
            if tex.desc.format != self.target_format {
                return Err(BackendError::IncompleteRenderTarget(format!(
                    "attachment {texture:?} is {:?}, programs render to {:?}",
                    tex.desc.format, self.target_format
                )));
            }
            targets.push(tex);
        }

        let mut sampled = Vec::new();
        for (index, decl) in program.desc.uniforms.iter().enumerate() {
            if !decl.ty.is_sampler() {
                continue;
            }
            let texture = program
                .sampler_units
                .get(&index)
                .and_then(|unit| self.texture_units.get(unit))
                .copied()
                .ok_or_else(|| BackendError::UnassignedSampler {
                    program: program.desc.label.to_string(),
                    name: decl.name.to_string(),
                })?;
            if attachments.contains(&texture) {
                return Err(BackendError::ReadWriteHazard(texture));
            }
            let tex = self
                .textures
                .get(&texture.0)
                .ok_or(BackendError::UnknownTexture(texture))?;
            sampled.push(tex);
        }

        let uniform_buffer = (!program.staging.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(program.desc.label.as_ref()),
                    contents: &program.staging,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let mut entries = vec![wgpu::BindGroupEntry {
            binding: SAMPLER_BINDING,
            resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
        }];
        if let Some(buffer) = &uniform_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: UNIFORM_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }
        for (slot, tex) in sampled.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: FIRST_TEXTURE_BINDING + slot as u32,
                resource: wgpu::BindingResource::TextureView(&tex.view),
            });
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(program.desc.label.as_ref()),
            layout: &program.bind_group_layout,
            entries: &entries,
        });

        let load = match self.pending_clear.take() {
            Some(color) => wgpu::LoadOp::Clear(Self::clear_value(color)),
            None => wgpu::LoadOp::Load,
        };
        let color_attachments: Vec<_> = targets
            .iter()
            .map(|tex| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &tex.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let (x, y, width, height) = self
            .viewport
            .unwrap_or((0, 0, targets[0].desc.width, targets[0].desc.height));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(program.desc.label.as_ref()),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(program.desc.label.as_ref()),
                color_attachments: &color_attachments,
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_pipeline(&program.pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            render_pass.set_viewport(x as f32, y as f32, width as f32, height as f32, 0.0, 1.0);
            render_pass.draw(vertices, 0..1);
        }

        log::trace!(
            "WgpuBackend: draw `{}` into {:?}",
            program.desc.label,
            framebuffer
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    fn destroy_framebuffer(&mut self, framebuffer: FramebufferHandle) {
        self.framebuffers.remove(&framebuffer.0);
        if self.bound_target == Some(framebuffer) {
            self.bound_target = None;
        }
    }

    fn destroy_texture(&mut self, texture: TextureHandle) {
        if let Some(tex) = self.textures.remove(&texture.0) {
            tex.texture.destroy();
        }
        self.texture_units.retain(|_, bound| *bound != texture);
    }
}
