//! wgpu implementation of both backend traits on one device.
//!
//! Shared buffers are created with `VERTEX | STORAGE` usage, so kernels write
//! vertex data in place and the render pass reads it without a host copy.
//! Compute work is recorded into a command encoder and submitted on `flush`;
//! the queue orders it before any later frame.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use wgpu::util::DeviceExt;
use winit::window::Window;

use super::reflect::{check_link, GlobalKind, ShaderReflection};
use super::selection::{select_adapter, AdapterClass, AdapterSummary};
use super::shared::OwnershipTracker;
use super::work::{global_work_sizes, local_work_sizes, workgroup_counts};
use super::{
    apply_definitions, pack_kernel_uniforms, Access, BufferHandle, ComputeBackend, DeviceLimits,
    GraphicsBackend, KernelArg, KernelProgramHandle, KernelSource, NdRange, ProgramDesc,
    ProgramHandle, SharedBufferHandle, TextureData, TextureHandle, VertexArrayHandle,
};
use crate::error::{FrameError, RendererError, RendererResult};
use crate::params::{Configuration, GraphicsConfig};

const TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.45,
    g: 0.62,
    b: 0.85,
    a: 1.0,
};

struct DeviceBuffer {
    buffer: wgpu::Buffer,
    access: Access,
    /// Host writes (byte offset, data) not yet enqueued
    pending: Vec<(u64, Vec<u8>)>,
}

struct KernelProgram {
    reflection: ShaderReflection,
    pipelines: HashMap<String, wgpu::ComputePipeline>,
}

struct TextureArray {
    layers: Vec<TextureHandle>,
    view: wgpu::TextureView,
}

struct DeviceProgram {
    pipeline: wgpu::RenderPipeline,
    /// Resources used by either stage, ordered by (group, binding)
    globals: Vec<super::GlobalBinding>,
    uniforms: HashMap<String, wgpu::Buffer>,
    texture_arrays: HashMap<String, TextureArray>,
    sampler: wgpu::Sampler,
}

struct DeviceTexture {
    texture: wgpu::Texture,
    width: u32,
    height: u32,
    levels: u32,
}

struct RecordedDraw {
    program: ProgramHandle,
    vertex_array: VertexArrayHandle,
    bind_groups: Vec<(u32, wgpu::BindGroup)>,
}

struct Frame {
    surface_texture: wgpu::SurfaceTexture,
    draws: Vec<RecordedDraw>,
}

/// Summary of one adapter for selection and `--list-devices`
fn summarize(adapter: &wgpu::Adapter, surface: Option<&wgpu::Surface<'_>>) -> AdapterSummary {
    let info = adapter.get_info();
    let class = match info.device_type {
        wgpu::DeviceType::DiscreteGpu => AdapterClass::DiscreteGpu,
        wgpu::DeviceType::IntegratedGpu => AdapterClass::IntegratedGpu,
        wgpu::DeviceType::VirtualGpu => AdapterClass::VirtualGpu,
        wgpu::DeviceType::Cpu => AdapterClass::Cpu,
        wgpu::DeviceType::Other => AdapterClass::Other,
    };
    AdapterSummary {
        name: info.name,
        platform: format!("{:?}", info.backend),
        class,
        compute: adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
        presentable: surface.is_some_and(|surface| adapter.is_surface_supported(surface)),
    }
}

/// Every adapter of every backend. Presentation is not probed without a
/// window, so `presentable` is false throughout.
pub fn list_adapters() -> Vec<AdapterSummary> {
    let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });
    instance
        .enumerate_adapters(wgpu::Backends::all())
        .iter()
        .map(|adapter| summarize(adapter, None))
        .collect()
}

fn surface_format(
    caps: &wgpu::SurfaceCapabilities,
    graphics: &GraphicsConfig,
) -> wgpu::TextureFormat {
    let deep = graphics.frame_buffer_bits.max_channel() > 8;
    let preferred = caps.formats.iter().copied().find(|format| {
        if deep {
            *format == wgpu::TextureFormat::Rgb10a2Unorm
        } else {
            format.is_srgb()
        }
    });
    if deep && preferred.is_none() {
        log::warn!("No 10-bit surface format available, using 8 bits per channel");
    }
    preferred
        .or_else(|| caps.formats.iter().copied().find(|f| f.is_srgb()))
        .unwrap_or(caps.formats[0])
}

fn depth_format(graphics: &GraphicsConfig) -> wgpu::TextureFormat {
    if graphics.depth_buffer_bits <= 24 {
        wgpu::TextureFormat::Depth24Plus
    } else {
        wgpu::TextureFormat::Depth32Float
    }
}

fn create_attachment(
    device: &wgpu::Device,
    label: &str,
    config: &wgpu::SurfaceConfiguration,
    format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: config.width,
                height: config.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

/// Graphics and compute on one wgpu device
pub struct WgpuBackend {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_format: wgpu::TextureFormat,
    sample_count: u32,
    depth_view: wgpu::TextureView,
    msaa_view: Option<wgpu::TextureView>,
    limits: DeviceLimits,

    next_id: u32,
    buffers: HashMap<BufferHandle, DeviceBuffer>,
    shared: HashMap<SharedBufferHandle, wgpu::Buffer>,
    ownership: OwnershipTracker,
    kernel_programs: HashMap<KernelProgramHandle, KernelProgram>,
    programs: HashMap<ProgramHandle, DeviceProgram>,
    vertex_arrays: HashMap<VertexArrayHandle, (Vec<SharedBufferHandle>, u32)>,
    textures: HashMap<TextureHandle, DeviceTexture>,
    current_program: Option<ProgramHandle>,

    /// Compute work recorded since the last flush
    encoder: Option<wgpu::CommandEncoder>,
    frame: Option<Frame>,
}

impl WgpuBackend {
    /// Select an adapter, open the device and configure the window surface
    pub async fn new(window: Arc<Window>, config: &Configuration) -> RendererResult<Self> {
        let graphics = config.graphics.sanitized();
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Create surface (window must have 'static lifetime via Arc)
        let surface = instance
            .create_surface(window)
            .map_err(|e| RendererError::Surface(e.to_string()))?;

        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        let summaries: Vec<AdapterSummary> = adapters
            .iter()
            .map(|adapter| summarize(adapter, Some(&surface)))
            .collect();
        for summary in &summaries {
            log::info!(
                "Adapter {} ({}, {:?}): compute {}, presentable {}",
                summary.name,
                summary.platform,
                summary.class,
                summary.compute,
                summary.presentable
            );
        }

        let chosen = select_adapter(&summaries, &config.device, graphics.hardware_accelerated);
        let adapter = match chosen {
            Some(index) => adapters.swap_remove(index),
            None => {
                // Platforms without enumeration still answer a direct request
                let adapter = instance
                    .request_adapter(&wgpu::RequestAdapterOptions {
                        power_preference: wgpu::PowerPreference::HighPerformance,
                        compatible_surface: Some(&surface),
                        force_fallback_adapter: !graphics.hardware_accelerated,
                    })
                    .await
                    .ok_or(RendererError::NoDevice)?;
                if !summarize(&adapter, Some(&surface)).eligible() {
                    return Err(RendererError::NoDevice);
                }
                adapter
            }
        };
        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Botcraft Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: adapter.limits(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| RendererError::Device(e.to_string()))?;

        let caps = surface.get_capabilities(&adapter);
        if caps.formats.is_empty() {
            return Err(RendererError::Surface(
                "surface reports no supported formats".to_string(),
            ));
        }
        let format = surface_format(&caps, &graphics);
        let present_mode = if graphics.double_buffered {
            wgpu::PresentMode::Fifo
        } else {
            wgpu::PresentMode::AutoNoVsync
        };
        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let depth_format = depth_format(&graphics);
        let multisampled = |format: wgpu::TextureFormat| {
            adapter
                .get_texture_format_features(format)
                .flags
                .sample_count_supported(4)
        };
        let sample_count = if graphics.sample_buffers > 1
            && multisampled(format)
            && multisampled(depth_format)
        {
            4
        } else {
            1
        };
        log::info!(
            "Surface {:?}, depth {:?}, {} samples, {:?}",
            format,
            depth_format,
            sample_count,
            present_mode
        );

        let depth_view = create_attachment(
            &device,
            "Depth Buffer",
            &surface_config,
            depth_format,
            sample_count,
        );
        let msaa_view = (sample_count > 1).then(|| {
            create_attachment(&device, "Multisample Buffer", &surface_config, format, sample_count)
        });

        let device_limits = device.limits();
        let limits = DeviceLimits {
            max_work_group_size: device_limits.max_compute_invocations_per_workgroup,
            max_work_item_sizes: [
                device_limits.max_compute_workgroup_size_x,
                device_limits.max_compute_workgroup_size_y,
            ],
        };

        Ok(Self {
            surface,
            device,
            queue,
            config: surface_config,
            depth_format,
            sample_count,
            depth_view,
            msaa_view,
            limits,
            next_id: 0,
            buffers: HashMap::new(),
            shared: HashMap::new(),
            ownership: OwnershipTracker::new(),
            kernel_programs: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            current_program: None,
            encoder: None,
            frame: None,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    /// Run `create` inside a validation error scope
    fn validated<T>(&self, create: impl FnOnce(&wgpu::Device) -> T) -> Result<T, String> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = create(&self.device);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error.to_string()),
            None => Ok(value),
        }
    }

    fn current_program(&mut self) -> (ProgramHandle, &mut DeviceProgram) {
        let Some(handle) = self.current_program else {
            panic!("no program in use");
        };
        match self.programs.get_mut(&handle) {
            Some(program) => (handle, program),
            None => panic!("program {} was released", handle.id()),
        }
    }

    fn stage(
        label: &str,
        source: &str,
        entry_point: &str,
        stage: naga::ShaderStage,
    ) -> RendererResult<ShaderReflection> {
        let compile_error = |log: String| RendererError::ShaderCompile {
            name: label.to_string(),
            log,
        };
        let reflection = ShaderReflection::parse(source).map_err(compile_error)?;
        if reflection.entry_point_stage(entry_point) != Some(stage) {
            return Err(compile_error(format!(
                "no {:?} entry point named '{}'",
                stage, entry_point
            )));
        }
        Ok(reflection)
    }

    /// Copy each layer's mip chain into one 2D array texture
    fn build_texture_array(&self, name: &str, layers: &[TextureHandle]) -> wgpu::TextureView {
        let sources: Vec<&DeviceTexture> = layers
            .iter()
            .map(|handle| match self.textures.get(handle) {
                Some(texture) => texture,
                None => panic!("unknown texture {}", handle.id()),
            })
            .collect();
        let first = sources[0];
        if sources
            .iter()
            .any(|t| (t.width, t.height, t.levels) != (first.width, first.height, first.levels))
        {
            panic!("texture array '{}' mixes texture sizes", name);
        }

        let array = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(name),
            size: wgpu::Extent3d {
                width: first.width,
                height: first.height,
                depth_or_array_layers: sources.len() as u32,
            },
            mip_level_count: first.levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Texture Array Encoder"),
            });
        for (layer, source) in sources.iter().enumerate() {
            for level in 0..first.levels {
                encoder.copy_texture_to_texture(
                    wgpu::ImageCopyTexture {
                        texture: &source.texture,
                        mip_level: level,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyTexture {
                        texture: &array,
                        mip_level: level,
                        origin: wgpu::Origin3d {
                            x: 0,
                            y: 0,
                            z: layer as u32,
                        },
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: (first.width >> level).max(1),
                        height: (first.height >> level).max(1),
                        depth_or_array_layers: 1,
                    },
                );
            }
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        array.create_view(&wgpu::TextureViewDescriptor {
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        })
    }

    /// Bind groups for the current state of `program`
    fn bind_groups(
        &self,
        handle: ProgramHandle,
        program: &DeviceProgram,
    ) -> Vec<(u32, wgpu::BindGroup)> {
        let mut groups: BTreeMap<u32, Vec<wgpu::BindGroupEntry<'_>>> = BTreeMap::new();
        for global in &program.globals {
            let resource = match global.kind {
                GlobalKind::Uniform => program
                    .uniforms
                    .get(&global.name)
                    .map(|buffer| buffer.as_entire_binding()),
                GlobalKind::Texture => program
                    .texture_arrays
                    .get(&global.name)
                    .map(|array| wgpu::BindingResource::TextureView(&array.view)),
                GlobalKind::Sampler => Some(wgpu::BindingResource::Sampler(&program.sampler)),
                GlobalKind::Storage { .. } => None,
            };
            let Some(resource) = resource else {
                panic!("program {} draws with '{}' unbound", handle.id(), global.name);
            };
            groups.entry(global.group).or_default().push(wgpu::BindGroupEntry {
                binding: global.binding,
                resource,
            });
        }

        groups
            .into_iter()
            .map(|(group, entries)| {
                let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("Program Bind Group"),
                    layout: &program.pipeline.get_bind_group_layout(group),
                    entries: &entries,
                });
                (group, bind_group)
            })
            .collect()
    }
}

impl ComputeBackend for WgpuBackend {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn compile_kernels(&mut self, source: &KernelSource) -> RendererResult<KernelProgramHandle> {
        let build_error = |log: String| RendererError::KernelBuild {
            name: source.label.clone(),
            log,
        };

        let text = apply_definitions(&source.definitions, &source.source);
        let reflection = ShaderReflection::parse(&text).map_err(build_error)?;
        for kernel in &source.kernels {
            if reflection.entry_point_stage(kernel) != Some(naga::ShaderStage::Compute) {
                return Err(build_error(format!("no kernel named '{}'", kernel)));
            }
        }

        let pipelines = self
            .validated(|device| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(source.label.as_str()),
                    source: wgpu::ShaderSource::Wgsl(text.as_str().into()),
                });
                source
                    .kernels
                    .iter()
                    .map(|kernel| {
                        let descriptor = wgpu::ComputePipelineDescriptor {
                            label: Some(kernel.as_str()),
                            layout: None,
                            module: &module,
                            entry_point: Some(kernel.as_str()),
                            compilation_options: Default::default(),
                            cache: None,
                        };
                        (kernel.clone(), device.create_compute_pipeline(&descriptor))
                    })
                    .collect::<HashMap<_, _>>()
            })
            .map_err(build_error)?;

        let handle = KernelProgramHandle::new(self.next_id());
        self.kernel_programs.insert(
            handle,
            KernelProgram {
                reflection,
                pipelines,
            },
        );
        log::info!("Built kernel program {}", source.label);
        Ok(handle)
    }

    fn allocate_buffer(&mut self, label: &str, words: usize, access: Access) -> BufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (words.max(1) * 4) as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let handle = BufferHandle::new(self.next_id());
        self.buffers.insert(
            handle,
            DeviceBuffer {
                buffer,
                access,
                pending: Vec::new(),
            },
        );
        handle
    }

    fn create_buffer_init(&mut self, label: &str, data: &[u8], access: Access) -> BufferHandle {
        let handle = self.allocate_buffer(label, data.len().div_ceil(4), access);
        self.write_buffer(handle, 0, data);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(device_buffer) = self.buffers.get_mut(&buffer) else {
            panic!("unknown buffer {}", buffer.id());
        };
        match device_buffer.access {
            Access::ReadOnly => device_buffer.pending.push((offset, data.to_vec())),
            Access::ReadWrite => self.queue.write_buffer(&device_buffer.buffer, offset, data),
        }
    }

    fn buffer_access(&self, buffer: BufferHandle) -> Access {
        match self.buffers.get(&buffer) {
            Some(device_buffer) => device_buffer.access,
            None => panic!("unknown buffer {}", buffer.id()),
        }
    }

    fn upload(&mut self, buffer: BufferHandle) {
        let Some(device_buffer) = self.buffers.get_mut(&buffer) else {
            panic!("unknown buffer {}", buffer.id());
        };
        for (offset, data) in device_buffer.pending.drain(..) {
            self.queue.write_buffer(&device_buffer.buffer, offset, &data);
        }
    }

    fn acquire_shared(&mut self, buffer: SharedBufferHandle) {
        // One device: the queue already orders vertex reads after kernel writes
        self.ownership.begin_acquire(buffer);
        self.ownership.finish_acquire(buffer);
    }

    fn release_shared(&mut self, buffer: SharedBufferHandle) {
        self.ownership.begin_release(buffer);
    }

    fn dispatch(
        &mut self,
        program: KernelProgramHandle,
        kernel: &str,
        range: &NdRange,
        args: &[KernelArg],
    ) {
        let Some(kernel_program) = self.kernel_programs.get(&program) else {
            panic!("unknown kernel program {}", program.id());
        };
        let Some(pipeline) = kernel_program.pipelines.get(kernel) else {
            panic!("kernel program {} has no kernel '{}'", program.id(), kernel);
        };

        let uniforms = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Kernel Range"),
            contents: bytemuck::cast_slice(&pack_kernel_uniforms(range, args)),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let mut buffers = Vec::new();
        for arg in args {
            match *arg {
                KernelArg::Buffer(handle) => match self.buffers.get(&handle) {
                    Some(device_buffer) => buffers.push(&device_buffer.buffer),
                    None => panic!("unknown buffer {}", handle.id()),
                },
                KernelArg::Shared(handle) => {
                    self.ownership.assert_compute_owned(handle);
                    match self.shared.get(&handle) {
                        Some(buffer) => buffers.push(buffer),
                        None => panic!("unknown shared buffer {}", handle.id()),
                    }
                }
                KernelArg::Float(_) | KernelArg::Int(_) => {}
            }
        }

        let globals = kernel_program.reflection.used_globals(kernel);
        let storage = globals
            .iter()
            .filter(|global| matches!(global.kind, GlobalKind::Storage { .. }))
            .count();
        assert_eq!(
            storage,
            buffers.len(),
            "kernel '{}' binds {} buffers but got {}",
            kernel,
            storage,
            buffers.len()
        );

        let mut next_buffer = buffers.into_iter();
        let entries: Vec<wgpu::BindGroupEntry<'_>> = globals
            .iter()
            .filter_map(|global| {
                let resource = match global.kind {
                    GlobalKind::Uniform => uniforms.as_entire_binding(),
                    GlobalKind::Storage { .. } => next_buffer.next()?.as_entire_binding(),
                    GlobalKind::Texture | GlobalKind::Sampler => return None,
                };
                Some(wgpu::BindGroupEntry {
                    binding: global.binding,
                    resource,
                })
            })
            .collect();
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(kernel),
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let local = local_work_sizes(&self.limits);
        let counts = workgroup_counts(local, global_work_sizes(local, range.size));

        let device = &self.device;
        let encoder = self.encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Compute Encoder"),
            })
        });
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(kernel),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(counts[0], counts[1], 1);
    }

    fn flush(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
        self.ownership.finish_releases();
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        match self.buffers.remove(&buffer) {
            Some(device_buffer) => device_buffer.buffer.destroy(),
            None => panic!("release of unknown buffer {}", buffer.id()),
        }
    }

    fn release_kernels(&mut self, program: KernelProgramHandle) {
        if self.kernel_programs.remove(&program).is_none() {
            panic!("release of unknown kernel program {}", program.id());
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile_program(&mut self, desc: &ProgramDesc) -> RendererResult<ProgramHandle> {
        let vertex_text = apply_definitions(&desc.vertex.definitions, &desc.vertex.source);
        let fragment_text = apply_definitions(&desc.fragment.definitions, &desc.fragment.source);
        let vertex = Self::stage(
            &desc.vertex.label,
            &vertex_text,
            &desc.vertex.entry_point,
            naga::ShaderStage::Vertex,
        )?;
        let fragment = Self::stage(
            &desc.fragment.label,
            &fragment_text,
            &desc.fragment.entry_point,
            naga::ShaderStage::Fragment,
        )?;

        let link_error = |log: String| RendererError::ProgramLink {
            vertex: desc.vertex.label.clone(),
            fragment: desc.fragment.label.clone(),
            log,
        };
        check_link(
            &vertex,
            &desc.vertex.entry_point,
            &fragment,
            &desc.fragment.entry_point,
            desc.attributes.len(),
        )
        .map_err(link_error)?;

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = desc
            .attributes
            .iter()
            .enumerate()
            .map(|(location, attribute)| {
                let format = match attribute.components {
                    1 => wgpu::VertexFormat::Float32,
                    2 => wgpu::VertexFormat::Float32x2,
                    3 => wgpu::VertexFormat::Float32x3,
                    _ => wgpu::VertexFormat::Float32x4,
                };
                [wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: location as u32,
                    format,
                }]
            })
            .collect();
        let layouts: Vec<wgpu::VertexBufferLayout<'_>> = desc
            .attributes
            .iter()
            .zip(&attributes)
            .map(|(attribute, formats)| wgpu::VertexBufferLayout {
                array_stride: (attribute.components * 4) as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: formats,
            })
            .collect();

        let color_format = self.config.format;
        let depth_format = self.depth_format;
        let sample_count = self.sample_count;
        let pipeline = self
            .validated(|device| {
                let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.vertex.label.as_str()),
                    source: wgpu::ShaderSource::Wgsl(vertex_text.as_str().into()),
                });
                let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(desc.fragment.label.as_str()),
                    source: wgpu::ShaderSource::Wgsl(fragment_text.as_str().into()),
                });
                device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                    label: Some("Terrain Render Pipeline"),
                    layout: None,
                    vertex: wgpu::VertexState {
                        module: &vertex_module,
                        entry_point: Some(desc.vertex.entry_point.as_str()),
                        buffers: &layouts,
                        compilation_options: Default::default(),
                    },
                    fragment: Some(wgpu::FragmentState {
                        module: &fragment_module,
                        entry_point: Some(desc.fragment.entry_point.as_str()),
                        targets: &[Some(wgpu::ColorTargetState {
                            format: color_format,
                            blend: None,
                            write_mask: wgpu::ColorWrites::ALL,
                        })],
                        compilation_options: Default::default(),
                    }),
                    primitive: wgpu::PrimitiveState {
                        topology: wgpu::PrimitiveTopology::TriangleList,
                        strip_index_format: None,
                        front_face: wgpu::FrontFace::Ccw,
                        cull_mode: Some(wgpu::Face::Back),
                        polygon_mode: wgpu::PolygonMode::Fill,
                        unclipped_depth: false,
                        conservative: false,
                    },
                    depth_stencil: Some(wgpu::DepthStencilState {
                        format: depth_format,
                        depth_write_enabled: true,
                        depth_compare: wgpu::CompareFunction::Less,
                        stencil: wgpu::StencilState::default(),
                        bias: wgpu::DepthBiasState::default(),
                    }),
                    multisample: wgpu::MultisampleState {
                        count: sample_count,
                        ..Default::default()
                    },
                    multiview: None,
                    cache: None,
                })
            })
            .map_err(link_error)?;

        let mut globals = vertex.used_globals(&desc.vertex.entry_point);
        for global in fragment.used_globals(&desc.fragment.entry_point) {
            if !globals
                .iter()
                .any(|g| (g.group, g.binding) == (global.group, global.binding))
            {
                globals.push(global);
            }
        }
        globals.sort_by_key(|global| (global.group, global.binding));

        let sampler = self.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Terrain Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let handle = ProgramHandle::new(self.next_id());
        self.programs.insert(
            handle,
            DeviceProgram {
                pipeline,
                globals,
                uniforms: HashMap::new(),
                texture_arrays: HashMap::new(),
                sampler,
            },
        );
        log::info!(
            "Linked program ({}, {})",
            desc.vertex.label,
            desc.fragment.label
        );
        Ok(handle)
    }

    fn allocate_vertex_buffer(
        &mut self,
        label: &str,
        vertices: u32,
        components: u32,
    ) -> SharedBufferHandle {
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: (vertices.max(1) as u64) * (components as u64) * 4,
            usage: wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let handle = SharedBufferHandle::new(self.next_id());
        self.shared.insert(handle, buffer);
        self.ownership.register(handle);
        handle
    }

    fn create_vertex_array(
        &mut self,
        buffers: &[SharedBufferHandle],
        vertices: u32,
    ) -> VertexArrayHandle {
        let handle = VertexArrayHandle::new(self.next_id());
        self.vertex_arrays
            .insert(handle, (buffers.to_vec(), vertices));
        handle
    }

    fn create_texture(&mut self, data: &TextureData) -> TextureHandle {
        let (width, height) = data
            .levels
            .first()
            .map(|level| level.dimensions())
            .unwrap_or((1, 1));
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(data.label.as_str()),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: data.levels.len().max(1) as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        for (level, image) in data.levels.iter().enumerate() {
            let (level_width, level_height) = image.dimensions();
            self.queue.write_texture(
                wgpu::ImageCopyTexture {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                image.as_raw(),
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * level_width),
                    rows_per_image: Some(level_height),
                },
                wgpu::Extent3d {
                    width: level_width,
                    height: level_height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let handle = TextureHandle::new(self.next_id());
        self.textures.insert(
            handle,
            DeviceTexture {
                texture,
                width,
                height,
                levels: data.levels.len().max(1) as u32,
            },
        );
        handle
    }

    fn use_program(&mut self, program: ProgramHandle) {
        if !self.programs.contains_key(&program) {
            panic!("unknown program {}", program.id());
        }
        self.current_program = Some(program);
    }

    fn bind_uniform(&mut self, name: &str, data: &[u8]) {
        let Some(handle) = self.current_program else {
            panic!("no program in use");
        };
        let Some(program) = self.programs.get_mut(&handle) else {
            panic!("program {} was released", handle.id());
        };
        if !program
            .globals
            .iter()
            .any(|global| global.name == name && global.kind == GlobalKind::Uniform)
        {
            panic!("program {} has no uniform '{}'", handle.id(), name);
        }

        match program.uniforms.get(name) {
            Some(buffer) if buffer.size() == data.len() as u64 => {
                self.queue.write_buffer(buffer, 0, data);
            }
            _ => {
                let buffer = self
                    .device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(name),
                        contents: data,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    });
                program.uniforms.insert(name.to_string(), buffer);
            }
        }
    }

    fn bind_textures(&mut self, name: &str, textures: &[TextureHandle]) {
        let Some(handle) = self.current_program else {
            panic!("no program in use");
        };
        let cached = match self.programs.get(&handle) {
            Some(program) => {
                if !program
                    .globals
                    .iter()
                    .any(|global| global.name == name && global.kind == GlobalKind::Texture)
                {
                    panic!("program {} has no texture '{}'", handle.id(), name);
                }
                program
                    .texture_arrays
                    .get(name)
                    .is_some_and(|array| array.layers == textures)
            }
            None => panic!("program {} was released", handle.id()),
        };
        if cached {
            return;
        }

        let view = self.build_texture_array(name, textures);
        let (_, program) = self.current_program();
        program.texture_arrays.insert(
            name.to_string(),
            TextureArray {
                layers: textures.to_vec(),
                view,
            },
        );
    }

    fn draw(&mut self, vertex_array: VertexArrayHandle) {
        let Some((buffers, _)) = self.vertex_arrays.get(&vertex_array) else {
            panic!("unknown vertex array {}", vertex_array.id());
        };
        for buffer in buffers {
            self.ownership.assert_graphics_owned(*buffer);
        }
        let Some(handle) = self.current_program else {
            panic!("no program in use");
        };
        let Some(program) = self.programs.get(&handle) else {
            panic!("program {} was released", handle.id());
        };

        let bind_groups = self.bind_groups(handle, program);
        let Some(frame) = self.frame.as_mut() else {
            panic!("draw outside of a frame");
        };
        frame.draws.push(RecordedDraw {
            program: handle,
            vertex_array,
            bind_groups,
        });
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.ownership.assert_none_held();
        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Timeout) => return Err(FrameError::Timeout),
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(FrameError::OutOfMemory),
            Err(error) => {
                log::warn!("Surface unavailable ({}), reconfiguring", error);
                self.surface.configure(&self.device, &self.config);
                return Err(FrameError::Lost);
            }
        };
        self.frame = Some(Frame {
            surface_texture,
            draws: Vec::new(),
        });
        Ok(())
    }

    fn end_frame(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        let view = frame
            .surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let (target, resolve_target) = match &self.msaa_view {
                Some(msaa) => (msaa, Some(&view)),
                None => (&view, None),
            };
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Terrain Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            for draw in &frame.draws {
                let (Some(program), Some((buffers, vertices))) = (
                    self.programs.get(&draw.program),
                    self.vertex_arrays.get(&draw.vertex_array),
                ) else {
                    continue;
                };
                render_pass.set_pipeline(&program.pipeline);
                for (group, bind_group) in &draw.bind_groups {
                    render_pass.set_bind_group(*group, bind_group, &[]);
                }
                for (slot, buffer) in buffers.iter().enumerate() {
                    if let Some(buffer) = self.shared.get(buffer) {
                        render_pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                    }
                }
                render_pass.draw(0..*vertices, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        frame.surface_texture.present();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.config.width = width.max(1);
        self.config.height = height.max(1);
        self.surface.configure(&self.device, &self.config);
        self.depth_view = create_attachment(
            &self.device,
            "Depth Buffer",
            &self.config,
            self.depth_format,
            self.sample_count,
        );
        if self.sample_count > 1 {
            self.msaa_view = Some(create_attachment(
                &self.device,
                "Multisample Buffer",
                &self.config,
                self.config.format,
                self.sample_count,
            ));
        }
    }

    fn release_program(&mut self, program: ProgramHandle) {
        if self.programs.remove(&program).is_none() {
            panic!("release of unknown program {}", program.id());
        }
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn release_vertex_array(&mut self, vertex_array: VertexArrayHandle) {
        let Some((buffers, _)) = self.vertex_arrays.remove(&vertex_array) else {
            panic!("release of unknown vertex array {}", vertex_array.id());
        };
        for buffer in buffers {
            self.ownership.unregister(buffer);
            if let Some(buffer) = self.shared.remove(&buffer) {
                buffer.destroy();
            }
        }
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        match self.textures.remove(&texture) {
            Some(device_texture) => device_texture.texture.destroy(),
            None => panic!("release of unknown texture {}", texture.id()),
        }
    }
}
