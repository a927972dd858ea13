//! CPU implementation of both backend traits.
//!
//! Kernels run as host functions looked up by entry-point name, one call per
//! invocation of the padded global range. WGSL sources are still parsed and
//! validated with naga, so compile and link diagnostics match what a device
//! would report. Draw calls are recorded instead of rasterized.

use std::collections::HashMap;

use super::reflect::{check_link, GlobalKind, ShaderReflection};
use super::shared::{Ownership, OwnershipTracker};
use super::work::{global_work_sizes, local_work_sizes};
use super::{
    apply_definitions, Access, BufferHandle, ComputeBackend, DeviceLimits, GraphicsBackend,
    KernelArg, KernelProgramHandle, KernelSource, NdRange, ProgramDesc, ProgramHandle,
    SharedBufferHandle, TextureData, TextureHandle, VertexArrayHandle,
};
use crate::error::{FrameError, RendererError, RendererResult};

/// One kernel invocation at a global id (latitude, longitude)
pub type HostKernel = fn(id: [u32; 2], args: &mut HostArgs);

/// Arguments visible to a host kernel. Scalars and buffers are indexed by
/// their position among the scalar and buffer arguments respectively.
pub struct HostArgs {
    pub range: NdRange,
    scalars: Vec<KernelArg>,
    buffers: Vec<Vec<u32>>,
}

impl HostArgs {
    pub fn int(&self, index: usize) -> i32 {
        match self.scalars[index] {
            KernelArg::Int(value) => value,
            other => panic!("scalar {} is {:?}, not an integer", index, other),
        }
    }

    pub fn float(&self, index: usize) -> f32 {
        match self.scalars[index] {
            KernelArg::Float(value) => value,
            other => panic!("scalar {} is {:?}, not a float", index, other),
        }
    }

    pub fn floats(&self, buffer: usize) -> &[f32] {
        bytemuck::cast_slice(&self.buffers[buffer])
    }

    pub fn read_f32(&self, buffer: usize, index: usize) -> f32 {
        f32::from_bits(self.buffers[buffer][index])
    }

    pub fn read_u32(&self, buffer: usize, index: usize) -> u32 {
        self.buffers[buffer][index]
    }

    pub fn write_f32(&mut self, buffer: usize, index: usize, value: f32) {
        self.buffers[buffer][index] = value.to_bits();
    }
}

struct HostBuffer {
    access: Access,
    device: Vec<u32>,
    pending: Option<Vec<u32>>,
}

struct HostProgram {
    vertex: ShaderReflection,
    fragment: ShaderReflection,
    uniforms: HashMap<String, Vec<u8>>,
    textures: HashMap<String, Vec<TextureHandle>>,
}

struct HostTexture {
    width: u32,
    height: u32,
    levels: usize,
}

/// A recorded draw call
#[derive(Debug, Clone, PartialEq)]
pub struct DrawRecord {
    pub program: ProgramHandle,
    pub vertex_array: VertexArrayHandle,
    pub vertices: u32,
    pub uniforms: HashMap<String, Vec<u8>>,
    pub textures: HashMap<String, Vec<TextureHandle>>,
}

pub struct SoftwareBackend {
    limits: DeviceLimits,
    next_id: u32,
    host_kernels: HashMap<String, HostKernel>,
    buffers: HashMap<BufferHandle, HostBuffer>,
    shared: HashMap<SharedBufferHandle, Vec<u32>>,
    ownership: OwnershipTracker,
    kernel_programs: HashMap<KernelProgramHandle, Vec<String>>,
    programs: HashMap<ProgramHandle, HostProgram>,
    vertex_arrays: HashMap<VertexArrayHandle, (Vec<SharedBufferHandle>, u32)>,
    textures: HashMap<TextureHandle, HostTexture>,
    current_program: Option<ProgramHandle>,
    in_frame: bool,
    frames: usize,
    dispatches: usize,
    draws: Vec<DrawRecord>,
    viewport: (u32, u32),
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareBackend {
    /// Backend with the mesh kernels registered and a 64-invocation work
    /// group limit
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            max_work_group_size: 64,
            max_work_item_sizes: [256, 256],
        })
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        let mut backend = Self {
            limits,
            next_id: 0,
            host_kernels: HashMap::new(),
            buffers: HashMap::new(),
            shared: HashMap::new(),
            ownership: OwnershipTracker::new(),
            kernel_programs: HashMap::new(),
            programs: HashMap::new(),
            vertex_arrays: HashMap::new(),
            textures: HashMap::new(),
            current_program: None,
            in_frame: false,
            frames: 0,
            dispatches: 0,
            draws: Vec::new(),
            viewport: (0, 0),
        };
        for (name, kernel) in crate::mesh::host_kernels() {
            backend.register_kernel(name, kernel);
        }
        backend
    }

    pub fn register_kernel(&mut self, name: &str, kernel: HostKernel) {
        self.host_kernels.insert(name.to_string(), kernel);
    }

    /// Device contents of a compute buffer as floats
    pub fn read_buffer(&self, buffer: BufferHandle) -> Vec<f32> {
        match self.buffers.get(&buffer) {
            Some(host) => host.device.iter().map(|w| f32::from_bits(*w)).collect(),
            None => panic!("unknown buffer {}", buffer.id()),
        }
    }

    /// Contents of a shared vertex buffer as floats
    pub fn read_shared(&self, buffer: SharedBufferHandle) -> Vec<f32> {
        match self.shared.get(&buffer) {
            Some(words) => words.iter().map(|w| f32::from_bits(*w)).collect(),
            None => panic!("unknown shared buffer {}", buffer.id()),
        }
    }

    pub fn ownership(&self, buffer: SharedBufferHandle) -> Ownership {
        self.ownership.state(buffer)
    }

    pub fn vertex_array_buffers(&self, vertex_array: VertexArrayHandle) -> Vec<SharedBufferHandle> {
        match self.vertex_arrays.get(&vertex_array) {
            Some((buffers, _)) => buffers.clone(),
            None => panic!("unknown vertex array {}", vertex_array.id()),
        }
    }

    pub fn texture_size(&self, texture: TextureHandle) -> (u32, u32, usize) {
        match self.textures.get(&texture) {
            Some(t) => (t.width, t.height, t.levels),
            None => panic!("unknown texture {}", texture.id()),
        }
    }

    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn dispatches(&self) -> usize {
        self.dispatches
    }

    pub fn viewport(&self) -> (u32, u32) {
        self.viewport
    }

    /// Number of device objects not yet released
    pub fn live_resources(&self) -> usize {
        self.buffers.len()
            + self.shared.len()
            + self.kernel_programs.len()
            + self.programs.len()
            + self.vertex_arrays.len()
            + self.textures.len()
    }

    fn next_id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    fn current_program(&mut self) -> (ProgramHandle, &mut HostProgram) {
        let Some(handle) = self.current_program else {
            panic!("no program in use");
        };
        match self.programs.get_mut(&handle) {
            Some(program) => (handle, program),
            None => panic!("program {} was released", handle.id()),
        }
    }

    fn compile_stage(
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
}

impl ComputeBackend for SoftwareBackend {
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
            if !self.host_kernels.contains_key(kernel) {
                return Err(build_error(format!(
                    "kernel '{}' has no host implementation",
                    kernel
                )));
            }
        }

        let handle = KernelProgramHandle::new(self.next_id());
        self.kernel_programs.insert(handle, source.kernels.clone());
        log::info!("Built kernel program {}", source.label);
        Ok(handle)
    }

    fn allocate_buffer(&mut self, _label: &str, words: usize, access: Access) -> BufferHandle {
        let handle = BufferHandle::new(self.next_id());
        self.buffers.insert(
            handle,
            HostBuffer {
                access,
                device: vec![0; words],
                pending: None,
            },
        );
        handle
    }

    fn create_buffer_init(&mut self, _label: &str, data: &[u8], access: Access) -> BufferHandle {
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(data);
        let handle = BufferHandle::new(self.next_id());
        let buffer = match access {
            Access::ReadOnly => HostBuffer {
                access,
                device: vec![0; words.len()],
                pending: Some(words),
            },
            Access::ReadWrite => HostBuffer {
                access,
                device: words,
                pending: None,
            },
        };
        self.buffers.insert(handle, buffer);
        handle
    }

    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]) {
        let Some(host) = self.buffers.get_mut(&buffer) else {
            panic!("unknown buffer {}", buffer.id());
        };
        let words: Vec<u32> = bytemuck::pod_collect_to_vec(data);
        let start = (offset / 4) as usize;
        let target = match host.access {
            Access::ReadOnly => host.pending.get_or_insert_with(|| host.device.clone()),
            Access::ReadWrite => &mut host.device,
        };
        target[start..start + words.len()].copy_from_slice(&words);
    }

    fn buffer_access(&self, buffer: BufferHandle) -> Access {
        match self.buffers.get(&buffer) {
            Some(host) => host.access,
            None => panic!("unknown buffer {}", buffer.id()),
        }
    }

    fn upload(&mut self, buffer: BufferHandle) {
        let Some(host) = self.buffers.get_mut(&buffer) else {
            panic!("unknown buffer {}", buffer.id());
        };
        if let Some(pending) = host.pending.take() {
            host.device = pending;
        }
    }

    fn acquire_shared(&mut self, buffer: SharedBufferHandle) {
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
        match self.kernel_programs.get(&program) {
            Some(kernels) if kernels.iter().any(|k| k == kernel) => {}
            Some(_) => panic!("kernel program {} has no kernel '{}'", program.id(), kernel),
            None => panic!("unknown kernel program {}", program.id()),
        }
        let Some(host_kernel) = self.host_kernels.get(kernel).copied() else {
            panic!("kernel '{}' has no host implementation", kernel);
        };

        // Buffer contents are moved out for the run, so each buffer may appear once
        for (index, arg) in args.iter().enumerate() {
            if matches!(arg, KernelArg::Buffer(_) | KernelArg::Shared(_)) {
                assert!(
                    !args[..index].contains(arg),
                    "buffer argument {:?} passed twice to kernel '{}'",
                    arg,
                    kernel
                );
            }
        }

        let mut scalars = Vec::new();
        let mut buffers = Vec::new();
        for arg in args {
            match *arg {
                KernelArg::Float(_) | KernelArg::Int(_) => scalars.push(*arg),
                KernelArg::Buffer(handle) => match self.buffers.get_mut(&handle) {
                    Some(host) => buffers.push(std::mem::take(&mut host.device)),
                    None => panic!("unknown buffer {}", handle.id()),
                },
                KernelArg::Shared(handle) => {
                    self.ownership.assert_compute_owned(handle);
                    match self.shared.get_mut(&handle) {
                        Some(words) => buffers.push(std::mem::take(words)),
                        None => panic!("unknown shared buffer {}", handle.id()),
                    }
                }
            }
        }

        let mut host_args = HostArgs {
            range: *range,
            scalars,
            buffers,
        };
        let local = local_work_sizes(&self.limits);
        let global = global_work_sizes(local, range.size);
        for latitude in 0..global[0] {
            for longitude in 0..global[1] {
                host_kernel([latitude, longitude], &mut host_args);
            }
        }

        let mut results = host_args.buffers.into_iter();
        for arg in args {
            match *arg {
                KernelArg::Buffer(handle) => {
                    let words = results.next();
                    if let (Some(host), Some(words)) = (self.buffers.get_mut(&handle), words) {
                        host.device = words;
                    }
                }
                KernelArg::Shared(handle) => {
                    let words = results.next();
                    if let (Some(slot), Some(words)) = (self.shared.get_mut(&handle), words) {
                        *slot = words;
                    }
                }
                KernelArg::Float(_) | KernelArg::Int(_) => {}
            }
        }
        self.dispatches += 1;
    }

    fn flush(&mut self) {
        self.ownership.finish_releases();
    }

    fn release_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer).is_none() {
            panic!("release of unknown buffer {}", buffer.id());
        }
    }

    fn release_kernels(&mut self, program: KernelProgramHandle) {
        if self.kernel_programs.remove(&program).is_none() {
            panic!("release of unknown kernel program {}", program.id());
        }
    }
}

impl GraphicsBackend for SoftwareBackend {
    fn compile_program(&mut self, desc: &ProgramDesc) -> RendererResult<ProgramHandle> {
        let vertex = Self::compile_stage(
            &desc.vertex.label,
            &apply_definitions(&desc.vertex.definitions, &desc.vertex.source),
            &desc.vertex.entry_point,
            naga::ShaderStage::Vertex,
        )?;
        let fragment = Self::compile_stage(
            &desc.fragment.label,
            &apply_definitions(&desc.fragment.definitions, &desc.fragment.source),
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

        let handle = ProgramHandle::new(self.next_id());
        self.programs.insert(
            handle,
            HostProgram {
                vertex,
                fragment,
                uniforms: HashMap::new(),
                textures: HashMap::new(),
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
        _label: &str,
        vertices: u32,
        components: u32,
    ) -> SharedBufferHandle {
        let handle = SharedBufferHandle::new(self.next_id());
        self.shared
            .insert(handle, vec![0; vertices as usize * components as usize]);
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

    fn create_texture(&mut self, texture: &TextureData) -> TextureHandle {
        let (width, height) = texture
            .levels
            .first()
            .map(|level| level.dimensions())
            .unwrap_or((0, 0));
        let handle = TextureHandle::new(self.next_id());
        self.textures.insert(
            handle,
            HostTexture {
                width,
                height,
                levels: texture.levels.len(),
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
        let (handle, program) = self.current_program();
        let global = program
            .vertex
            .global(name)
            .or_else(|| program.fragment.global(name));
        match global {
            Some(global) if global.kind == GlobalKind::Uniform => {
                program.uniforms.insert(name.to_string(), data.to_vec());
            }
            _ => panic!("program {} has no uniform '{}'", handle.id(), name),
        }
    }

    fn bind_textures(&mut self, name: &str, textures: &[TextureHandle]) {
        let sizes: Vec<(u32, u32, usize)> =
            textures.iter().map(|t| self.texture_size(*t)).collect();
        if sizes.windows(2).any(|pair| pair[0] != pair[1]) {
            panic!("texture array '{}' mixes texture sizes {:?}", name, sizes);
        }

        let (handle, program) = self.current_program();
        match program.fragment.global(name) {
            Some(global) if global.kind == GlobalKind::Texture => {
                program.textures.insert(name.to_string(), textures.to_vec());
            }
            _ => panic!("program {} has no texture '{}'", handle.id(), name),
        }
    }

    fn draw(&mut self, vertex_array: VertexArrayHandle) {
        assert!(self.in_frame, "draw outside of a frame");
        let Some((buffers, vertices)) = self.vertex_arrays.get(&vertex_array).cloned() else {
            panic!("unknown vertex array {}", vertex_array.id());
        };
        for buffer in &buffers {
            self.ownership.assert_graphics_owned(*buffer);
        }

        let (handle, program) = self.current_program();
        let record = DrawRecord {
            program: handle,
            vertex_array,
            vertices,
            uniforms: program.uniforms.clone(),
            textures: program.textures.clone(),
        };
        self.draws.push(record);
    }

    fn begin_frame(&mut self) -> Result<(), FrameError> {
        self.ownership.assert_none_held();
        self.in_frame = true;
        Ok(())
    }

    fn end_frame(&mut self) {
        self.in_frame = false;
        self.frames += 1;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
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
            self.shared.remove(&buffer);
        }
    }

    fn release_texture(&mut self, texture: TextureHandle) {
        if self.textures.remove(&texture).is_none() {
            panic!("release of unknown texture {}", texture.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Definition, ShaderSource, VertexAttribute};

    const DOUBLE: &str = r#"
        struct KernelRange {
            offset: vec2<u32>,
            size: vec2<u32>,
            factor: f32,
        }

        @group(0) @binding(0) var<uniform> kernel_range: KernelRange;
        @group(0) @binding(1) var<storage, read> input: array<f32>;
        @group(0) @binding(2) var<storage, read_write> output: array<f32>;

        @compute @workgroup_size(WIDTH, 1)
        fn double(@builtin(global_invocation_id) id: vec3<u32>) {
            if id.x >= kernel_range.size.x || id.y >= kernel_range.size.y {
                return;
            }
            let index = kernel_range.offset.x + id.x;
            output[index] = input[index] * kernel_range.factor;
        }
    "#;

    fn host_double(id: [u32; 2], args: &mut HostArgs) {
        if id[0] >= args.range.size[0] || id[1] >= args.range.size[1] {
            return;
        }
        let index = (args.range.offset[0] + id[0]) as usize;
        let value = args.read_f32(0, index) * args.float(0);
        args.write_f32(1, index, value);
    }

    fn double_source() -> KernelSource {
        KernelSource {
            label: "double".to_string(),
            source: DOUBLE.to_string(),
            definitions: vec![Definition::u32("WIDTH", 8)],
            kernels: vec!["double".to_string()],
        }
    }

    #[test]
    fn test_kernel_runs_over_range_only() {
        let mut backend = SoftwareBackend::new();
        backend.register_kernel("double", host_double);
        let program = backend.compile_kernels(&double_source()).unwrap();

        let input: Vec<f32> = (0..10).map(|x| x as f32).collect();
        let input =
            backend.create_buffer_init("input", bytemuck::cast_slice(&input), Access::ReadOnly);
        let output = backend.allocate_buffer("output", 10, Access::ReadWrite);

        backend.execute_kernel(
            program,
            "double",
            &NdRange::new([2, 0], [5, 1]),
            &[
                KernelArg::Float(3.0),
                KernelArg::Buffer(input),
                KernelArg::Buffer(output),
            ],
        );

        let result = backend.read_buffer(output);
        assert_eq!(result[..2], [0.0, 0.0]);
        assert_eq!(result[2..7], [6.0, 9.0, 12.0, 15.0, 18.0]);
        assert_eq!(result[7..], [0.0, 0.0, 0.0]);
    }

    #[test]
    #[should_panic(expected = "passed twice")]
    fn test_aliased_buffer_arguments_are_rejected() {
        let mut backend = SoftwareBackend::new();
        backend.register_kernel("double", host_double);
        let program = backend.compile_kernels(&double_source()).unwrap();
        let buffer = backend.allocate_buffer("in place", 4, Access::ReadWrite);

        backend.execute_kernel(
            program,
            "double",
            &NdRange::full([4, 1]),
            &[
                KernelArg::Float(2.0),
                KernelArg::Buffer(buffer),
                KernelArg::Buffer(buffer),
            ],
        );
    }

    #[test]
    fn test_read_only_host_data_uploads_on_use() {
        let mut backend = SoftwareBackend::new();
        let buffer = backend.create_buffer_init(
            "altitudes",
            bytemuck::cast_slice(&[1.0f32, 2.0]),
            Access::ReadOnly,
        );
        assert_eq!(backend.read_buffer(buffer), vec![0.0, 0.0]);

        backend.upload(buffer);
        assert_eq!(backend.read_buffer(buffer), vec![1.0, 2.0]);

        backend.write_buffer(buffer, 4, bytemuck::cast_slice(&[5.0f32]));
        assert_eq!(backend.read_buffer(buffer), vec![1.0, 2.0]);
        backend.upload(buffer);
        assert_eq!(backend.read_buffer(buffer), vec![1.0, 5.0]);
    }

    #[test]
    fn test_kernel_build_error_carries_log() {
        let mut backend = SoftwareBackend::new();
        let mut source = double_source();
        source.definitions.clear();
        match backend.compile_kernels(&source) {
            Err(RendererError::KernelBuild { name, log }) => {
                assert_eq!(name, "double");
                assert!(!log.is_empty());
            }
            other => panic!("expected kernel build error, got {:?}", other.map(|_| ())),
        }
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_missing_host_kernel_is_build_error() {
        let mut backend = SoftwareBackend::new();
        assert!(matches!(
            backend.compile_kernels(&double_source()),
            Err(RendererError::KernelBuild { .. })
        ));
    }

    const VERTEX: &str = r#"
        struct Out {
            @builtin(position) clip: vec4<f32>,
            @location(0) shade: f32,
        }

        @group(0) @binding(0) var<uniform> transformation: mat4x4<f32>;

        @vertex
        fn vs_main(@location(0) position: vec3<f32>) -> Out {
            var out: Out;
            out.clip = transformation * vec4<f32>(position, 1.0);
            out.shade = position.y;
            return out;
        }
    "#;

    const FRAGMENT: &str = r#"
        @fragment
        fn fs_main(@location(LOCATION) shade: f32) -> @location(0) vec4<f32> {
            return vec4<f32>(shade, shade, shade, 1.0);
        }
    "#;

    fn program_desc(location: u32) -> ProgramDesc {
        ProgramDesc {
            vertex: ShaderSource {
                label: "test.vert".to_string(),
                source: VERTEX.to_string(),
                entry_point: "vs_main".to_string(),
                definitions: Vec::new(),
            },
            fragment: ShaderSource {
                label: "test.frag".to_string(),
                source: FRAGMENT.replace("LOCATION", &location.to_string()),
                entry_point: "fs_main".to_string(),
                definitions: Vec::new(),
            },
            attributes: vec![VertexAttribute {
                name: "position".to_string(),
                components: 3,
            }],
        }
    }

    #[test]
    fn test_link_checks_stage_interface() {
        let mut backend = SoftwareBackend::new();
        assert!(backend.compile_program(&program_desc(0)).is_ok());
        match backend.compile_program(&program_desc(3)) {
            Err(RendererError::ProgramLink { log, .. }) => assert!(log.contains("location 3")),
            other => panic!("expected link error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_compile_error_names_stage() {
        let mut backend = SoftwareBackend::new();
        let mut desc = program_desc(0);
        desc.vertex.source.push_str("fn broken( {");
        match backend.compile_program(&desc) {
            Err(RendererError::ShaderCompile { name, log }) => {
                assert_eq!(name, "test.vert");
                assert!(!log.is_empty());
            }
            other => panic!("expected compile error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_draw_records_bound_state() {
        let mut backend = SoftwareBackend::new();
        let program = backend.compile_program(&program_desc(0)).unwrap();
        let buffer = backend.allocate_vertex_buffer("position", 3, 3);
        let vertex_array = backend.create_vertex_array(&[buffer], 3);

        backend.begin_frame().unwrap();
        backend.use_program(program);
        backend.bind_uniform("transformation", &[0u8; 64]);
        backend.draw(vertex_array);
        backend.end_frame();

        assert_eq!(backend.frames(), 1);
        assert_eq!(backend.draws().len(), 1);
        assert_eq!(backend.draws()[0].vertices, 3);
        assert_eq!(backend.draws()[0].uniforms["transformation"].len(), 64);

        backend.release_vertex_array(vertex_array);
        backend.release_program(program);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    #[should_panic(expected = "has no uniform")]
    fn test_unknown_uniform_panics() {
        let mut backend = SoftwareBackend::new();
        let program = backend.compile_program(&program_desc(0)).unwrap();
        backend.use_program(program);
        backend.bind_uniform("projection", &[0u8; 64]);
    }
}
