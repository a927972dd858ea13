//! Graphics and compute capability interfaces.
//!
//! The mesh kernels and the terrain renderer only talk to these two traits.
//! [`WgpuBackend`] implements both on a single wgpu device; [`SoftwareBackend`]
//! implements both on the CPU for headless runs and tests.
//!
//! Buffers written by kernels and read by the vertex stage are *shared
//! buffers*. Each one carries an [`Ownership`] state; compute work must acquire
//! a shared buffer before writing it and release it before the next draw.

mod device;
mod reflect;
mod selection;
mod shared;
mod software;
mod work;

use crate::error::{FrameError, RendererResult};

pub use device::{list_adapters, WgpuBackend};
pub use reflect::{check_link, GlobalBinding, GlobalKind, ShaderReflection};
pub use selection::{select_adapter, AdapterClass, AdapterSummary};
pub use shared::{Ownership, OwnershipTracker};
pub use software::{DrawRecord, HostArgs, HostKernel, SoftwareBackend};
pub use work::{global_work_sizes, local_work_sizes, workgroup_counts};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            pub(crate) fn new(id: u32) -> Self {
                Self(id)
            }

            pub fn id(self) -> u32 {
                self.0
            }
        }
    };
}

handle!(
    /// Device buffer visible to compute kernels only
    BufferHandle
);
handle!(
    /// Vertex buffer that compute kernels may also write
    SharedBufferHandle
);
handle!(KernelProgramHandle);
handle!(ProgramHandle);
handle!(VertexArrayHandle);
handle!(TextureHandle);

/// How kernels may touch a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Written by the host, read by kernels; pending host data is uploaded
    /// before each dispatch
    ReadOnly,
    ReadWrite,
}

/// Compile-time constant prepended to a kernel or shader source
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefinitionValue {
    U32(u32),
    I32(i32),
    F32(f32),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub name: String,
    pub value: DefinitionValue,
}

impl Definition {
    pub fn u32(name: impl Into<String>, value: u32) -> Self {
        Self {
            name: name.into(),
            value: DefinitionValue::U32(value),
        }
    }

    pub fn i32(name: impl Into<String>, value: i32) -> Self {
        Self {
            name: name.into(),
            value: DefinitionValue::I32(value),
        }
    }

    pub fn f32(name: impl Into<String>, value: f32) -> Self {
        Self {
            name: name.into(),
            value: DefinitionValue::F32(value),
        }
    }

    fn to_wgsl(&self) -> String {
        match self.value {
            DefinitionValue::U32(v) => format!("const {}: u32 = {}u;", self.name, v),
            DefinitionValue::I32(v) => format!("const {}: i32 = {}i;", self.name, v),
            DefinitionValue::F32(v) => format!("const {}: f32 = {:?};", self.name, v),
        }
    }
}

/// Source text with one `const` declaration per definition in front
pub fn apply_definitions(definitions: &[Definition], source: &str) -> String {
    let mut text = String::new();
    for definition in definitions {
        text.push_str(&definition.to_wgsl());
        text.push('\n');
    }
    text.push_str(source);
    text
}

/// WGSL compute module with one entry point per kernel
#[derive(Debug, Clone)]
pub struct KernelSource {
    pub label: String,
    pub source: String,
    pub definitions: Vec<Definition>,
    pub kernels: Vec<String>,
}

/// One stage of a shader program
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub label: String,
    pub source: String,
    pub entry_point: String,
    pub definitions: Vec<Definition>,
}

/// Per-vertex input stream: one shared buffer per attribute, `components`
/// 32-bit floats per vertex, bound at location = index in the list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: String,
    pub components: u32,
}

#[derive(Debug, Clone)]
pub struct ProgramDesc {
    pub vertex: ShaderSource,
    pub fragment: ShaderSource,
    pub attributes: Vec<VertexAttribute>,
}

/// Mip chain of one RGBA8 texture, largest level first
#[derive(Debug, Clone)]
pub struct TextureData {
    pub label: String,
    pub levels: Vec<image::RgbaImage>,
}

/// Device capacity relevant to work-group sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// Maximum invocations in one work group
    pub max_work_group_size: u32,

    /// Maximum work-group extent per dimension (latitude, longitude)
    pub max_work_item_sizes: [u32; 2],
}

/// 2D index rectangle a kernel runs over (latitude, longitude)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdRange {
    pub offset: [u32; 2],
    pub size: [u32; 2],
}

impl NdRange {
    pub fn new(offset: [u32; 2], size: [u32; 2]) -> Self {
        Self { offset, size }
    }

    pub fn full(size: [u32; 2]) -> Self {
        Self {
            offset: [0, 0],
            size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size[0] == 0 || self.size[1] == 0
    }
}

/// Kernel argument. Scalars are packed in order behind the range header of
/// the kernel's uniform block; buffers bind to the kernel's storage bindings in
/// ascending binding order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelArg {
    Float(f32),
    Int(i32),
    Buffer(BufferHandle),
    Shared(SharedBufferHandle),
}

/// Uniform block contents for a dispatch: offset, size, then scalar words,
/// padded to 16 bytes
pub fn pack_kernel_uniforms(range: &NdRange, args: &[KernelArg]) -> Vec<u32> {
    let mut words = vec![range.offset[0], range.offset[1], range.size[0], range.size[1]];
    for arg in args {
        match *arg {
            KernelArg::Float(value) => words.push(value.to_bits()),
            KernelArg::Int(value) => words.push(value as u32),
            KernelArg::Buffer(_) | KernelArg::Shared(_) => {}
        }
    }
    while words.len() % 4 != 0 {
        words.push(0);
    }
    words
}

/// Compute half of the device
pub trait ComputeBackend {
    fn limits(&self) -> DeviceLimits;

    /// Build every kernel of `source`; compiler diagnostics are returned in
    /// [`crate::error::RendererError::KernelBuild`]
    fn compile_kernels(&mut self, source: &KernelSource) -> RendererResult<KernelProgramHandle>;

    /// Zero-initialized buffer of `words` 32-bit values
    fn allocate_buffer(&mut self, label: &str, words: usize, access: Access) -> BufferHandle;

    /// Buffer holding host data, uploaded on first use by a kernel
    fn create_buffer_init(&mut self, label: &str, data: &[u8], access: Access) -> BufferHandle;

    /// Replace part of a buffer's host data (byte offset), pending upload
    fn write_buffer(&mut self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn buffer_access(&self, buffer: BufferHandle) -> Access;

    /// Enqueue pending host data for `buffer`, if any
    fn upload(&mut self, buffer: BufferHandle);

    fn acquire_shared(&mut self, buffer: SharedBufferHandle);

    fn release_shared(&mut self, buffer: SharedBufferHandle);

    /// Enqueue one kernel run over `range` (padded to whole work groups)
    fn dispatch(
        &mut self,
        program: KernelProgramHandle,
        kernel: &str,
        range: &NdRange,
        args: &[KernelArg],
    );

    /// Submit everything enqueued; completes pending releases
    fn flush(&mut self);

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn release_kernels(&mut self, program: KernelProgramHandle);

    /// Run a kernel with the shared-buffer handoff: upload read-only host
    /// data, acquire shared arguments, dispatch, release, flush
    fn execute_kernel(
        &mut self,
        program: KernelProgramHandle,
        kernel: &str,
        range: &NdRange,
        args: &[KernelArg],
    ) {
        if range.is_empty() {
            return;
        }

        for arg in args {
            if let KernelArg::Buffer(buffer) = *arg {
                if self.buffer_access(buffer) == Access::ReadOnly {
                    self.upload(buffer);
                }
            }
        }
        for arg in args {
            if let KernelArg::Shared(buffer) = *arg {
                self.acquire_shared(buffer);
            }
        }

        self.dispatch(program, kernel, range, args);

        for arg in args {
            if let KernelArg::Shared(buffer) = *arg {
                self.release_shared(buffer);
            }
        }
        self.flush();
    }
}

/// Graphics half of the device
pub trait GraphicsBackend {
    /// Compile both stages and link them; diagnostics are returned in
    /// `ShaderCompile` or `ProgramLink`
    fn compile_program(&mut self, desc: &ProgramDesc) -> RendererResult<ProgramHandle>;

    /// Zero-initialized vertex buffer of `vertices × components` floats
    fn allocate_vertex_buffer(
        &mut self,
        label: &str,
        vertices: u32,
        components: u32,
    ) -> SharedBufferHandle;

    /// Group vertex buffers (one per program attribute, in order)
    fn create_vertex_array(
        &mut self,
        buffers: &[SharedBufferHandle],
        vertices: u32,
    ) -> VertexArrayHandle;

    fn create_texture(&mut self, texture: &TextureData) -> TextureHandle;

    fn use_program(&mut self, program: ProgramHandle);

    /// Set a uniform of the program in use by global name
    fn bind_uniform(&mut self, name: &str, data: &[u8]);

    /// Bind textures as layers of the texture array named `name`
    fn bind_textures(&mut self, name: &str, textures: &[TextureHandle]);

    /// Draw every vertex of `vertex_array` as a triangle list
    fn draw(&mut self, vertex_array: VertexArrayHandle);

    fn begin_frame(&mut self) -> Result<(), FrameError>;

    fn end_frame(&mut self);

    /// Resize the viewport; buffers and kernels are unaffected
    fn resize(&mut self, width: u32, height: u32);

    fn release_program(&mut self, program: ProgramHandle);

    /// Release a vertex array together with its vertex buffers
    fn release_vertex_array(&mut self, vertex_array: VertexArrayHandle);

    fn release_texture(&mut self, texture: TextureHandle);
}

/// A device with both halves
pub trait Backend: ComputeBackend + GraphicsBackend {}

impl<T: ComputeBackend + GraphicsBackend> Backend for T {}
