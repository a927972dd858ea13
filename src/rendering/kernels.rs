//! The mesh kernel program and its two dispatches.

use crate::backend::{
    BufferHandle, ComputeBackend, KernelArg, KernelProgramHandle, KernelSource, NdRange,
    SharedBufferHandle,
};
use crate::error::RendererResult;
use crate::mesh;

const MESH_SOURCE: &str = include_str!("mesh.wgsl");

/// Built mesh kernel program
#[derive(Debug)]
pub struct MeshKernels {
    program: KernelProgramHandle,
}

/// Dense lattice buffers written by the first pass and read by the second
#[derive(Debug, Clone, Copy)]
pub struct DenseBuffers {
    pub positions: BufferHandle,
    pub normals: BufferHandle,
}

/// Vertex streams written by the second pass
#[derive(Debug, Clone, Copy)]
pub struct VertexStreams {
    pub positions: SharedBufferHandle,
    pub normals: SharedBufferHandle,
    pub textures: SharedBufferHandle,
}

impl MeshKernels {
    pub fn build<B: ComputeBackend + ?Sized>(backend: &mut B) -> RendererResult<Self> {
        let source = KernelSource {
            label: "mesh.wgsl".to_string(),
            source: MESH_SOURCE.to_string(),
            definitions: mesh::kernel_definitions(&backend.limits()),
            kernels: vec![
                mesh::CALCULATE_POSITIONS_AND_NORMALS.to_string(),
                mesh::LOAD_VERTEX_BUFFERS.to_string(),
            ],
        };
        let program = backend.compile_kernels(&source)?;
        Ok(Self { program })
    }

    pub fn program(&self) -> KernelProgramHandle {
        self.program
    }

    /// Positions and normals of the dense vertices in `range`
    pub fn calculate_positions_and_normals<B: ComputeBackend + ?Sized>(
        &self,
        backend: &mut B,
        range: &NdRange,
        sizes: [usize; 2],
        altitudes: BufferHandle,
        dense: DenseBuffers,
    ) {
        backend.execute_kernel(
            self.program,
            mesh::CALCULATE_POSITIONS_AND_NORMALS,
            range,
            &[
                KernelArg::Int(sizes[0] as i32),
                KernelArg::Int(sizes[1] as i32),
                KernelArg::Buffer(altitudes),
                KernelArg::Buffer(dense.positions),
                KernelArg::Buffer(dense.normals),
            ],
        );
    }

    /// Fan triangles of the tiles in `range` into the vertex streams
    pub fn load_vertex_buffers<B: ComputeBackend + ?Sized>(
        &self,
        backend: &mut B,
        range: &NdRange,
        sizes: [usize; 2],
        dense: DenseBuffers,
        terrains: BufferHandle,
        streams: VertexStreams,
    ) {
        backend.execute_kernel(
            self.program,
            mesh::LOAD_VERTEX_BUFFERS,
            range,
            &[
                KernelArg::Int(sizes[0] as i32),
                KernelArg::Int(sizes[1] as i32),
                KernelArg::Buffer(dense.positions),
                KernelArg::Buffer(dense.normals),
                KernelArg::Buffer(terrains),
                KernelArg::Shared(streams.positions),
                KernelArg::Shared(streams.normals),
                KernelArg::Shared(streams.textures),
            ],
        );
    }

    pub fn release<B: ComputeBackend + ?Sized>(self, backend: &mut B) {
        backend.release_kernels(self.program);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Access, GraphicsBackend, SoftwareBackend};
    use crate::mesh::DenseGrid;

    #[test]
    fn test_mesh_source_builds() {
        let mut backend = SoftwareBackend::new();
        let kernels = MeshKernels::build(&mut backend).unwrap();
        kernels.release(&mut backend);
        assert_eq!(backend.live_resources(), 0);
    }

    #[test]
    fn test_dense_pass_matches_cpu_geometry() {
        let mut backend = SoftwareBackend::new();
        let kernels = MeshKernels::build(&mut backend).unwrap();

        let altitudes: Vec<f32> = vec![0.0, 1.0, 4.0, 2.0, 3.0, 0.5];
        let altitude_buffer = backend.create_buffer_init(
            "altitudes",
            bytemuck::cast_slice(&altitudes),
            Access::ReadOnly,
        );
        let dense = DenseBuffers {
            positions: backend.allocate_buffer("positions", 5 * 7 * 3, Access::ReadWrite),
            normals: backend.allocate_buffer("normals", 5 * 7 * 3, Access::ReadWrite),
        };

        kernels.calculate_positions_and_normals(
            &mut backend,
            &NdRange::full([5, 7]),
            [2, 3],
            altitude_buffer,
            dense,
        );

        let grid = DenseGrid::new(&altitudes, 2, 3);
        let positions = backend.read_buffer(dense.positions);
        let normals = backend.read_buffer(dense.normals);
        for i in 0..5 {
            for j in 0..7 {
                let index = (i * 7 + j) as usize * 3;
                assert_eq!(positions[index..index + 3], grid.position(i, j).to_array());
                assert_eq!(normals[index..index + 3], grid.normal(i, j).to_array());
            }
        }
    }

    #[test]
    fn test_vertex_pass_writes_layers() {
        let mut backend = SoftwareBackend::new();
        let kernels = MeshKernels::build(&mut backend).unwrap();

        let altitudes = [0.0f32; 2];
        let ordinals = [5u32, 7];
        let altitude_buffer = backend.create_buffer_init(
            "altitudes",
            bytemuck::cast_slice(&altitudes),
            Access::ReadOnly,
        );
        let terrains = backend.create_buffer_init(
            "terrains",
            bytemuck::cast_slice(&ordinals),
            Access::ReadOnly,
        );
        let dense = DenseBuffers {
            positions: backend.allocate_buffer("positions", 3 * 5 * 3, Access::ReadWrite),
            normals: backend.allocate_buffer("normals", 3 * 5 * 3, Access::ReadWrite),
        };
        let vertices = mesh::vertex_count(1, 2).unwrap();
        let streams = VertexStreams {
            positions: backend.allocate_vertex_buffer("positions", vertices, 3),
            normals: backend.allocate_vertex_buffer("normals", vertices, 3),
            textures: backend.allocate_vertex_buffer("textures", vertices, 3),
        };

        kernels.calculate_positions_and_normals(
            &mut backend,
            &NdRange::full([3, 5]),
            [1, 2],
            altitude_buffer,
            dense,
        );
        kernels.load_vertex_buffers(
            &mut backend,
            &NdRange::full([1, 2]),
            [1, 2],
            dense,
            terrains,
            streams,
        );

        let textures = backend.read_shared(streams.textures);
        assert_eq!(textures.len(), 48 * 3);
        for vertex in 0..48 {
            let expected = if vertex < 24 { 5.0 } else { 7.0 };
            assert_eq!(textures[vertex * 3 + 2], expected, "layer of vertex {}", vertex);
        }
        // First vertex of the first triangle is the centre of tile (0, 0)
        assert_eq!(textures[0..2], [0.5, 0.5]);
        assert_eq!(backend.read_shared(streams.positions)[0..3], [0.5, 0.0, -0.5]);
    }
}
