//! Terrain renderer: owns every device resource of one map's mesh.

use glam::Mat4;

use super::kernels::{DenseBuffers, MeshKernels, VertexStreams};
use super::textures::load_terrain_textures;
use crate::backend::{
    Access, Backend, BufferHandle, Definition, NdRange, ProgramDesc, ProgramHandle,
    ShaderSource, TextureHandle, VertexArrayHandle, VertexAttribute,
};
use crate::error::{RendererError, RendererResult};
use crate::map::{Map, Terrain};
use crate::mesh::{self, NORMAL_COMPONENTS, POSITION_COMPONENTS, TEXTURE_COMPONENTS};
use crate::params::Configuration;

const VERTEX_SOURCE: &str = include_str!("terrain_vertex.wgsl");
const FRAGMENT_SOURCE: &str = include_str!("terrain_fragment.wgsl");

/// Resources created so far, released in reverse if construction fails
#[derive(Default)]
struct Rollback {
    allocations: Vec<Allocation>,
}

enum Allocation {
    Buffer(BufferHandle),
    VertexArray(VertexArrayHandle),
    Texture(TextureHandle),
    Kernels(MeshKernels),
    Program(ProgramHandle),
}

impl Rollback {
    fn push(&mut self, allocation: Allocation) {
        self.allocations.push(allocation);
    }

    fn release<B: Backend + ?Sized>(self, backend: &mut B) {
        for allocation in self.allocations.into_iter().rev() {
            match allocation {
                Allocation::Buffer(buffer) => backend.release_buffer(buffer),
                Allocation::VertexArray(vertex_array) => backend.release_vertex_array(vertex_array),
                Allocation::Texture(texture) => backend.release_texture(texture),
                Allocation::Kernels(kernels) => kernels.release(backend),
                Allocation::Program(program) => backend.release_program(program),
            }
        }
    }
}

/// Vertex count of a map's mesh, checked before any device allocation
fn mesh_vertices(sizes: [usize; 2]) -> RendererResult<u32> {
    mesh::vertex_count(sizes[0], sizes[1]).ok_or(RendererError::MeshTooLarge {
        latitudinal: sizes[0],
        longitudinal: sizes[1],
    })
}

/// Terrain mesh of one map, synthesized on the device and drawn with one call
pub struct TerrainRenderer {
    sizes: [usize; 2],
    vertices: u32,
    altitudes: BufferHandle,
    terrains: BufferHandle,
    dense: DenseBuffers,
    streams: VertexStreams,
    vertex_array: VertexArrayHandle,
    textures: Vec<TextureHandle>,
    kernels: MeshKernels,
    program: ProgramHandle,
}

impl TerrainRenderer {
    /// Allocate buffers, load textures, build the mesh and link the terrain
    /// program. On failure everything allocated so far is released.
    pub fn new<B: Backend + ?Sized>(
        backend: &mut B,
        config: &Configuration,
        map: &Map,
    ) -> RendererResult<Self> {
        let mut rollback = Rollback::default();
        match Self::build(backend, config, map, &mut rollback) {
            Ok(renderer) => Ok(renderer),
            Err(error) => {
                log::error!("Terrain renderer construction failed: {}", error);
                rollback.release(backend);
                Err(error)
            }
        }
    }

    fn build<B: Backend + ?Sized>(
        backend: &mut B,
        config: &Configuration,
        map: &Map,
        rollback: &mut Rollback,
    ) -> RendererResult<Self> {
        let sizes = [map.latitudinal_size(), map.longitudinal_size()];
        let vertices = mesh_vertices(sizes)?;
        let dense_sizes = mesh::dense_sizes(sizes[0], sizes[1]);
        let dense_words = dense_sizes[0] as usize * dense_sizes[1] as usize * 3;

        let altitudes = backend.create_buffer_init(
            "altitudes",
            bytemuck::cast_slice(&map.altitudes()),
            Access::ReadOnly,
        );
        rollback.push(Allocation::Buffer(altitudes));
        let terrains = backend.create_buffer_init(
            "terrains",
            bytemuck::cast_slice(&map.terrain_ordinals()),
            Access::ReadOnly,
        );
        rollback.push(Allocation::Buffer(terrains));

        let dense = DenseBuffers {
            positions: backend.allocate_buffer("dense positions", dense_words, Access::ReadWrite),
            normals: backend.allocate_buffer("dense normals", dense_words, Access::ReadWrite),
        };
        rollback.push(Allocation::Buffer(dense.positions));
        rollback.push(Allocation::Buffer(dense.normals));

        let streams = VertexStreams {
            positions: backend.allocate_vertex_buffer(
                "vertex positions",
                vertices,
                POSITION_COMPONENTS,
            ),
            normals: backend.allocate_vertex_buffer("vertex normals", vertices, NORMAL_COMPONENTS),
            textures: backend.allocate_vertex_buffer(
                "vertex textures",
                vertices,
                TEXTURE_COMPONENTS,
            ),
        };
        let vertex_array = backend.create_vertex_array(
            &[streams.positions, streams.normals, streams.textures],
            vertices,
        );
        rollback.push(Allocation::VertexArray(vertex_array));

        let mut textures = Vec::with_capacity(Terrain::ALL.len());
        for data in load_terrain_textures(&config.assets_dir)? {
            let texture = backend.create_texture(&data);
            rollback.push(Allocation::Texture(texture));
            textures.push(texture);
        }

        let kernels = MeshKernels::build(backend)?;
        kernels.calculate_positions_and_normals(
            backend,
            &NdRange::full(dense_sizes),
            sizes,
            altitudes,
            dense,
        );
        kernels.load_vertex_buffers(
            backend,
            &NdRange::full([sizes[0] as u32, sizes[1] as u32]),
            sizes,
            dense,
            terrains,
            streams,
        );
        let program = match backend.compile_program(&Self::program_desc()) {
            Ok(program) => program,
            Err(error) => {
                rollback.push(Allocation::Kernels(kernels));
                return Err(error);
            }
        };

        log::info!(
            "Terrain mesh ready: {}x{} tiles, {} vertices",
            sizes[0],
            sizes[1],
            vertices
        );
        Ok(Self {
            sizes,
            vertices,
            altitudes,
            terrains,
            dense,
            streams,
            vertex_array,
            textures,
            kernels,
            program,
        })
    }

    fn program_desc() -> ProgramDesc {
        ProgramDesc {
            vertex: ShaderSource {
                label: "terrain_vertex.wgsl".to_string(),
                source: VERTEX_SOURCE.to_string(),
                entry_point: "vs_main".to_string(),
                definitions: Vec::new(),
            },
            fragment: ShaderSource {
                label: "terrain_fragment.wgsl".to_string(),
                source: FRAGMENT_SOURCE.to_string(),
                entry_point: "fs_main".to_string(),
                definitions: vec![Definition::u32("TERRAINS", Terrain::ALL.len() as u32)],
            },
            attributes: vec![
                VertexAttribute {
                    name: "position".to_string(),
                    components: POSITION_COMPONENTS,
                },
                VertexAttribute {
                    name: "normal".to_string(),
                    components: NORMAL_COMPONENTS,
                },
                VertexAttribute {
                    name: "texture".to_string(),
                    components: TEXTURE_COMPONENTS,
                },
            ],
        }
    }

    /// Draw the whole mesh with `transformation` (projection × view)
    pub fn render<B: Backend + ?Sized>(&self, backend: &mut B, transformation: &Mat4) {
        backend.use_program(self.program);
        backend.bind_uniform(
            "transformation",
            bytemuck::cast_slice(&transformation.to_cols_array()),
        );
        backend.bind_textures("terrains", &self.textures);
        backend.draw(self.vertex_array);
    }

    /// Re-upload the tiles in `region` and rebuild every vertex that depends
    /// on them. `map` must have the size the renderer was built with.
    pub fn refresh<B: Backend + ?Sized>(&self, backend: &mut B, map: &Map, region: &NdRange) {
        assert_eq!(
            [map.latitudinal_size(), map.longitudinal_size()],
            self.sizes,
            "map size changed since the terrain mesh was built"
        );
        let [latitudes, longitudes] = self.sizes;
        let start = [
            (region.offset[0] as usize).min(latitudes),
            (region.offset[1] as usize).min(longitudes),
        ];
        let end = [
            (start[0] + region.size[0] as usize).min(latitudes),
            (start[1] + region.size[1] as usize).min(longitudes),
        ];
        let tiles = NdRange::new(
            [start[0] as u32, start[1] as u32],
            [(end[0] - start[0]) as u32, (end[1] - start[1]) as u32],
        );
        if tiles.is_empty() {
            return;
        }

        let altitudes = map.altitudes();
        let ordinals = map.terrain_ordinals();
        for latitude in start[0]..end[0] {
            let row = latitude * longitudes;
            let offset = ((row + start[1]) * 4) as u64;
            backend.write_buffer(
                self.altitudes,
                offset,
                bytemuck::cast_slice(&altitudes[row + start[1]..row + end[1]]),
            );
            backend.write_buffer(
                self.terrains,
                offset,
                bytemuck::cast_slice(&ordinals[row + start[1]..row + end[1]]),
            );
        }

        let dense = mesh::dense_range_for(&tiles, latitudes, longitudes);
        self.kernels.calculate_positions_and_normals(
            backend,
            &dense,
            self.sizes,
            self.altitudes,
            self.dense,
        );
        let affected = mesh::tile_range_for(&dense, latitudes, longitudes);
        self.kernels.load_vertex_buffers(
            backend,
            &affected,
            self.sizes,
            self.dense,
            self.terrains,
            self.streams,
        );
        log::debug!(
            "Refreshed tiles {:?}+{:?} ({:?}+{:?} rebuilt)",
            tiles.offset,
            tiles.size,
            affected.offset,
            affected.size
        );
    }

    pub fn vertex_array(&self) -> VertexArrayHandle {
        self.vertex_array
    }

    pub fn vertex_streams(&self) -> VertexStreams {
        self.streams
    }

    pub fn dense_buffers(&self) -> DenseBuffers {
        self.dense
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices
    }

    /// Release every device resource
    pub fn dispose<B: Backend + ?Sized>(self, backend: &mut B) {
        backend.release_buffer(self.altitudes);
        backend.release_buffer(self.terrains);
        backend.release_buffer(self.dense.positions);
        backend.release_buffer(self.dense.normals);
        backend.release_vertex_array(self.vertex_array);
        for texture in self.textures {
            backend.release_texture(texture);
        }
        self.kernels.release(backend);
        backend.release_program(self.program);
        log::info!("Terrain renderer disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_largest_maps_are_rejected() {
        let side = u16::MAX as usize;
        match mesh_vertices([side, side]) {
            Err(RendererError::MeshTooLarge {
                latitudinal,
                longitudinal,
            }) => assert_eq!((latitudinal, longitudinal), (side, side)),
            other => panic!("expected size error, got {:?}", other),
        }
        assert_eq!(mesh_vertices([10, 10]).unwrap(), 2400);
    }
}
