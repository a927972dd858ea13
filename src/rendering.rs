//! Terrain rendering: the mesh kernel program, terrain textures and the
//! renderer that owns a map's device resources.
//!
//! Construction runs two kernel passes over the map. The first computes a
//! position and normal for every dense lattice vertex; the second fans each
//! tile into eight triangles and writes them straight into the vertex buffers
//! drawn by the terrain program.

mod kernels;
mod terrain;
mod textures;

pub use kernels::{DenseBuffers, MeshKernels, VertexStreams};
pub use terrain::TerrainRenderer;
pub use textures::{load_terrain_textures, mip_chain};
