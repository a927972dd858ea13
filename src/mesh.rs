//! Terrain mesh geometry shared by the WGSL kernels and their CPU
//! counterparts.
//!
//! The mesh is built over a dense vertex lattice of `(2·lat + 1) × (2·lon + 1)`
//! points: tile corners, edge midpoints and tile centres. Dense vertex
//! `(i, j)` sits at `x = j/2`, `z = −i/2`. Each tile is drawn as a fan of eight
//! triangles around its centre, one per compass direction.

use glam::Vec3;

use crate::backend::{local_work_sizes, Definition, DeviceLimits, HostArgs, HostKernel, NdRange};

pub const CALCULATE_POSITIONS_AND_NORMALS: &str = "calculate_positions_and_normals";
pub const LOAD_VERTEX_BUFFERS: &str = "load_vertex_buffers";

pub const POSITION_COMPONENTS: u32 = 3;
pub const NORMAL_COMPONENTS: u32 = 3;
/// u, v, terrain layer
pub const TEXTURE_COMPONENTS: u32 = 3;

/// Kernel range axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coordinate {
    Latitude = 0,
    Longitude = 1,
}

/// Ring position around a tile centre, clockwise from north
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    North = 0,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// Dense-lattice offset (latitude, longitude) from the tile centre
    pub fn offset(self) -> [i32; 2] {
        match self {
            Direction::North => [1, 0],
            Direction::NorthEast => [1, 1],
            Direction::East => [0, 1],
            Direction::SouthEast => [-1, 1],
            Direction::South => [-1, 0],
            Direction::SouthWest => [-1, -1],
            Direction::West => [0, -1],
            Direction::NorthWest => [1, -1],
        }
    }

    pub fn next(self) -> Direction {
        Direction::ALL[(self as usize + 1) % Direction::ALL.len()]
    }

    fn constant_name(self) -> &'static str {
        match self {
            Direction::North => "NORTH",
            Direction::NorthEast => "NORTHEAST",
            Direction::East => "EAST",
            Direction::SouthEast => "SOUTHEAST",
            Direction::South => "SOUTH",
            Direction::SouthWest => "SOUTHWEST",
            Direction::West => "WEST",
            Direction::NorthWest => "NORTHWEST",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriangleVertex {
    V1 = 0,
    V2,
    V3,
}

impl TriangleVertex {
    pub const ALL: [TriangleVertex; 3] =
        [TriangleVertex::V1, TriangleVertex::V2, TriangleVertex::V3];
}

pub const DIRECTIONS: u32 = Direction::ALL.len() as u32;
pub const TRIANGLE_VERTICES: u32 = TriangleVertex::ALL.len() as u32;

/// Dense lattice extent (latitude, longitude)
pub fn dense_sizes(latitudinal_size: usize, longitudinal_size: usize) -> [u32; 2] {
    [
        2 * latitudinal_size as u32 + 1,
        2 * longitudinal_size as u32 + 1,
    ]
}

/// Vertices in each vertex stream, or `None` when the stream components
/// cannot be addressed with the kernels' 32-bit indices. The dense lattice is
/// always smaller than a vertex stream.
pub fn vertex_count(latitudinal_size: usize, longitudinal_size: usize) -> Option<u32> {
    let vertices = latitudinal_size
        .checked_mul(longitudinal_size)?
        .checked_mul((DIRECTIONS * TRIANGLE_VERTICES) as usize)?;
    let components = vertices.checked_mul(POSITION_COMPONENTS as usize)?;
    u32::try_from(components).ok()?;
    u32::try_from(vertices).ok()
}

/// Constants prepended to the kernel source
pub fn kernel_definitions(limits: &DeviceLimits) -> Vec<Definition> {
    let local = local_work_sizes(limits);
    let mut definitions = vec![
        Definition::u32("LATITUDE", Coordinate::Latitude as u32),
        Definition::u32("LONGITUDE", Coordinate::Longitude as u32),
    ];
    for direction in Direction::ALL {
        definitions.push(Definition::u32(direction.constant_name(), direction as u32));
    }
    definitions.push(Definition::u32("DIRECTIONS", DIRECTIONS));
    definitions.push(Definition::u32("V1", TriangleVertex::V1 as u32));
    definitions.push(Definition::u32("V2", TriangleVertex::V2 as u32));
    definitions.push(Definition::u32("V3", TriangleVertex::V3 as u32));
    definitions.push(Definition::u32("TRIANGLE_VERTICES", TRIANGLE_VERTICES));
    definitions.push(Definition::u32("COMPONENTS", POSITION_COMPONENTS));
    definitions.push(Definition::u32("WORKGROUP_LATITUDE", local[0]));
    definitions.push(Definition::u32("WORKGROUP_LONGITUDE", local[1]));
    definitions
}

/// Dense lattice geometry over a row-major altitude grid
#[derive(Debug, Clone, Copy)]
pub struct DenseGrid<'a> {
    altitudes: &'a [f32],
    latitudinal_size: usize,
    longitudinal_size: usize,
}

impl<'a> DenseGrid<'a> {
    pub fn new(altitudes: &'a [f32], latitudinal_size: usize, longitudinal_size: usize) -> Self {
        debug_assert_eq!(altitudes.len(), latitudinal_size * longitudinal_size);
        Self {
            altitudes,
            latitudinal_size,
            longitudinal_size,
        }
    }

    pub fn sizes(&self) -> [u32; 2] {
        dense_sizes(self.latitudinal_size, self.longitudinal_size)
    }

    fn tile_altitude(&self, latitude: i32, longitude: i32) -> f32 {
        let lat = latitude.clamp(0, self.latitudinal_size as i32 - 1) as usize;
        let lon = longitude.clamp(0, self.longitudinal_size as i32 - 1) as usize;
        self.altitudes[lat * self.longitudinal_size + lon]
    }

    /// Mean altitude of the tiles touching the vertex, clamped to the grid
    pub fn position(&self, i: i32, j: i32) -> Vec3 {
        let (south, north) = ((i - 1) >> 1, i >> 1);
        let (west, east) = ((j - 1) >> 1, j >> 1);
        let altitude = 0.25
            * (self.tile_altitude(south, west)
                + self.tile_altitude(south, east)
                + self.tile_altitude(north, west)
                + self.tile_altitude(north, east));
        Vec3::new(j as f32 * 0.5, altitude, -(i as f32) * 0.5)
    }

    /// Central-difference normal with neighbours clamped to the lattice
    pub fn normal(&self, i: i32, j: i32) -> Vec3 {
        let [rows, columns] = self.sizes().map(|size| size as i32);
        let east = self.position(i, (j + 1).min(columns - 1)) - self.position(i, (j - 1).max(0));
        let north = self.position((i + 1).min(rows - 1), j) - self.position((i - 1).max(0), j);
        east.cross(north).normalize()
    }
}

/// Dense lattice corners (latitude, longitude) of one fan triangle,
/// counter-clockwise seen from above
pub fn triangle_corners(latitude: usize, longitude: usize, direction: Direction) -> [[i32; 2]; 3] {
    let center = [2 * latitude as i32 + 1, 2 * longitude as i32 + 1];
    let step = |d: Direction| {
        let offset = d.offset();
        [center[0] + offset[0], center[1] + offset[1]]
    };
    [center, step(direction.next()), step(direction)]
}

pub fn triangle_index(
    latitude: usize,
    longitude: usize,
    longitudinal_size: usize,
    direction: Direction,
) -> usize {
    (latitude * longitudinal_size + longitude) * DIRECTIONS as usize + direction as usize
}

/// Dense vertices whose position or normal depends on a tile in `tiles`
pub fn dense_range_for(
    tiles: &NdRange,
    latitudinal_size: usize,
    longitudinal_size: usize,
) -> NdRange {
    let limits = dense_sizes(latitudinal_size, longitudinal_size);
    let mut offset = [0; 2];
    let mut size = [0; 2];
    for axis in 0..2 {
        // Altitudes reach [2·t0, 2·t1]; normals one vertex further
        let start = (2 * tiles.offset[axis]).saturating_sub(1);
        let end = (2 * (tiles.offset[axis] + tiles.size[axis]) + 2).min(limits[axis]);
        offset[axis] = start;
        size[axis] = end.saturating_sub(start);
    }
    NdRange::new(offset, size)
}

/// Tiles with at least one fan vertex in `dense`
pub fn tile_range_for(
    dense: &NdRange,
    latitudinal_size: usize,
    longitudinal_size: usize,
) -> NdRange {
    let limits = [latitudinal_size as u32, longitudinal_size as u32];
    let mut offset = [0; 2];
    let mut size = [0; 2];
    for axis in 0..2 {
        if dense.size[axis] == 0 {
            return NdRange::new(offset, [0, 0]);
        }
        let start = dense.offset[axis].saturating_sub(1) / 2;
        let end = ((dense.offset[axis] + dense.size[axis] - 1) / 2 + 1).min(limits[axis]);
        offset[axis] = start;
        size[axis] = end.saturating_sub(start);
    }
    NdRange::new(offset, size)
}

/// Host kernels keyed by entry point name
pub fn host_kernels() -> [(&'static str, HostKernel); 2] {
    [
        (CALCULATE_POSITIONS_AND_NORMALS, calculate_positions_and_normals),
        (LOAD_VERTEX_BUFFERS, load_vertex_buffers),
    ]
}

/// Scalars: latitudinal size, longitudinal size.
/// Buffers: altitudes, dense positions, dense normals.
fn calculate_positions_and_normals(id: [u32; 2], args: &mut HostArgs) {
    let range = args.range;
    if id[0] >= range.size[0] || id[1] >= range.size[1] {
        return;
    }
    let (latitudinal_size, longitudinal_size) = (args.int(0) as usize, args.int(1) as usize);
    let i = range.offset[0] + id[0];
    let j = range.offset[1] + id[1];
    let [rows, columns] = dense_sizes(latitudinal_size, longitudinal_size);
    if i >= rows || j >= columns {
        return;
    }

    let grid = DenseGrid::new(args.floats(0), latitudinal_size, longitudinal_size);
    let position = grid.position(i as i32, j as i32);
    let normal = grid.normal(i as i32, j as i32);

    let index = (i * columns + j) as usize * 3;
    for (c, (p, n)) in position.to_array().into_iter().zip(normal.to_array()).enumerate() {
        args.write_f32(1, index + c, p);
        args.write_f32(2, index + c, n);
    }
}

/// Scalars: latitudinal size, longitudinal size.
/// Buffers: dense positions, dense normals, terrain ordinals, then the
/// position, normal and texture vertex streams.
fn load_vertex_buffers(id: [u32; 2], args: &mut HostArgs) {
    let range = args.range;
    if id[0] >= range.size[0] || id[1] >= range.size[1] {
        return;
    }
    let (latitudinal_size, longitudinal_size) = (args.int(0) as usize, args.int(1) as usize);
    let latitude = (range.offset[0] + id[0]) as usize;
    let longitude = (range.offset[1] + id[1]) as usize;
    if latitude >= latitudinal_size || longitude >= longitudinal_size {
        return;
    }

    let columns = dense_sizes(latitudinal_size, longitudinal_size)[1] as usize;
    let layer = args.read_u32(2, latitude * longitudinal_size + longitude) as f32;
    for direction in Direction::ALL {
        let triangle = triangle_index(latitude, longitude, longitudinal_size, direction);
        let corners = triangle_corners(latitude, longitude, direction);
        for (v, [i, j]) in corners.into_iter().enumerate() {
            let source = (i as usize * columns + j as usize) * 3;
            let target = (triangle * TRIANGLE_VERTICES as usize + v) * 3;
            for c in 0..3 {
                let position = args.read_f32(0, source + c);
                let normal = args.read_f32(1, source + c);
                args.write_f32(3, target + c, position);
                args.write_f32(4, target + c, normal);
            }
            args.write_f32(5, target, j as f32 * 0.5);
            args.write_f32(5, target + 1, i as f32 * 0.5);
            args.write_f32(5, target + 2, layer);
        }
    }
}
