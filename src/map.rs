//! Terrain grid: a row-major 2D grid of altitude/terrain tiles.
//!
//! The grid size is fixed at construction; individual tiles may be edited in
//! place. Tile `(latitude, longitude)` is stored at
//! `latitude * longitudinal_size + longitude`.

mod format;
mod generate;
mod tile;

use std::path::Path;

pub use tile::{Terrain, Tile};

use crate::error::{FormatError, MapError};

/// Terrain grid
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    latitudinal_size: usize,
    longitudinal_size: usize,
    tiles: Vec<Tile>,
}

impl Map {
    /// Create a map filled with `terrain` at altitude 0
    pub fn new(
        latitudinal_size: usize,
        longitudinal_size: usize,
        terrain: Terrain,
    ) -> Result<Self, MapError> {
        if latitudinal_size == 0 {
            return Err(MapError::NonPositiveSize {
                axis: "Latitudinal",
            });
        }
        if longitudinal_size == 0 {
            return Err(MapError::NonPositiveSize {
                axis: "Longitudinal",
            });
        }

        Ok(Self {
            latitudinal_size,
            longitudinal_size,
            tiles: vec![Tile::new(0.0, terrain); latitudinal_size * longitudinal_size],
        })
    }

    pub fn latitudinal_size(&self) -> usize {
        self.latitudinal_size
    }

    pub fn longitudinal_size(&self) -> usize {
        self.longitudinal_size
    }

    /// All tiles in row-major order
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tile(&self, latitude: usize, longitude: usize) -> Result<&Tile, MapError> {
        let index = self.index(latitude, longitude)?;
        Ok(&self.tiles[index])
    }

    pub fn set_tile(
        &mut self,
        latitude: usize,
        longitude: usize,
        tile: Tile,
    ) -> Result<(), MapError> {
        let index = self.index(latitude, longitude)?;
        self.tiles[index] = tile;
        Ok(())
    }

    /// Altitudes in row-major order, as uploaded to the compute device
    pub fn altitudes(&self) -> Vec<f32> {
        self.tiles.iter().map(|tile| tile.altitude).collect()
    }

    /// Terrain texture layers in row-major order
    pub fn terrain_ordinals(&self) -> Vec<u32> {
        self.tiles.iter().map(|tile| tile.terrain.ordinal()).collect()
    }

    /// Decode a map document
    pub fn from_json(text: &str) -> Result<Self, FormatError> {
        format::decode(text)
    }

    /// Encode as a map document
    pub fn to_json(&self) -> Result<String, FormatError> {
        format::encode(self)
    }

    /// Load a map document from disk
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MapError> {
        let path = path.as_ref();
        let load_error = |source: FormatError| MapError::Load {
            path: path.to_path_buf(),
            source,
        };

        let text = std::fs::read_to_string(path).map_err(|e| load_error(e.into()))?;
        let map = Self::from_json(&text).map_err(load_error)?;

        log::info!(
            "Loaded {}x{} map from {}",
            map.latitudinal_size,
            map.longitudinal_size,
            path.display()
        );
        Ok(map)
    }

    /// Write the map document to disk
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MapError> {
        let path = path.as_ref();
        let save_error = |source: FormatError| MapError::Save {
            path: path.to_path_buf(),
            source,
        };

        let text = self.to_json().map_err(save_error)?;
        std::fs::write(path, text).map_err(|e| save_error(e.into()))?;

        log::info!("Saved map to {}", path.display());
        Ok(())
    }

    fn index(&self, latitude: usize, longitude: usize) -> Result<usize, MapError> {
        if latitude >= self.latitudinal_size {
            return Err(MapError::OutOfRange {
                axis: "Latitude",
                limit: self.latitudinal_size,
                value: latitude,
            });
        }
        if longitude >= self.longitudinal_size {
            return Err(MapError::OutOfRange {
                axis: "Longitude",
                limit: self.longitudinal_size,
                value: longitude,
            });
        }
        Ok(latitude * self.longitudinal_size + longitude)
    }
}
