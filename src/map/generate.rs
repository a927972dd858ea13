//! Procedural maps from layered Perlin noise.

use noise::{NoiseFn, Perlin};

use super::{Map, Terrain, Tile};
use crate::error::MapError;
use crate::params::TerrainGeneration;

impl Map {
    /// Generate a map whose altitudes follow Perlin noise and whose terrain is
    /// chosen from altitude bands. Lava is never generated.
    pub fn generate(
        latitudinal_size: usize,
        longitudinal_size: usize,
        params: &TerrainGeneration,
    ) -> Result<Map, MapError> {
        let mut map = Map::new(latitudinal_size, longitudinal_size, Terrain::Water)?;

        let elevation = Perlin::new(params.seed);
        // Offset seed so moisture is decorrelated from elevation
        let moisture = Perlin::new(params.seed.wrapping_add(1));

        for latitude in 0..latitudinal_size {
            for longitude in 0..longitudinal_size {
                let sample = [
                    latitude as f64 * params.frequency,
                    longitude as f64 * params.frequency,
                ];
                let height = elevation.get(sample) as f32;
                let wetness = moisture.get([sample[0] + 17.0, sample[1] - 31.0]) as f32;

                let terrain = classify(height, wetness, params);
                // Water surfaces are flat at sea level
                let altitude = height.max(params.sea_level) * params.amplitude;

                map.set_tile(latitude, longitude, Tile::new(altitude, terrain))?;
            }
        }

        log::info!(
            "Generated {}x{} map (seed {})",
            latitudinal_size,
            longitudinal_size,
            params.seed
        );
        Ok(map)
    }
}

/// Pick a terrain for a normalized height in [-1, 1]
fn classify(height: f32, wetness: f32, params: &TerrainGeneration) -> Terrain {
    if height < params.sea_level {
        Terrain::Water
    } else if height < params.sea_level + params.beach_width {
        Terrain::Sand
    } else if height < params.snow_line * 0.45 {
        Terrain::Grass
    } else if height < params.snow_line * 0.7 {
        if wetness > 0.0 {
            Terrain::Mud
        } else {
            Terrain::Dirt
        }
    } else if height < params.snow_line {
        Terrain::Rock
    } else {
        Terrain::Ice
    }
}
