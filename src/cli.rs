//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{ConfigError, MapError};
use crate::map::{Map, Terrain};
use crate::params::{Configuration, TerrainGeneration};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "botcraft")]
#[command(about = "Terrain map viewer with GPU mesh synthesis", long_about = None)]
pub struct Args {
    /// Map document to load
    #[arg(long, value_name = "FILE", conflicts_with = "generate")]
    pub map: Option<PathBuf>,

    /// Size of a new uniform map
    #[arg(long, value_name = "LATxLON", value_parser = parse_size, default_value = "64x64")]
    pub size: (usize, usize),

    /// Terrain of a new uniform map
    #[arg(long, value_name = "NAME", default_value = "grass")]
    pub terrain: Terrain,

    /// Generate a procedural map of the given size from this seed
    #[arg(long, value_name = "SEED")]
    pub generate: Option<u32>,

    /// Write the map to this file before viewing it
    #[arg(long, value_name = "FILE")]
    pub save: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Print every graphics adapter and whether it can be used, then exit
    #[arg(long)]
    pub list_devices: bool,

    /// Build the mesh on the CPU back end, log statistics and exit
    #[arg(long)]
    pub headless: bool,
}

/// Where the map comes from
#[derive(Debug, Clone, PartialEq)]
pub enum MapSource {
    File(PathBuf),
    Uniform {
        size: (usize, usize),
        terrain: Terrain,
    },
    Generated {
        size: (usize, usize),
        seed: u32,
    },
}

impl MapSource {
    pub fn build(&self, generation: &TerrainGeneration) -> Result<Map, MapError> {
        match self {
            MapSource::File(path) => Map::load(path),
            MapSource::Uniform { size, terrain } => Map::new(size.0, size.1, *terrain),
            MapSource::Generated { size, seed } => {
                let params = TerrainGeneration {
                    seed: *seed,
                    ..generation.clone()
                };
                Map::generate(size.0, size.1, &params)
            }
        }
    }
}

impl Args {
    pub fn map_source(&self) -> MapSource {
        if let Some(path) = &self.map {
            MapSource::File(path.clone())
        } else if let Some(seed) = self.generate {
            MapSource::Generated {
                size: self.size,
                seed,
            }
        } else {
            MapSource::Uniform {
                size: self.size,
                terrain: self.terrain,
            }
        }
    }

    /// Configuration file contents, or the defaults without `--config`.
    /// Out-of-range values are replaced on either path.
    pub fn configuration(&self) -> Result<Configuration, ConfigError> {
        let config = match &self.config {
            Some(path) => Configuration::load(path)?,
            None => Configuration::default(),
        };
        Ok(config.sanitized())
    }
}

/// Parse `LATxLON`, e.g. `32x48`
fn parse_size(text: &str) -> Result<(usize, usize), String> {
    let (latitude, longitude) = text
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected LATxLON, got '{}'", text))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<usize>()
            .map_err(|e| format!("invalid size '{}': {}", value, e))
    };
    Ok((parse(latitude)?, parse(longitude)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("10x12"), Ok((10, 12)));
        assert_eq!(parse_size("3X4"), Ok((3, 4)));
        assert!(parse_size("10").is_err());
        assert!(parse_size("ax4").is_err());
    }

    #[test]
    fn test_default_source_is_uniform() {
        let args = Args::parse_from(["botcraft"]);
        assert_eq!(
            args.map_source(),
            MapSource::Uniform {
                size: (64, 64),
                terrain: Terrain::Grass,
            }
        );
        assert!(!args.headless);
    }

    #[test]
    fn test_generate_source() {
        let args = Args::parse_from(["botcraft", "--generate", "7", "--size", "8x9"]);
        assert_eq!(
            args.map_source(),
            MapSource::Generated {
                size: (8, 9),
                seed: 7,
            }
        );
        let map = args.map_source().build(&TerrainGeneration::default()).unwrap();
        assert_eq!(map.latitudinal_size(), 8);
        assert_eq!(map.longitudinal_size(), 9);
    }

    #[test]
    fn test_map_conflicts_with_generate() {
        let result = Args::try_parse_from(["botcraft", "--map", "a.json", "--generate", "1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_uniform_terrain_by_name() {
        let args = Args::parse_from(["botcraft", "--size", "2x3", "--terrain", "rock"]);
        let map = args.map_source().build(&TerrainGeneration::default()).unwrap();
        assert!(map.tiles().iter().all(|tile| tile.terrain == Terrain::Rock));
    }

    #[test]
    fn test_configuration_is_sanitized_on_both_paths() {
        let defaults = Args::parse_from(["botcraft"]).configuration().unwrap();
        assert_eq!(defaults, defaults.sanitized());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("botcraft.json");
        std::fs::write(
            &path,
            r#"{ "graphics": { "sample_buffers": 64 }, "camera": { "distance_min": -1.0 } }"#,
        )
        .unwrap();
        let path = path.to_string_lossy().into_owned();
        let loaded = Args::parse_from(["botcraft", "--config", path.as_str()])
            .configuration()
            .unwrap();
        assert_eq!(loaded.graphics.sample_buffers, crate::params::MAX_SAMPLE_BUFFERS);
        assert_eq!(loaded.camera, crate::params::CameraParams::default());
        assert_eq!(loaded, loaded.sanitized());
    }

    #[test]
    fn test_zero_size_is_rejected_by_map() {
        let args = Args::parse_from(["botcraft", "--size", "0x3"]);
        assert!(matches!(
            args.map_source().build(&TerrainGeneration::default()),
            Err(MapError::NonPositiveSize { .. })
        ));
    }
}
