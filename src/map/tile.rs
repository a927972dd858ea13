//! Tile and terrain kinds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Terrain kinds. Ordinal order matches the texture array layers bound to the
/// terrain shader, so variants must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Dirt,
    Grass,
    Ice,
    Lava,
    Mud,
    Rock,
    Sand,
    Water,
}

impl Terrain {
    /// Every terrain, in ordinal order
    pub const ALL: [Terrain; 8] = [
        Terrain::Dirt,
        Terrain::Grass,
        Terrain::Ice,
        Terrain::Lava,
        Terrain::Mud,
        Terrain::Rock,
        Terrain::Sand,
        Terrain::Water,
    ];

    /// Layer index in the terrain texture array
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    pub fn name(self) -> &'static str {
        match self {
            Terrain::Dirt => "dirt",
            Terrain::Grass => "grass",
            Terrain::Ice => "ice",
            Terrain::Lava => "lava",
            Terrain::Mud => "mud",
            Terrain::Rock => "rock",
            Terrain::Sand => "sand",
            Terrain::Water => "water",
        }
    }

    /// Texture path relative to the assets directory
    pub fn texture(self) -> String {
        format!("terrains/{}.png", self.name())
    }
}

impl fmt::Display for Terrain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Terrain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        Terrain::ALL
            .into_iter()
            .find(|terrain| terrain.name() == wanted)
            .ok_or_else(|| format!("unknown terrain '{}'", s))
    }
}

/// One grid cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tile {
    /// Height above the reference plane (map units, unbounded)
    pub altitude: f32,

    pub terrain: Terrain,
}

impl Tile {
    pub fn new(altitude: f32, terrain: Terrain) -> Self {
        Self { altitude, terrain }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_follow_declaration_order() {
        for (index, terrain) in Terrain::ALL.iter().enumerate() {
            assert_eq!(terrain.ordinal() as usize, index);
        }
        assert_eq!(Terrain::Rock.ordinal(), 5);
    }

    #[test]
    fn test_texture_paths() {
        assert_eq!(Terrain::Water.texture(), "terrains/water.png");
        assert_eq!(Terrain::Dirt.texture(), "terrains/dirt.png");
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("ROCK".parse::<Terrain>(), Ok(Terrain::Rock));
        assert_eq!("lava".parse::<Terrain>(), Ok(Terrain::Lava));
        assert!("marble".parse::<Terrain>().is_err());
    }
}
