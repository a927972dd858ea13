//! Persisted map document.
//!
//! ```json
//! {
//!   "latitudinalSize": 2,
//!   "longitudinalSize": 3,
//!   "tiles": [{ "altitude": 0.0, "terrain": "rock" }, ...]
//! }
//! ```
//!
//! Sizes are unsigned 16-bit values. Unknown top-level fields are reported as
//! warnings and otherwise ignored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Map, Tile};
use crate::error::FormatError;

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MapDocument {
    latitudinal_size: u16,
    longitudinal_size: u16,
    tiles: Vec<Tile>,
    #[serde(flatten)]
    extra: BTreeMap<String, serde_json::Value>,
}

pub(super) fn decode(text: &str) -> Result<Map, FormatError> {
    let document: MapDocument = serde_json::from_str(text)?;

    for key in document.extra.keys() {
        log::warn!("Ignoring unknown map field '{}'", key);
    }

    if document.latitudinal_size == 0 {
        return Err(FormatError::ZeroSize { axis: "Latitudinal" });
    }
    if document.longitudinal_size == 0 {
        return Err(FormatError::ZeroSize {
            axis: "Longitudinal",
        });
    }

    let expected = document.latitudinal_size as usize * document.longitudinal_size as usize;
    if document.tiles.len() != expected {
        return Err(FormatError::TileCount {
            expected,
            found: document.tiles.len(),
        });
    }

    Ok(Map {
        latitudinal_size: document.latitudinal_size as usize,
        longitudinal_size: document.longitudinal_size as usize,
        tiles: document.tiles,
    })
}

pub(super) fn encode(map: &Map) -> Result<String, FormatError> {
    let latitudinal_size =
        u16::try_from(map.latitudinal_size).map_err(|_| FormatError::SizeOverflow {
            axis: "Latitudinal",
            size: map.latitudinal_size,
        })?;
    let longitudinal_size =
        u16::try_from(map.longitudinal_size).map_err(|_| FormatError::SizeOverflow {
            axis: "Longitudinal",
            size: map.longitudinal_size,
        })?;

    let document = MapDocument {
        latitudinal_size,
        longitudinal_size,
        tiles: map.tiles.clone(),
        extra: BTreeMap::new(),
    };
    Ok(serde_json::to_string_pretty(&document)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::Terrain;

    #[test]
    fn test_decode_minimal_document() {
        let text = r#"{
            "latitudinalSize": 1,
            "longitudinalSize": 2,
            "tiles": [
                { "altitude": 1.5, "terrain": "grass" },
                { "altitude": -2.0, "terrain": "water" }
            ]
        }"#;
        let map = decode(text).unwrap();
        assert_eq!(map.latitudinal_size(), 1);
        assert_eq!(map.longitudinal_size(), 2);
        assert_eq!(map.tile(0, 1).unwrap(), &Tile::new(-2.0, Terrain::Water));
    }

    #[test]
    fn test_unknown_fields_are_not_fatal() {
        let text = r#"{
            "latitudinalSize": 1,
            "longitudinalSize": 1,
            "tiles": [{ "altitude": 0.0, "terrain": "ice" }],
            "author": "someone"
        }"#;
        assert!(decode(text).is_ok());
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let text = r#"{ "latitudinalSize": 1, "tiles": [] }"#;
        assert!(matches!(decode(text), Err(FormatError::Json(_))));
    }

    #[test]
    fn test_unknown_terrain_is_an_error() {
        let text = r#"{
            "latitudinalSize": 1,
            "longitudinalSize": 1,
            "tiles": [{ "altitude": 0.0, "terrain": "marble" }]
        }"#;
        assert!(matches!(decode(text), Err(FormatError::Json(_))));
    }

    #[test]
    fn test_size_beyond_sixteen_bits_is_an_error() {
        let text = r#"{ "latitudinalSize": 70000, "longitudinalSize": 1, "tiles": [] }"#;
        assert!(matches!(decode(text), Err(FormatError::Json(_))));
    }

    #[test]
    fn test_zero_size_is_an_error() {
        let text = r#"{ "latitudinalSize": 0, "longitudinalSize": 1, "tiles": [] }"#;
        assert!(matches!(decode(text), Err(FormatError::ZeroSize { .. })));
    }

    #[test]
    fn test_tile_count_mismatch_for_any_difference() {
        for count in [0usize, 1, 3, 5, 9] {
            let tiles = vec![r#"{ "altitude": 0.0, "terrain": "mud" }"#; count].join(",");
            let text = format!(
                r#"{{ "latitudinalSize": 2, "longitudinalSize": 2, "tiles": [{}] }}"#,
                tiles
            );
            match decode(&text) {
                Err(FormatError::TileCount { expected, found }) => {
                    assert_eq!(expected, 4);
                    assert_eq!(found, count);
                }
                other => panic!(
                    "expected tile count error for {} tiles, got {:?}",
                    count,
                    other.map(|_| ())
                ),
            }
        }
    }
}
