//! Terrain texture loading and CPU mip chains.

use std::path::Path;

use image::imageops::FilterType;
use image::RgbaImage;

use crate::backend::TextureData;
use crate::error::{RendererError, RendererResult};
use crate::map::Terrain;

/// Load one texture per terrain, in ordinal order. Every layer is resized to
/// the size of the first so they fit one texture array.
pub fn load_terrain_textures(assets_dir: &Path) -> RendererResult<Vec<TextureData>> {
    let mut images: Vec<RgbaImage> = Vec::with_capacity(Terrain::ALL.len());
    for terrain in Terrain::ALL {
        let path = assets_dir.join(terrain.texture());
        let image = image::open(&path)
            .map_err(|source| RendererError::Texture {
                path: path.clone(),
                source,
            })?
            .to_rgba8();
        log::info!(
            "Loaded texture {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        images.push(image);
    }

    let (width, height) = images[0].dimensions();
    Ok(Terrain::ALL
        .iter()
        .zip(images)
        .map(|(terrain, image)| {
            let image = if image.dimensions() != (width, height) {
                log::warn!(
                    "Texture for {} is {}x{}, resizing to {}x{}",
                    terrain,
                    image.width(),
                    image.height(),
                    width,
                    height
                );
                image::imageops::resize(&image, width, height, FilterType::Triangle)
            } else {
                image
            };
            TextureData {
                label: terrain.name().to_string(),
                levels: mip_chain(image),
            }
        })
        .collect())
}

/// Full mip chain, halving each level down to 1x1
pub fn mip_chain(base: RgbaImage) -> Vec<RgbaImage> {
    let mut levels = vec![base];
    loop {
        let (width, height) = levels[levels.len() - 1].dimensions();
        if width <= 1 && height <= 1 {
            break;
        }
        let next = image::imageops::resize(
            &levels[levels.len() - 1],
            (width / 2).max(1),
            (height / 2).max(1),
            FilterType::Triangle,
        );
        levels.push(next);
    }
    levels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_chain_of_rectangle() {
        let levels = mip_chain(RgbaImage::new(8, 2));
        let sizes: Vec<(u32, u32)> = levels.iter().map(|l| l.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn test_mip_chain_keeps_colour() {
        let levels = mip_chain(RgbaImage::from_pixel(4, 4, image::Rgba([200, 100, 50, 255])));
        assert_eq!(levels.len(), 3);
        assert_eq!(levels[2].get_pixel(0, 0), &image::Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn test_missing_texture_names_path() {
        let dir = tempfile::tempdir().unwrap();
        match load_terrain_textures(dir.path()) {
            Err(RendererError::Texture { path, .. }) => {
                assert!(path.ends_with("terrains/dirt.png"), "got {}", path.display());
            }
            other => panic!("expected texture error, got {:?}", other.map(|t| t.len())),
        }
    }

    #[test]
    fn test_layers_share_one_size() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("terrains")).unwrap();
        for (index, terrain) in Terrain::ALL.iter().enumerate() {
            let size = if index == 3 { 8 } else { 4 };
            RgbaImage::new(size, size)
                .save(dir.path().join(terrain.texture()))
                .unwrap();
        }

        let textures = load_terrain_textures(dir.path()).unwrap();
        assert_eq!(textures.len(), Terrain::ALL.len());
        for texture in &textures {
            assert_eq!(texture.levels[0].dimensions(), (4, 4));
            assert_eq!(texture.levels.len(), 3);
        }
        assert_eq!(textures[6].label, "sand");
    }
}
