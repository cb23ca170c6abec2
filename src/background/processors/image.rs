//! Image processing module - decoding and measuring uploaded originals
//!
//! Includes:
//! - Image decoding
//! - Width/height calculation
//! - In-place thumbnail re-rendering

use anyhow::{Context, Result, bail};
use image::{DynamicImage, ImageFormat, imageops::FilterType};
use std::{fs::read, path::Path};

// ────────────────────────────────────────────────────────────────
// Public API
// ────────────────────────────────────────────────────────────────

/// Decode the persisted file and return the dimensions its tile should use.
///
/// With `thumbnail_size` set the file is re-rendered in place to exactly that
/// square and the square is returned instead of the natural size.
pub fn measure_image(path: &Path, thumbnail_size: Option<u32>) -> Result<(u32, u32)> {
    let file_in_memory =
        read(path).context(format!("failed to read file into memory: {:?}", path))?;
    let dynamic_image = generate_dynamic_image_from_memory(&file_in_memory)
        .context(format!("failed to decode image: {:?}", path))?;

    match thumbnail_size {
        Some(size) => {
            let format = ImageFormat::from_path(path)
                .or_else(|_| image::guess_format(&file_in_memory))
                .context(format!("failed to determine image format of {:?}", path))?;
            let thumbnail = generate_exact_thumbnail(&dynamic_image, size);
            save_in_format(thumbnail, path, format)?;
            Ok((size, size))
        }
        None => Ok(generate_image_width_height(&dynamic_image)),
    }
}

// ────────────────────────────────────────────────────────────────
// DynamicImage Generation
// ────────────────────────────────────────────────────────────────

pub fn generate_dynamic_image_from_path(file_path: &Path) -> Result<DynamicImage> {
    let file_in_memory =
        read(file_path).context(format!("failed to read file into memory: {:?}", file_path))?;
    generate_dynamic_image_from_memory(&file_in_memory)
        .context(format!("failed to decode image: {:?}", file_path))
}

pub fn generate_dynamic_image_from_memory(file_in_memory: &[u8]) -> Result<DynamicImage> {
    let decoders: Vec<fn(&[u8]) -> Result<DynamicImage>> = vec![image_crate_decoder];

    for decoder in decoders {
        match decoder(file_in_memory) {
            Ok(decoded_image) => return Ok(decoded_image),
            Err(_) => continue,
        }
    }

    bail!("all decoders failed ({} bytes)", file_in_memory.len());
}

fn image_crate_decoder(file_in_memory: &[u8]) -> Result<DynamicImage> {
    let dynamic_image = image::load_from_memory(file_in_memory)
        .context("image crate failed to decode image from memory")?;
    Ok(dynamic_image)
}

// ────────────────────────────────────────────────────────────────
// Width/Height Calculation
// ────────────────────────────────────────────────────────────────

/// Return `(width, height)` for an already-decoded image
pub fn generate_image_width_height(dynamic_image: &DynamicImage) -> (u32, u32) {
    (dynamic_image.width(), dynamic_image.height())
}

// ────────────────────────────────────────────────────────────────
// Thumbnail Generation
// ────────────────────────────────────────────────────────────────

/// Stretch to exactly `size`×`size`, ignoring aspect ratio.
pub fn generate_exact_thumbnail(dynamic_image: &DynamicImage, size: u32) -> DynamicImage {
    dynamic_image.resize_exact(size, size, FilterType::Triangle)
}

fn save_in_format(dynamic_image: DynamicImage, path: &Path, format: ImageFormat) -> Result<()> {
    // JPEG has no alpha channel
    let dynamic_image = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(dynamic_image.to_rgb8()),
        _ => dynamic_image,
    };
    dynamic_image
        .save_with_format(path, format)
        .context(format!("failed to re-render {:?} as {:?}", path, format))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_png(path: &Path, width: u32, height: u32) {
        RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]))
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn natural_size_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wide.png");
        write_png(&path, 37, 11);
        assert_eq!(measure_image(&path, None).unwrap(), (37, 11));
    }

    #[test]
    fn thumbnail_mode_rewrites_file_in_place() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("big.png");
        write_png(&path, 300, 90);

        assert_eq!(measure_image(&path, Some(120)).unwrap(), (120, 120));
        let reread = generate_dynamic_image_from_path(&path).unwrap();
        assert_eq!(generate_image_width_height(&reread), (120, 120));
    }

    #[test]
    fn thumbnail_mode_keeps_jpeg_as_jpeg() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        DynamicImage::ImageRgb8(image::RgbImage::new(64, 32))
            .save_with_format(&path, ImageFormat::Jpeg)
            .unwrap();

        assert_eq!(measure_image(&path, Some(16)).unwrap(), (16, 16));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn garbage_fails_to_measure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(measure_image(&path, None).is_err());
    }

    #[test]
    fn missing_file_fails_to_measure() {
        let dir = TempDir::new().unwrap();
        assert!(measure_image(&dir.path().join("nope.png"), Some(120)).is_err());
    }
}
