//! Tile composition - turns a fully resolved slot array into the photostrip
//!
//! Tiles are laid out left to right in slot order. Empty space, either from a
//! smaller natural-size image or a placeholder slot, stays fully transparent.

use anyhow::{Context, Result, anyhow, bail, ensure};
use image::{DynamicImage, ImageFormat, RgbaImage, imageops};
use log::warn;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::fs;
use std::path::Path;
use uuid::Uuid;

use super::folder::clean_path;
use super::image::{generate_dynamic_image_from_path, generate_exact_thumbnail};
use crate::background::types::ImageOutcome;
use crate::common::WORKER_RAYON_POOL;
use crate::config::{AppConfig, FailurePolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLayout {
    /// Every tile is forced to `size`×`size`.
    Thumbnail { size: u32 },
    /// Every tile box is the per-axis maximum of the measured images.
    Natural,
}

impl From<&AppConfig> for TileLayout {
    fn from(config: &AppConfig) -> Self {
        if config.use_thumbnail_sizes {
            TileLayout::Thumbnail {
                size: config.thumbnail_size,
            }
        } else {
            TileLayout::Natural
        }
    }
}

/// Canvas geometry for one strip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles: u32,
}

impl TilePlan {
    /// `None` when the strip is wider than `u32::MAX`.
    pub fn checked_canvas_width(&self) -> Option<u32> {
        self.tile_width.checked_mul(self.tiles)
    }

    pub fn canvas_width(&self) -> u32 {
        self.tile_width.saturating_mul(self.tiles)
    }

    pub fn canvas_height(&self) -> u32 {
        self.tile_height
    }

    /// Left edge of the tile for slot `index`.
    pub fn tile_x(&self, index: usize) -> i64 {
        index as i64 * self.tile_width as i64
    }
}

/// What ended up on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Composition {
    pub width: u32,
    pub height: u32,
    /// Slots rendered as transparent placeholders.
    pub failed: Vec<usize>,
}

/// Work out tile and canvas sizes, honouring the failure policy.
///
/// Refuses canvases of more than `max_pixels` pixels.
pub fn plan_tiles(
    outcomes: &[ImageOutcome],
    layout: TileLayout,
    policy: FailurePolicy,
    max_pixels: u64,
) -> Result<TilePlan> {
    if outcomes.is_empty() {
        bail!("cannot compose an empty batch");
    }
    if policy == FailurePolicy::Abort {
        if let Some((index, ImageOutcome::Failed { name, reason })) =
            outcomes.iter().enumerate().find(|(_, o)| o.is_failed())
        {
            bail!("slot {} ({}) failed: {}", index, name, reason);
        }
    }

    let measured: Vec<_> = outcomes.iter().filter_map(ImageOutcome::measured).collect();
    if measured.is_empty() {
        bail!("no image in the batch could be measured");
    }

    let (tile_width, tile_height) = match layout {
        TileLayout::Thumbnail { size } => (size, size),
        TileLayout::Natural => (
            measured.iter().map(|i| i.width).max().unwrap_or_default(),
            measured.iter().map(|i| i.height).max().unwrap_or_default(),
        ),
    };
    if tile_width == 0 || tile_height == 0 {
        bail!("measured images have no area ({}x{})", tile_width, tile_height);
    }

    let tiles = u32::try_from(outcomes.len()).context("too many tiles")?;
    let plan = TilePlan {
        tile_width,
        tile_height,
        tiles,
    };
    let canvas_width = plan
        .checked_canvas_width()
        .ok_or_else(|| anyhow!("{} tiles of width {} overflow the canvas", tiles, tile_width))?;
    let pixels = u64::from(canvas_width) * u64::from(tile_height);
    ensure!(
        pixels <= max_pixels,
        "{}x{} canvas exceeds the limit of {} pixels",
        canvas_width,
        tile_height,
        max_pixels
    );
    Ok(plan)
}

/// Compose the strip from the originals in `upload_dir` and write it to `dest`.
///
/// The PNG is encoded into a temporary file next to `dest` and renamed over it,
/// so readers only ever see a complete photostrip.
pub fn compose_photostrip(
    outcomes: &[ImageOutcome],
    layout: TileLayout,
    policy: FailurePolicy,
    max_pixels: u64,
    upload_dir: &Path,
    dest: &Path,
) -> Result<Composition> {
    let plan = plan_tiles(outcomes, layout, policy, max_pixels)?;

    let tiles: Vec<Option<Result<DynamicImage>>> = WORKER_RAYON_POOL.install(|| {
        outcomes
            .par_iter()
            .map(|outcome| {
                outcome
                    .measured()
                    .map(|image| load_tile(&clean_path(upload_dir, &image.name), layout))
            })
            .collect()
    });

    let mut canvas = RgbaImage::new(plan.canvas_width(), plan.canvas_height());
    let mut failed = Vec::new();
    for (index, tile) in tiles.into_iter().enumerate() {
        match tile {
            Some(Ok(tile)) => {
                // an original replaced since it was measured must stay inside its box
                let tile = tile.to_rgba8();
                let tile =
                    imageops::crop_imm(&tile, 0, 0, plan.tile_width, plan.tile_height).to_image();
                imageops::overlay(&mut canvas, &tile, plan.tile_x(index), 0);
            }
            Some(Err(error)) if policy == FailurePolicy::Placeholder => {
                warn!("Slot {} left blank: {:#}", index, error);
                failed.push(index);
            }
            Some(Err(error)) => {
                return Err(error.context(format!("failed to load tile for slot {}", index)));
            }
            None => failed.push(index),
        }
    }

    write_atomically(&canvas, dest)?;

    Ok(Composition {
        width: plan.canvas_width(),
        height: plan.canvas_height(),
        failed,
    })
}

fn load_tile(path: &Path, layout: TileLayout) -> Result<DynamicImage> {
    let dynamic_image = generate_dynamic_image_from_path(path)?;
    Ok(match layout {
        TileLayout::Thumbnail { size }
            if dynamic_image.width() != size || dynamic_image.height() != size =>
        {
            generate_exact_thumbnail(&dynamic_image, size)
        }
        _ => dynamic_image,
    })
}

fn write_atomically(canvas: &RgbaImage, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| anyhow!("failed to determine parent directory of {:?}", dest))?;
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = parent.join(format!("{}.{}.tmp", file_name, Uuid::new_v4()));

    let written = canvas
        .save_with_format(&tmp_path, ImageFormat::Png)
        .context(format!("failed to encode photostrip to {:?}", tmp_path))
        .and_then(|_| {
            fs::rename(&tmp_path, dest)
                .context(format!("failed to move {:?} over {:?}", tmp_path, dest))
        });

    if written.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    written
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background::types::ProcessedImage;
    use crate::common::DEFAULT_MAX_CANVAS_PIXELS;
    use image::Rgba;
    use tempfile::TempDir;

    const NO_LIMIT: u64 = u64::MAX;

    fn measured(name: &str, width: u32, height: u32) -> ImageOutcome {
        ImageOutcome::Measured(ProcessedImage {
            name: name.to_string(),
            width,
            height,
        })
    }

    fn failed(name: &str) -> ImageOutcome {
        ImageOutcome::Failed {
            name: name.to_string(),
            reason: "decode error".to_string(),
        }
    }

    fn natural_plan(outcomes: &[ImageOutcome]) -> Result<TilePlan> {
        plan_tiles(outcomes, TileLayout::Natural, FailurePolicy::Placeholder, NO_LIMIT)
    }

    fn write_solid(dir: &Path, name: &str, width: u32, height: u32, color: [u8; 4]) {
        RgbaImage::from_pixel(width, height, Rgba(color))
            .save_with_format(dir.join(name), ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn natural_plan_uses_per_axis_maxima() {
        let outcomes = vec![
            measured("a.png", 10, 40),
            measured("b.png", 30, 5),
            measured("c.png", 20, 20),
            measured("d.png", 1, 1),
        ];
        let plan = natural_plan(&outcomes).unwrap();
        assert_eq!((plan.tile_width, plan.tile_height), (30, 40));
        assert_eq!((plan.canvas_width(), plan.canvas_height()), (120, 40));
    }

    #[test]
    fn thumbnail_plan_ignores_natural_sizes() {
        let outcomes = vec![measured("a.png", 999, 3), measured("b.png", 4, 4)];
        let plan = plan_tiles(
            &outcomes,
            TileLayout::Thumbnail { size: 120 },
            FailurePolicy::Placeholder,
            NO_LIMIT,
        )
        .unwrap();
        assert_eq!((plan.canvas_width(), plan.canvas_height()), (240, 120));
    }

    #[test]
    fn failed_slots_do_not_widen_natural_tiles() {
        let outcomes = vec![measured("a.png", 8, 8), failed("b.png")];
        let plan = natural_plan(&outcomes).unwrap();
        assert_eq!((plan.tile_width, plan.tile_height), (8, 8));
        assert_eq!(plan.canvas_width(), 16);
    }

    #[test]
    fn abort_policy_rejects_any_failure() {
        let outcomes = vec![measured("a.png", 8, 8), failed("b.png")];
        let error =
            plan_tiles(&outcomes, TileLayout::Natural, FailurePolicy::Abort, NO_LIMIT).unwrap_err();
        assert!(error.to_string().contains("slot 1"));
    }

    #[test]
    fn all_failed_cannot_be_composed() {
        let outcomes = vec![failed("a.png"), failed("b.png")];
        assert!(natural_plan(&outcomes).is_err());
    }

    #[test]
    fn tiles_follow_slot_order_with_transparent_padding() {
        let dir = TempDir::new().unwrap();
        write_solid(dir.path(), "red.png", 4, 6, [255, 0, 0, 255]);
        write_solid(dir.path(), "green.png", 2, 2, [0, 255, 0, 255]);
        let dest = dir.path().join("photostrip.png");

        let outcomes = vec![measured("red.png", 4, 6), measured("green.png", 2, 2)];
        let composition = compose_photostrip(
            &outcomes,
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();
        assert_eq!((composition.width, composition.height), (8, 6));
        assert!(composition.failed.is_empty());

        let strip = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(strip.dimensions(), (8, 6));
        assert_eq!(strip.get_pixel(0, 0), &Rgba([255, 0, 0, 255]));
        assert_eq!(strip.get_pixel(4, 0), &Rgba([0, 255, 0, 255]));
        // padding below and right of the smaller tile
        assert_eq!(strip.get_pixel(4, 5), &Rgba([0, 0, 0, 0]));
        assert_eq!(strip.get_pixel(7, 0), &Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn placeholder_slot_stays_transparent() {
        let dir = TempDir::new().unwrap();
        write_solid(dir.path(), "blue.png", 3, 3, [0, 0, 255, 255]);
        let dest = dir.path().join("photostrip.png");

        let outcomes = vec![failed("gone.png"), measured("blue.png", 3, 3)];
        let composition = compose_photostrip(
            &outcomes,
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();
        assert_eq!(composition.failed, vec![0]);

        let strip = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(strip.get_pixel(1, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(strip.get_pixel(4, 1), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn vanished_original_becomes_placeholder() {
        let dir = TempDir::new().unwrap();
        write_solid(dir.path(), "kept.png", 2, 2, [9, 9, 9, 255]);
        let dest = dir.path().join("photostrip.png");

        let outcomes = vec![measured("kept.png", 2, 2), measured("deleted.png", 2, 2)];
        let composition = compose_photostrip(
            &outcomes,
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();
        assert_eq!(composition.failed, vec![1]);
    }

    #[test]
    fn thumbnail_tiles_are_resized_when_needed() {
        let dir = TempDir::new().unwrap();
        write_solid(dir.path(), "a.png", 50, 10, [1, 2, 3, 255]);
        let dest = dir.path().join("photostrip.png");

        let outcomes = vec![measured("a.png", 20, 20)];
        compose_photostrip(
            &outcomes,
            TileLayout::Thumbnail { size: 20 },
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();

        let strip = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(strip.dimensions(), (20, 20));
        assert_eq!(strip.get_pixel(19, 19), &Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn oversized_canvas_is_refused() {
        let outcomes = vec![measured("tall.png", 1, 30000), measured("wide.png", 30000, 1)];
        let error = plan_tiles(
            &outcomes,
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            DEFAULT_MAX_CANVAS_PIXELS,
        )
        .unwrap_err();
        assert!(error.to_string().contains("exceeds the limit"), "{error:#}");

        let outcomes = vec![measured("a.png", 4, 4), measured("b.png", 4, 4)];
        let within =
            |limit| plan_tiles(&outcomes, TileLayout::Natural, FailurePolicy::Placeholder, limit);
        assert!(within(32).is_ok());
        assert!(within(31).is_err());
    }

    #[test]
    fn canvas_width_overflow_is_an_error() {
        let outcomes = vec![
            measured("a.png", u32::MAX / 2 + 1, 1),
            measured("b.png", 1, 1),
        ];
        let error = natural_plan(&outcomes).unwrap_err();
        assert!(error.to_string().contains("overflow"), "{error:#}");
    }

    #[test]
    fn replaced_original_is_clipped_to_its_box() {
        let dir = TempDir::new().unwrap();
        // measured at 2x2, replaced on disk by a larger image before composition
        write_solid(dir.path(), "swapped.png", 5, 5, [255, 0, 0, 255]);
        write_solid(dir.path(), "blue.png", 2, 2, [0, 0, 255, 255]);
        let dest = dir.path().join("photostrip.png");

        let outcomes = vec![
            measured("swapped.png", 2, 2),
            failed("gone.png"),
            measured("blue.png", 2, 2),
        ];
        let composition = compose_photostrip(
            &outcomes,
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();
        assert_eq!((composition.width, composition.height), (6, 2));

        let strip = image::open(&dest).unwrap().to_rgba8();
        assert_eq!(strip.get_pixel(1, 1), &Rgba([255, 0, 0, 255]));
        assert_eq!(strip.get_pixel(2, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(strip.get_pixel(3, 1), &Rgba([0, 0, 0, 0]));
        assert_eq!(strip.get_pixel(4, 0), &Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn no_temporary_files_are_left_behind() {
        let dir = TempDir::new().unwrap();
        write_solid(dir.path(), "a.png", 2, 2, [1, 1, 1, 255]);
        let dest = dir.path().join("photostrip.png");
        compose_photostrip(
            &[measured("a.png", 2, 2)],
            TileLayout::Natural,
            FailurePolicy::Placeholder,
            NO_LIMIT,
            dir.path(),
            &dest,
        )
        .unwrap();

        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
