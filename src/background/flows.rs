use anyhow::{Context, Result};
use log::{info, warn};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::spawn_blocking;

use crate::background::actors::{delete::delete_originals, persist::PersistTask};
use crate::background::processors::compose::{TileLayout, compose_photostrip};
use crate::background::processors::folder::{Paths, clean_name};
use crate::background::processors::image::measure_image;
use crate::background::types::{
    BatchStatus, ImageOutcome, ProcessedImage, SlotUpdate, UploadedImage,
};
use crate::common::errors::handle_error;
use crate::config::AppConfig;

/// Persist one upload and measure it. Never fails: problems become `ImageOutcome::Failed`.
pub async fn image_workflow(
    image: UploadedImage,
    paths: Arc<Paths>,
    thumbnail_size: Option<u32>,
) -> SlotUpdate {
    let UploadedImage {
        id,
        file_name,
        raw_data,
    } = image;
    let start_time = Instant::now();
    let name = clean_name(&file_name);
    let path = paths.upload_path(&file_name);

    let measured = async move {
        // Step 1: Write the raw bytes
        let path = PersistTask::new(path, raw_data).run().await?;

        // Step 2: Decode and measure (in blocking thread)
        spawn_blocking(move || measure_image(&path, thumbnail_size))
            .await
            .context("measure task panicked")?
    }
    .await;

    let outcome = match measured {
        Ok((width, height)) => {
            info!(duration = &*format!("{:?}", start_time.elapsed());
                "Measured slot {} '{}' at {}x{}",
                id,
                name,
                width,
                height,
            );
            ImageOutcome::Measured(ProcessedImage {
                name,
                width,
                height,
            })
        }
        Err(error) => {
            warn!(duration = &*format!("{:?}", start_time.elapsed());
                "Slot {} '{}' failed: {:#}",
                id,
                name,
                error,
            );
            ImageOutcome::Failed {
                name,
                reason: format!("{:#}", error),
            }
        }
    };

    SlotUpdate { id, outcome }
}

/// Compose a completed batch, then clean up its originals whatever the result.
pub async fn compose_workflow(
    outcomes: Vec<ImageOutcome>,
    config: Arc<AppConfig>,
    paths: Arc<Paths>,
) -> BatchStatus {
    let start_time = Instant::now();
    let layout = TileLayout::from(config.as_ref());
    let policy = config.failure_policy;
    let max_pixels = config.max_canvas_pixels;

    let composed = {
        let outcomes = outcomes.clone();
        let paths = paths.clone();
        spawn_blocking(move || -> Result<_> {
            compose_photostrip(
                &outcomes,
                layout,
                policy,
                max_pixels,
                &paths.upload,
                &paths.output_file,
            )
        })
        .await
        .context("compose task panicked")
        .and_then(|result| result)
    };

    let status = match composed {
        Ok(composition) => {
            info!(duration = &*format!("{:?}", start_time.elapsed());
                "Wrote {}x{} photostrip to {:?}",
                composition.width,
                composition.height,
                paths.output_file,
            );
            BatchStatus::Composed {
                width: composition.width,
                height: composition.height,
                failed: composition.failed,
            }
        }
        Err(error) => {
            let error = handle_error(error.context("Failed to compose photostrip"));
            BatchStatus::Failed {
                reason: format!("{:#}", error),
            }
        }
    };

    if config.use_unlink {
        delete_originals(outcomes.iter().map(ImageOutcome::name), &paths.upload).await;
    }

    status
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;
    use tempfile::TempDir;

    fn paths_under(dir: &TempDir) -> Arc<Paths> {
        Arc::new(Paths::create_under(dir.path(), &AppConfig::default()))
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        RgbaImage::from_pixel(width, height, Rgba([5, 5, 5, 255]))
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn measured_upload_lands_under_sanitized_name() {
        let dir = TempDir::new().unwrap();
        let image = UploadedImage {
            id: 2,
            file_name: "summer trip.png".to_string(),
            raw_data: png_bytes(7, 3),
        };

        let paths = paths_under(&dir);
        let update = image_workflow(image, paths.clone(), None).await;

        assert_eq!(update.id, 2);
        assert_eq!(
            update.outcome,
            ImageOutcome::Measured(ProcessedImage {
                name: "summer_trip.png".to_string(),
                width: 7,
                height: 3,
            })
        );
        assert!(paths.upload.join("summer_trip.png").exists());
    }

    #[tokio::test]
    async fn undecodable_upload_is_reported_not_dropped() {
        let dir = TempDir::new().unwrap();
        let image = UploadedImage {
            id: 0,
            file_name: "notes.png".to_string(),
            raw_data: b"plain text".to_vec(),
        };

        let update = image_workflow(image, paths_under(&dir), Some(120)).await;

        assert_eq!(update.id, 0);
        assert!(update.outcome.is_failed());
        assert_eq!(update.outcome.name(), "notes.png");
    }
}
