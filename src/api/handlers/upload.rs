use anyhow::{Context, Result, anyhow};
use log::{error, info};
use rocket::State;
use rocket::form::{Errors, Form, FromForm};
use rocket::fs::TempFile;
use rocket::http::Status;
use rocket::post;
use rocket::serde::json::Json;
use serde::Deserialize;
use std::time::Instant;
use tokio::io::AsyncReadExt;
use uuid::Uuid;

use crate::api::{AppError, AppResult, batch_error};
use crate::background::coordinator::UploadCoordinator;
use crate::background::types::{Accepted, BatchId, UploadBatch, UploadedImage};

// ────────────────────────────────────────────────────────────────
// JSON ingestion
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadImageJson {
    pub id: usize,
    pub file_name: String,
    /// One character per byte, as produced by `FileReader.readAsBinaryString`.
    pub file_data: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UploadPayload {
    #[serde(rename_all = "camelCase")]
    Batch {
        #[serde(default)]
        batch_id: Option<BatchId>,
        images: Vec<UploadImageJson>,
    },
    /// Bare array of images, always a new batch.
    Images(Vec<UploadImageJson>),
}

impl UploadPayload {
    fn into_batch(self) -> Result<UploadBatch> {
        let (batch_id, images) = match self {
            UploadPayload::Batch { batch_id, images } => (batch_id, images),
            UploadPayload::Images(images) => (None, images),
        };
        let images = images
            .into_iter()
            .map(|image| {
                let raw_data = decode_binary_string(&image.file_data)
                    .context(format!("fileData of image {} is not a binary string", image.id))?;
                Ok(UploadedImage {
                    id: image.id,
                    file_name: image.file_name,
                    raw_data,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(UploadBatch { batch_id, images })
    }
}

/// Map each character (code point 0..=255) back to the byte it stands for.
pub fn decode_binary_string(data: &str) -> Result<Vec<u8>> {
    data.chars()
        .enumerate()
        .map(|(position, c)| {
            u8::try_from(c).map_err(|_| {
                anyhow!(
                    "character U+{:04X} at position {} is outside 0..=255",
                    c as u32,
                    position
                )
            })
        })
        .collect()
}

#[post("/file-upload", data = "<payload>")]
pub async fn file_upload(
    coordinator: &State<UploadCoordinator>,
    payload: Result<Json<UploadPayload>, rocket::serde::json::Error<'_>>,
) -> AppResult<Json<Accepted>> {
    let start_time = Instant::now();
    let payload = payload
        .map_err(|err| {
            AppError::new(
                Status::BadRequest,
                anyhow!("{:?}", err).context("Failed to parse upload body"),
            )
        })?
        .into_inner();
    let batch = payload
        .into_batch()
        .map_err(|err| AppError::new(Status::BadRequest, err))?;

    let accepted = coordinator.process_batch(batch).map_err(batch_error)?;
    info!(duration = &*format!("{:?}", start_time.elapsed());
        "Received {} image(s) for batch {}",
        accepted.accepted,
        accepted.batch_id,
    );
    Ok(Json(accepted))
}

// ────────────────────────────────────────────────────────────────
// Multipart ingestion
// ────────────────────────────────────────────────────────────────

#[derive(FromForm, Debug)]
pub struct UploadForm<'r> {
    /// Files in submission order
    #[field(name = "file")]
    pub files: Vec<TempFile<'r>>,

    /// Output position of each file, same order as `file`
    #[field(name = "id")]
    pub ids: Vec<usize>,

    #[field(name = "batchId")]
    pub batch_id: Option<String>,
}

fn get_filename(file: &TempFile<'_>, id: usize) -> String {
    file.raw_name()
        .map(|name| name.dangerous_unsafe_unsanitized_raw().as_str().to_string())
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| match get_extension(file) {
            Some(extension) => format!("upload-{}.{}", id, extension),
            None => format!("upload-{}", id),
        })
}

fn get_extension(file: &TempFile<'_>) -> Option<String> {
    file.content_type()
        .and_then(|ct| ct.extension())
        .map(|ext| ext.as_str().to_lowercase())
}

async fn read_temp_file(file: &TempFile<'_>) -> Result<Vec<u8>> {
    let reader = file.open().await.context("failed to open uploaded part")?;
    tokio::pin!(reader);
    let mut raw_data = Vec::new();
    reader
        .read_to_end(&mut raw_data)
        .await
        .context("failed to read uploaded part")?;
    Ok(raw_data)
}

#[post("/upload", data = "<form>")]
pub async fn upload(
    coordinator: &State<UploadCoordinator>,
    form: Result<Form<UploadForm<'_>>, Errors<'_>>,
) -> AppResult<Json<Accepted>> {
    let inner_form = match form {
        Ok(form) => form.into_inner(),
        Err(errors) => {
            let error_chain = errors
                .iter()
                .map(|e| anyhow!(e.to_string()))
                .reduce(|acc, e| acc.context(e.to_string()));

            let error = match error_chain {
                Some(chain) => chain.context("Failed to parse form"),
                None => anyhow!("Failed to parse form with unknown error"),
            };
            return Err(AppError::new(Status::BadRequest, error));
        }
    };

    if inner_form.files.len() != inner_form.ids.len() {
        error!("Mismatch between number of files and ids");
        return Err(AppError::new(
            Status::BadRequest,
            anyhow!("Mismatch between number of files and ids."),
        ));
    }

    let batch_id = inner_form
        .batch_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|err| {
            AppError::new(Status::BadRequest, anyhow!(err).context("Invalid batchId"))
        })?;

    let mut images = Vec::with_capacity(inner_form.files.len());
    for (file, &id) in inner_form.files.iter().zip(inner_form.ids.iter()) {
        images.push(UploadedImage {
            id,
            file_name: get_filename(file, id),
            raw_data: read_temp_file(file).await?,
        });
    }

    let accepted = coordinator
        .process_batch(UploadBatch { batch_id, images })
        .map_err(batch_error)?;
    Ok(Json(accepted))
}

pub fn generate_upload_routes() -> Vec<rocket::Route> {
    rocket::routes![file_upload, upload]
}
