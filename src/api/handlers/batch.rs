use anyhow::anyhow;
use rocket::State;
use rocket::get;
use rocket::http::Status;
use rocket::serde::json::Json;
use uuid::Uuid;

use crate::api::{AppError, AppResult};
use crate::background::coordinator::UploadCoordinator;
use crate::background::types::BatchStatus;

#[get("/batch/<batch_id>")]
pub async fn batch_status(
    coordinator: &State<UploadCoordinator>,
    batch_id: &str,
) -> AppResult<Json<BatchStatus>> {
    let batch_id = Uuid::parse_str(batch_id).map_err(|err| {
        AppError::new(Status::BadRequest, anyhow!(err).context("Invalid batch id"))
    })?;
    coordinator
        .status(&batch_id)
        .map(Json)
        .ok_or_else(|| AppError::new(Status::NotFound, anyhow!("Unknown batch {}", batch_id)))
}

pub fn generate_batch_routes() -> Vec<rocket::Route> {
    rocket::routes![batch_status]
}
