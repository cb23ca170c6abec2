pub mod fairings;
pub mod handlers;

use rocket::data::{Limits, ToByteUnit};
use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::{Build, Rocket};
use serde_json::json;
use std::io::Cursor;

use crate::background::coordinator::{BatchError, UploadCoordinator};
use fairings::cache::cache_control_fairing;
use handlers::batch::generate_batch_routes;
use handlers::photostrip::generate_photostrip_routes;
use handlers::upload::generate_upload_routes;

/// Largest upload body accepted, JSON or multipart.
pub const UPLOAD_LIMIT_MIB: u64 = 64;

#[derive(Debug)]
pub struct AppError {
    pub status: Status,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn new(status: Status, error: impl Into<anyhow::Error>) -> Self {
        AppError {
            status,
            error: error.into(),
        }
    }
}

#[rocket::async_trait]
impl<'r, 'o: 'r> Responder<'r, 'o> for AppError {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'o> {
        let outer_msg = self.error.to_string();

        let chain: Vec<String> = self.error.chain().map(|e| e.to_string()).collect();

        let body = json!({
            "error": outer_msg,
            "chain": chain,
        })
        .to_string();

        Response::build()
            .status(self.status)
            .header(ContentType::JSON)
            .sized_body(body.len(), Cursor::new(body))
            .ok()
    }
}

impl<E> From<E> for AppError
where
    anyhow::Error: From<E>,
{
    fn from(err: E) -> Self {
        AppError {
            status: Status::InternalServerError,
            error: anyhow::Error::from(err),
        }
    }
}

impl BatchError {
    pub fn status(&self) -> Status {
        match self {
            BatchError::EmptyBatch | BatchError::SlotOutOfRange { .. } => Status::BadRequest,
            BatchError::DuplicateSlot { .. }
            | BatchError::DuplicateName { .. }
            | BatchError::BatchClosed(_) => Status::Conflict,
            BatchError::TooManyOpenBatches { .. } => Status::ServiceUnavailable,
        }
    }
}

pub fn batch_error(err: BatchError) -> AppError {
    AppError::new(err.status(), err)
}

pub type AppResult<T> = Result<T, AppError>;

/// Assemble the server around an already configured coordinator.
pub fn build_rocket(coordinator: UploadCoordinator) -> Rocket<Build> {
    let limits = Limits::default()
        .limit("json", UPLOAD_LIMIT_MIB.mebibytes())
        .limit("file", UPLOAD_LIMIT_MIB.mebibytes())
        .limit("data-form", UPLOAD_LIMIT_MIB.mebibytes());
    let figment = rocket::Config::figment().merge(("limits", limits));
    let paths = coordinator.paths().clone();

    rocket::custom(figment)
        .attach(cache_control_fairing())
        .manage(paths)
        .manage(coordinator)
        .mount("/", generate_upload_routes())
        .mount("/", generate_photostrip_routes())
        .mount("/", generate_batch_routes())
}
