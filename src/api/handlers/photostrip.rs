use anyhow::{Context, anyhow};
use rocket::State;
use rocket::get;
use rocket::http::{ContentType, Header, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs::File;

use crate::api::{AppError, AppResult};
use crate::background::processors::folder::Paths;
use crate::common::PHOTOSTRIP_FILE_NAME;

/// The current photostrip, opened and measured before the response starts.
pub struct PhotoStripFile {
    file: File,
    size: u64,
    attachment: bool,
}

impl<'r> Responder<'r, 'static> for PhotoStripFile {
    fn respond_to(self, _req: &'r Request<'_>) -> response::Result<'static> {
        let mut response = Response::build();
        response
            .header(ContentType::PNG)
            .sized_body(usize::try_from(self.size).ok(), self.file);
        if self.attachment {
            response.header(Header::new(
                "Content-Disposition",
                format!("attachment; filename={}", PHOTOSTRIP_FILE_NAME),
            ));
        }
        response.ok()
    }
}

/// Open the photostrip, or report 404 if no batch has been composed yet.
pub async fn open_photostrip(path: &Path, attachment: bool) -> AppResult<PhotoStripFile> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(AppError::new(
                Status::NotFound,
                anyhow!("No photostrip has been composed yet"),
            ));
        }
        Err(err) => {
            return Err(anyhow::Error::from(err)
                .context(format!("Failed to open photostrip: {}", path.display()))
                .into());
        }
    };
    let size = file
        .metadata()
        .await
        .context(format!("Failed to stat photostrip: {}", path.display()))?
        .len();

    Ok(PhotoStripFile {
        file,
        size,
        attachment,
    })
}

#[get("/static")]
pub async fn show_photostrip(paths: &State<Paths>) -> AppResult<PhotoStripFile> {
    open_photostrip(&paths.output_file, false).await
}

#[get("/download")]
pub async fn download_photostrip(paths: &State<Paths>) -> AppResult<PhotoStripFile> {
    open_photostrip(&paths.output_file, true).await
}

pub fn generate_photostrip_routes() -> Vec<rocket::Route> {
    rocket::routes![show_photostrip, download_photostrip]
}
