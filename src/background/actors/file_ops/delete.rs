use anyhow::{Context, Result, bail};
use futures::future::join_all;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tokio::task::spawn_blocking;

use crate::background::processors::folder::clean_path;

pub struct DeleteTask {
    pub path: PathBuf,
    pub upload_dir: PathBuf,
}

impl DeleteTask {
    pub fn new(path: impl Into<PathBuf>, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            upload_dir: upload_dir.into(),
        }
    }

    pub async fn run(self) -> Result<()> {
        spawn_blocking(move || delete_in_upload_task(&self.path, &self.upload_dir))
            .await
            .context("delete task panicked")?
    }
}

fn delete_in_upload_task(path: &Path, upload_dir: &Path) -> Result<()> {
    // Refuse to touch anything outside the uploads directory
    if !path_starts_with_upload(path, upload_dir) {
        bail!("{:?} is not inside {:?}", path, upload_dir);
    }

    fs::remove_file(path).context(format!("failed deleting {:?}", path))?;
    log::info!("Deleted file: {:?}", path);
    Ok(())
}

pub fn path_starts_with_upload(path: &Path, upload_dir: &Path) -> bool {
    match (fs::canonicalize(path), fs::canonicalize(upload_dir)) {
        (Ok(abs_path), Ok(abs_upload)) => abs_path.starts_with(abs_upload),
        _ => false,
    }
}

/// Delete the originals named by a finished batch. Failures are logged and dropped.
pub async fn delete_originals<'a>(names: impl IntoIterator<Item = &'a str>, upload_dir: &Path) {
    let tasks = names
        .into_iter()
        .map(|name| DeleteTask::new(clean_path(upload_dir, name), upload_dir).run());

    for result in join_all(tasks).await {
        if let Err(err) = result {
            log::warn!("Failed to delete original: {:#}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn deletes_inside_upload_dir() {
        let dir = TempDir::new().unwrap();
        let upload = dir.path().join("uploads");
        fs::create_dir(&upload).unwrap();
        fs::write(upload.join("a.png"), b"a").unwrap();
        fs::write(upload.join("b.png"), b"b").unwrap();

        delete_originals(["a.png", "b.png", "never-written.png"], &upload).await;

        assert!(!upload.join("a.png").exists());
        assert!(!upload.join("b.png").exists());
    }

    #[tokio::test]
    async fn refuses_paths_outside_upload_dir() {
        let dir = TempDir::new().unwrap();
        let upload = dir.path().join("uploads");
        fs::create_dir(&upload).unwrap();
        let outside = dir.path().join("keep.png");
        fs::write(&outside, b"keep").unwrap();

        assert!(DeleteTask::new(&outside, &upload).run().await.is_err());
        assert!(outside.exists());
    }
}
