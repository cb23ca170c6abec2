use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use tokio::task::spawn_blocking;

/// Write raw upload bytes to their final path, replacing any previous file.
pub struct PersistTask {
    pub path: PathBuf,
    pub raw_data: Vec<u8>,
}

impl PersistTask {
    pub fn new(path: impl Into<PathBuf>, raw_data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            raw_data,
        }
    }

    pub async fn run(self) -> Result<PathBuf> {
        spawn_blocking(move || -> Result<PathBuf> {
            fs::write(&self.path, &self.raw_data)
                .context(format!("failed to write upload to {:?}", self.path))?;
            Ok(self.path)
        })
        .await
        .context("persist task panicked")?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn overwrites_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.png");
        fs::write(&path, b"old contents that are longer").unwrap();

        let written = PersistTask::new(&path, b"new".to_vec()).run().await.unwrap();

        assert_eq!(written, path);
        assert_eq!(fs::read(&path).unwrap(), b"new");
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gone").join("a.png");
        assert!(PersistTask::new(path, vec![1, 2, 3]).run().await.is_err());
    }
}
