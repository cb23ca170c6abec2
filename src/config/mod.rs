use anyhow::{Context, Result, ensure};
use dotenv::dotenv;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::common::{
    DEFAULT_BATCH_SIZE, DEFAULT_MAX_CANVAS_PIXELS, DEFAULT_MAX_OPEN_BATCHES, DEFAULT_THUMBNAIL_SIZE,
};

/// Prefix shared by every environment variable this server reads.
pub const ENV_PREFIX: &str = "PHOTOSTRIP_";

/// What to do with a slot whose image could not be persisted or measured.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Compose anyway and leave a transparent tile in the failed slot.
    #[default]
    Placeholder,
    /// Give up on the whole batch.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Explicit base directory. When unset the root is derived from `root_marker`.
    pub root_dir: Option<PathBuf>,
    /// Directory name searched for in the working directory; its parent is the root.
    pub root_marker: String,
    pub public_folder: String,
    pub static_folder: String,
    pub uploads_folder: String,
    /// Number of images that make up one photostrip.
    pub batch_size: usize,
    /// Force every tile to `thumbnail_size` square instead of natural sizes.
    pub use_thumbnail_sizes: bool,
    pub thumbnail_size: u32,
    /// Delete uploaded originals once the photostrip has been written.
    pub use_unlink: bool,
    pub failure_policy: FailurePolicy,
    /// Batches allowed to be collecting at once; further new ids are refused.
    pub max_open_batches: usize,
    pub max_canvas_pixels: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_dir: None,
            root_marker: ".photostrip".to_string(),
            public_folder: "public".to_string(),
            static_folder: "static".to_string(),
            uploads_folder: "uploads".to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            use_thumbnail_sizes: false,
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            use_unlink: true,
            failure_policy: FailurePolicy::Placeholder,
            max_open_batches: DEFAULT_MAX_OPEN_BATCHES,
            max_canvas_pixels: DEFAULT_MAX_CANVAS_PIXELS,
        }
    }
}

impl AppConfig {
    /// Read `PHOTOSTRIP_*` variables (optionally from `.env`) over the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<AppConfig>()
            .context("failed to parse PHOTOSTRIP_* environment variables")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.batch_size >= 1, "batch_size must be at least 1");
        ensure!(self.thumbnail_size >= 1, "thumbnail_size must be at least 1");
        ensure!(self.max_open_batches >= 1, "max_open_batches must be at least 1");
        ensure!(self.max_canvas_pixels >= 1, "max_canvas_pixels must be at least 1");
        for folder in [&self.public_folder, &self.static_folder, &self.uploads_folder] {
            ensure!(!folder.trim().is_empty(), "folder names must not be empty");
        }
        Ok(())
    }
}

pub static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Load the configuration once. Later calls return the already loaded value.
pub fn init_config() -> Result<&'static AppConfig> {
    if let Some(config) = APP_CONFIG.get() {
        return Ok(config);
    }
    let config = AppConfig::from_env()?;
    info!(
        "Batch size {}, thumbnail mode {}, unlink originals {}, failure policy {:?}",
        config.batch_size, config.use_thumbnail_sizes, config.use_unlink, config.failure_policy
    );
    Ok(APP_CONFIG.get_or_init(|| config))
}
