//! Folder management - resolves the root directory and creates the folders
//! used for uploaded originals and the photostrip.

use anyhow::{Context, Result};
use log::{info, warn};
use path_clean::PathClean;
use std::path::{Component, Path, PathBuf};

use crate::common::PHOTOSTRIP_FILE_NAME;
use crate::config::AppConfig;

// ────────────────────────────────────────────────────────────────
// Name & Path Sanitizing
// ────────────────────────────────────────────────────────────────

/// File name as stored in the uploads directory: spaces become underscores and
/// any directory part supplied by the client is dropped.
pub fn clean_name(name: &str) -> String {
    let flipped = flip_slashes(&name.replace(' ', "_"));
    let base = flipped.rsplit('/').next().unwrap_or_default();
    match base {
        "" | "." | ".." => "unnamed".to_string(),
        base => base.to_string(),
    }
}

/// Join `base` and the sanitized `name`.
pub fn clean_path(base: &Path, name: &str) -> PathBuf {
    base.join(clean_name(name)).clean()
}

/// Canonical separator form: backslashes flipped, duplicate separators collapsed.
pub fn canonical_path(raw: &str) -> PathBuf {
    PathBuf::from(flip_slashes(raw)).clean()
}

fn flip_slashes(path: &str) -> String {
    path.replace('\\', "/")
}

// ────────────────────────────────────────────────────────────────
// Directory Creation
// ────────────────────────────────────────────────────────────────

/// Make sure `<base>/<name>` exists and return it.
///
/// Creation failures are only logged; whoever writes into the directory next
/// will surface the real error.
pub fn ensure_directory(base: &Path, name: &str) -> PathBuf {
    let path = canonical_path(&format!("{}/{}", base.display(), name));
    if !path.is_dir() {
        match std::fs::create_dir_all(&path) {
            Ok(()) => info!("Created directory {:?}", path),
            Err(err) => warn!("Failed to create directory {:?}: {}", path, err),
        }
    }
    path
}

// ────────────────────────────────────────────────────────────────
// Root Resolution
// ────────────────────────────────────────────────────────────────

/// Root directory for all served and uploaded files.
///
/// An explicit `root_dir` always wins. Otherwise the working directory is
/// searched for a component named `root_marker` and everything before it is
/// the root; without a marker the working directory itself is used.
pub fn resolve_root(config: &AppConfig, cwd: &Path) -> PathBuf {
    if let Some(root) = &config.root_dir {
        return canonical_path(&root.to_string_lossy());
    }

    let mut root = PathBuf::new();
    for component in cwd.components() {
        if let Component::Normal(part) = component {
            if part == config.root_marker.as_str() {
                return root.clean();
            }
        }
        root.push(component);
    }
    cwd.to_path_buf()
}

// ────────────────────────────────────────────────────────────────
// Paths
// ────────────────────────────────────────────────────────────────

/// Every location the pipeline touches, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub root: PathBuf,
    pub public: PathBuf,
    pub static_dir: PathBuf,
    pub upload: PathBuf,
    pub output_file: PathBuf,
}

impl Paths {
    /// Resolve the root from the working directory and create all folders.
    pub fn initialize(config: &AppConfig) -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to read current directory")?;
        let root = resolve_root(config, &cwd);
        info!("Serving photostrip files under {:?}", root);
        Ok(Self::create_under(&root, config))
    }

    /// Create the folder layout below an explicit root.
    pub fn create_under(root: &Path, config: &AppConfig) -> Self {
        let public = ensure_directory(root, &config.public_folder);
        let static_dir = ensure_directory(&public, &config.static_folder);
        let upload = ensure_directory(&public, &config.uploads_folder);
        let output_file = static_dir.join(PHOTOSTRIP_FILE_NAME);
        Self {
            root: root.to_path_buf(),
            public,
            static_dir,
            upload,
            output_file,
        }
    }

    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        clean_path(&self.upload, file_name)
    }
}
