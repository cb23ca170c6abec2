use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BatchId = Uuid;

// ────────────────────────────────────────────────────────────────
// Submission side
// ────────────────────────────────────────────────────────────────

/// One image as delivered by the client. `id` is the output position.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub id: usize,
    pub file_name: String,
    pub raw_data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct UploadBatch {
    /// Existing batch to add images to, or `None` to start a new one.
    pub batch_id: Option<BatchId>,
    pub images: Vec<UploadedImage>,
}

impl UploadBatch {
    pub fn new(images: Vec<UploadedImage>) -> Self {
        Self {
            batch_id: None,
            images,
        }
    }

    pub fn with_id(batch_id: BatchId, images: Vec<UploadedImage>) -> Self {
        Self {
            batch_id: Some(batch_id),
            images,
        }
    }
}

/// Synchronous answer to a submission. Processing continues in the background.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Accepted {
    pub filename: String,
    pub batch_id: BatchId,
    pub accepted: usize,
}

// ────────────────────────────────────────────────────────────────
// Processing side
// ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedImage {
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Result of persisting and measuring one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Measured(ProcessedImage),
    Failed { name: String, reason: String },
}

impl ImageOutcome {
    /// Sanitized file name in the uploads directory, whether or not it was measured.
    pub fn name(&self) -> &str {
        match self {
            ImageOutcome::Measured(image) => &image.name,
            ImageOutcome::Failed { name, .. } => name,
        }
    }

    pub fn measured(&self) -> Option<&ProcessedImage> {
        match self {
            ImageOutcome::Measured(image) => Some(image),
            ImageOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ImageOutcome::Failed { .. })
    }
}

/// Message sent from a measurement task to its batch aggregator.
#[derive(Debug)]
pub struct SlotUpdate {
    pub id: usize,
    pub outcome: ImageOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum BatchStatus {
    #[serde(rename_all = "camelCase")]
    Collecting { completed: usize, expected: usize },
    Composing,
    #[serde(rename_all = "camelCase")]
    Composed {
        width: u32,
        height: u32,
        failed: Vec<usize>,
    },
    Failed { reason: String },
}

impl BatchStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, BatchStatus::Composed { .. } | BatchStatus::Failed { .. })
    }
}
