//! Background module - everything that happens after a batch is accepted
//!
//! Structure:
//! - `types`: Core data structures (UploadedImage, ImageOutcome, BatchStatus)
//! - `processors`: Domain-specific processing logic (folder, image, compose, setup)
//! - `actors`: Small file tasks run on the blocking pool
//! - `flows`: Per-image and per-batch workflows
//! - `coordinator`: Batch registry and fan-in

pub mod actors;
pub mod coordinator;
pub mod flows;
pub mod processors;
pub mod types;
