//! Processors module - domain-specific processing logic
//!
//! This module contains the following submodules:
//! - `folder`: Root resolution, folder creation and name sanitizing
//! - `image`: Decoding, measuring and in-place thumbnail rendering
//! - `compose`: Photostrip tiling
//! - `setup`: Initialization setup (logger, folders)

pub mod compose;
pub mod folder;
pub mod image;
pub mod setup;
