//! Photostrip server: collects a fixed-size batch of uploaded images,
//! measures them concurrently and tiles them left to right, in submission
//! order, into a single PNG.

pub mod api;
pub mod background;
pub mod common;
pub mod config;
