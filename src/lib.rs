//! Media Ingest Library
//!
//! Plans and performs the copy of photos and videos from a source folder or
//! device into a library organized by metadata-driven folder and file name
//! patterns, with duplicate detection, sidecar handling and filtering.

pub mod cli;
pub mod core;
pub mod error;
pub mod generators;
pub mod models;
pub mod preflight;
pub mod utils;

pub use error::{Error, Result};
