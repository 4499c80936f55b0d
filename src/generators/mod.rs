//! Destination path and name generators.

pub mod collision;
pub mod filename;
pub mod folder;
pub mod pattern;
