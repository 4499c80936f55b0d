//! Folder path generator.

use crate::generators::filename::sanitize_filename;
use crate::generators::pattern::{PatternResolver, SequenceState};
use crate::models::preset::FolderStructure;
use crate::models::record::FileRecord;
use crate::Result;
use std::path::PathBuf;

/// Resolve the folder levels of `structure` into a separator-joined string.
///
/// Each level is sanitized on its own, so a value containing a path
/// separator never creates extra folders. Empty levels are dropped.
pub fn generate_folder(
    resolver: &PatternResolver,
    structure: &FolderStructure,
    record: &FileRecord,
    sequences: &mut SequenceState,
) -> Result<String> {
    let mut parts = Vec::new();

    for level in &structure.levels {
        let raw = resolver.resolve(level.components(), record, sequences)?;
        let part = sanitize_filename(&raw);
        if part.is_empty() {
            continue;
        }
        if part == "." || part == ".." {
            return Err(crate::Error::PathTraversal(raw));
        }
        parts.push(part);
    }

    Ok(parts.join(&structure.separator))
}

/// Turn a separator-joined folder string into a relative path.
///
/// Rejects `..` and `.` segments and anything that would escape the
/// destination root.
pub fn folder_to_path(folder: &str, separator: &str) -> Result<PathBuf> {
    let mut path = PathBuf::new();

    let segments: Vec<&str> = if separator.is_empty() {
        vec![folder]
    } else {
        folder.split(separator).collect()
    };

    for segment in segments {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        if segment == "." || segment == ".." || segment.contains('/') || segment.contains('\\') {
            return Err(crate::Error::PathTraversal(folder.to_string()));
        }
        path.push(segment);
    }

    Ok(path)
}

/// Resolve the destination folder of `record`, relative to the destination root.
pub fn generate_folder_path(
    resolver: &PatternResolver,
    structure: &FolderStructure,
    record: &FileRecord,
    sequences: &mut SequenceState,
) -> Result<PathBuf> {
    let folder = generate_folder(resolver, structure, record, sequences)?;
    folder_to_path(&folder, &structure.separator)
}
