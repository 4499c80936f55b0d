//! Directory scanner module.
//!
//! Discovers source files and turns them into [`FileRecord`]s in sorted path
//! order, which is the discovery order used by the rest of the engine.
//! Metadata is not extracted here; it can be merged from a JSON manifest
//! written by an external extractor.

use crate::models::record::{FileRecord, Metadata, RecordId};
use crate::Result;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Scan options.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Descend into sub-folders.
    pub recursive: bool,
    /// Include dot files and dot folders.
    pub include_hidden: bool,
    /// Device type of the source (`ios`, `android`), stamped on every record.
    pub device_type: Option<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            include_hidden: false,
            device_type: None,
        }
    }
}

/// Result of scanning a directory.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Discovered files, in discovery order.
    pub records: Vec<FileRecord>,
    /// Total files seen.
    pub total_files_scanned: usize,
    /// Total directories seen.
    pub total_dirs_scanned: usize,
    /// Entries that could not be read.
    pub unreadable: Vec<PathBuf>,
}

impl ScanResult {
    /// Total size of the discovered files.
    pub fn total_bytes(&self) -> u64 {
        self.records.iter().map(|r| r.size).sum()
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with('.'))
}

/// Scan a directory for source files.
///
/// # Arguments
/// * `path` - The directory to scan
/// * `options` - Recursion and hidden-file handling
///
/// # Returns
/// A `ScanResult` whose records are sorted by path.
pub fn scan_directory(path: &Path, options: &ScanOptions) -> Result<ScanResult> {
    crate::utils::fs::ensure_directory(path)?;

    let mut result = ScanResult::default();
    let mut paths = Vec::new();

    let walker = WalkDir::new(path)
        .follow_links(false)
        .max_depth(if options.recursive { usize::MAX } else { 1 })
        .into_iter()
        .filter_entry(|e| options.include_hidden || !is_hidden(e));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Cannot read entry: {}", e);
                if let Some(p) = e.path() {
                    result.unreadable.push(p.to_path_buf());
                }
                continue;
            }
        };

        if entry.file_type().is_dir() {
            result.total_dirs_scanned += 1;
        } else if entry.file_type().is_file() {
            result.total_files_scanned += 1;
            paths.push(entry.into_path());
        }
    }

    paths.sort();
    for path in paths {
        let id = RecordId(result.records.len());
        match FileRecord::from_path(id, &path) {
            Ok(record) => match &options.device_type {
                Some(device) => result.records.push(record.with_device_type(device.as_str())),
                None => result.records.push(record),
            },
            Err(e) => {
                tracing::warn!("Failed to read file {:?}: {}", path, e);
                result.unreadable.push(path);
            }
        }
    }

    tracing::info!(
        "Scanned {} files in {} directories: {} records, {} unreadable",
        result.total_files_scanned,
        result.total_dirs_scanned,
        result.records.len(),
        result.unreadable.len()
    );

    Ok(result)
}

/// Load a metadata manifest: `{ "<path>": { "<field>": value } }`.
pub fn load_manifest(path: &Path) -> Result<HashMap<PathBuf, Metadata>> {
    let content = fs::read_to_string(path)?;
    let manifest: HashMap<PathBuf, Metadata> = serde_json::from_str(&content)?;
    tracing::debug!("Loaded metadata for {} files from {:?}", manifest.len(), path);
    Ok(manifest)
}

/// Attach manifest metadata to the matching records.
///
/// Manifest paths may be absolute or relative to `root`. Returns the number
/// of records that received metadata.
pub fn apply_manifest(
    records: Vec<FileRecord>,
    manifest: &HashMap<PathBuf, Metadata>,
    root: &Path,
) -> (Vec<FileRecord>, usize) {
    let mut matched = 0;
    let records = records
        .into_iter()
        .map(|record| {
            let relative = record.source_path.strip_prefix(root).ok();
            let found = manifest
                .get(&record.source_path)
                .or_else(|| relative.and_then(|r| manifest.get(r)));
            match found {
                Some(metadata) => {
                    matched += 1;
                    record.with_metadata(metadata.clone())
                }
                None => record,
            }
        })
        .collect();
    (records, matched)
}
