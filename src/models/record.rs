//! File record data model.
//!
//! A [`FileRecord`] is one discovered item travelling through the engine. The
//! metadata mapping is filled in by discovery and only read afterwards.

use crate::utils::fs::{guess_media_type, guess_mime_type, split_file_name};
use crate::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Metadata fields consulted, in order, for the captured datetime.
pub const CAPTURE_DATETIME_FIELDS: &[&str] = &["datetime", "dateTimeOriginal", "dateTimeDigitized"];

/// Stable identifier of a record within one run (its discovery index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(pub usize);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Media category of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Video,
    #[serde(alias = "photo")]
    Image,
    Raw,
    Audio,
    Document,
    #[serde(alias = "other")]
    Unknown,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaType::Video => write!(f, "video"),
            MediaType::Image => write!(f, "image"),
            MediaType::Raw => write!(f, "raw"),
            MediaType::Audio => write!(f, "audio"),
            MediaType::Document => write!(f, "document"),
            MediaType::Unknown => write!(f, "unknown"),
        }
    }
}

/// A scalar metadata value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    DateTime(NaiveDateTime),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetadataValue {
    /// Interpret the value as a datetime.
    ///
    /// Text in EXIF form (`2023:10:27 15:30:00`) or ISO form is accepted.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            MetadataValue::DateTime(dt) => Some(*dt),
            MetadataValue::Text(s) => parse_datetime_text(s),
            _ => None,
        }
    }

    /// Interpret the value as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            MetadataValue::Integer(n) => Some(*n),
            MetadataValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            MetadataValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Interpret the value as a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetadataValue::Integer(n) => Some(*n as f64),
            MetadataValue::Float(f) => Some(*f),
            MetadataValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            MetadataValue::Integer(n) => write!(f, "{}", n),
            MetadataValue::Float(v) => write!(f, "{}", v),
            MetadataValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        MetadataValue::Text(s.to_string())
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        MetadataValue::Integer(n)
    }
}

impl From<NaiveDateTime> for MetadataValue {
    fn from(dt: NaiveDateTime) -> Self {
        MetadataValue::DateTime(dt)
    }
}

/// Metadata mapping of one file.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// Parse a datetime written as text.
pub fn parse_datetime_text(s: &str) -> Option<NaiveDateTime> {
    const FORMATS: &[&str] = &[
        "%Y:%m:%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
    ];
    let s = s.trim();
    for fmt in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%Y:%m:%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0);
        }
    }
    None
}

/// Processing status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Pending,
    FilteredOut,
    Duplicate,
    Planned,
    Copying,
    Copied,
    Error,
}

impl FileStatus {
    /// Whether moving from `self` to `next` follows the lifecycle.
    pub fn can_transition_to(self, next: FileStatus) -> bool {
        use FileStatus::*;

        self == next
            || matches!(
                (self, next),
                (Pending, FilteredOut)
                    | (Pending, Duplicate)
                    | (Pending, Planned)
                    | (Pending, Error)
                    | (Planned, Copying)
                    | (Copying, Copied)
                    | (Copying, Error)
            )
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FileStatus::Pending => "pending",
            FileStatus::FilteredOut => "filtered-out",
            FileStatus::Duplicate => "duplicate",
            FileStatus::Planned => "planned",
            FileStatus::Copying => "copying",
            FileStatus::Copied => "copied",
            FileStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// One discovered file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    /// Discovery index.
    pub id: RecordId,
    /// Full path to the source file.
    pub source_path: PathBuf,
    /// File name including extension.
    pub original_filename: String,
    /// File name without extension.
    pub base_name: String,
    /// Extension without the dot, original case.
    pub extension: String,
    /// File size in bytes.
    pub size: u64,
    /// Last modified time.
    pub modified: DateTime<Utc>,
    /// Media category.
    pub media_type: MediaType,
    /// MIME type guessed from the extension.
    pub mime_type: String,
    /// Device context supplied by discovery (`iOS`, `Android`, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    metadata: Metadata,
    /// Content hash, filled lazily.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Resolved destination directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<PathBuf>,
    /// Resolved destination file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_file_name: Option<String>,
    status: FileStatus,
    /// Error or exclusion detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    associated: Vec<FileRecord>,
    is_associated: bool,
    parent: Option<RecordId>,
}

impl FileRecord {
    /// Create a record from already known file attributes.
    pub fn new(id: RecordId, path: impl Into<PathBuf>, size: u64, modified: DateTime<Utc>) -> Self {
        let source_path = path.into();
        let original_filename = source_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let (base_name, extension) = split_file_name(&original_filename);

        Self {
            id,
            media_type: guess_media_type(&extension),
            mime_type: guess_mime_type(&extension).to_string(),
            source_path,
            original_filename,
            base_name,
            extension,
            size,
            modified,
            device_type: None,
            metadata: Metadata::new(),
            content_hash: None,
            target_path: None,
            target_file_name: None,
            status: FileStatus::Pending,
            detail: None,
            associated: Vec::new(),
            is_associated: false,
            parent: None,
        }
    }

    /// Create a record by reading size and modified time from disk.
    pub fn from_path(id: RecordId, path: &Path) -> Result<Self> {
        let meta = std::fs::metadata(path)?;
        let modified = meta
            .modified()
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        Ok(Self::new(id, path, meta.len(), modified))
    }

    /// Attach the extracted metadata mapping.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Attach the source device type.
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    /// Read-only view of the metadata mapping.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Look up one metadata field.
    pub fn metadata_value(&self, field: &str) -> Option<&MetadataValue> {
        self.metadata.get(field)
    }

    /// Captured datetime from metadata, if any.
    pub fn captured_datetime(&self) -> Option<NaiveDateTime> {
        CAPTURE_DATETIME_FIELDS
            .iter()
            .filter_map(|f| self.metadata.get(*f))
            .find_map(|v| v.as_datetime())
    }

    /// Current status.
    pub fn status(&self) -> FileStatus {
        self.status
    }

    /// Move to the next lifecycle status.
    pub fn transition(&mut self, next: FileStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(crate::Error::InvalidTransition {
                path: self.source_path.display().to_string(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Transition and record a detail message.
    pub fn transition_with(&mut self, next: FileStatus, detail: impl Into<String>) -> Result<()> {
        self.transition(next)?;
        self.detail = Some(detail.into());
        Ok(())
    }

    /// Whether the extension matches one of `extensions` (case-insensitive, dot optional).
    pub fn has_extension_in(&self, extensions: &[String]) -> bool {
        let ext = self.extension.to_lowercase();
        extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&ext))
    }

    /// Directory that contains the source file.
    pub fn source_dir(&self) -> &Path {
        self.source_path.parent().unwrap_or_else(|| Path::new(""))
    }

    /// Associated files owned by this record.
    pub fn associated(&self) -> &[FileRecord] {
        &self.associated
    }

    /// Mutable access to the associated files.
    pub fn associated_mut(&mut self) -> &mut [FileRecord] {
        &mut self.associated
    }

    /// Whether this record was claimed by a main file.
    pub fn is_associated(&self) -> bool {
        self.is_associated
    }

    /// Identifier of the owning main file.
    pub fn parent(&self) -> Option<RecordId> {
        self.parent
    }

    /// Attach `child` as an associated file.
    ///
    /// The relationship is a one-level tree: an associated record can never own
    /// children, a parent can never be claimed, and a child is attached once.
    pub fn add_associated(&mut self, mut child: FileRecord) -> Result<()> {
        if child.id == self.id {
            return Err(crate::Error::other(format!(
                "{} cannot be associated with itself",
                self.source_path.display()
            )));
        }
        if self.is_associated {
            return Err(crate::Error::other(format!(
                "{} is an associated file and cannot own others",
                self.source_path.display()
            )));
        }
        if !child.associated.is_empty() || child.is_associated {
            return Err(crate::Error::other(format!(
                "{} already belongs to an association",
                child.source_path.display()
            )));
        }
        if self.associated.iter().any(|a| a.id == child.id) {
            return Err(crate::Error::other(format!(
                "{} is already associated",
                child.source_path.display()
            )));
        }

        child.is_associated = true;
        child.parent = Some(self.id);
        self.associated.push(child);
        Ok(())
    }
}
