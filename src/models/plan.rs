//! Copy plan data model.
//!
//! A plan is built once per run, before any bytes move, and consumed once by
//! the executor.

use crate::models::record::RecordId;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Plan format version.
pub const PLAN_VERSION: &str = "1.0";

/// The full copy plan of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CopyPlan {
    /// Plan version.
    pub version: String,
    /// Creation timestamp.
    pub created_at: String,
    /// Run identifier.
    pub run_id: String,
    /// Name of the preset used.
    pub preset_name: String,
    /// Destination root.
    pub destination_root: PathBuf,
    /// Whether the plan was built for preview only.
    pub dry_run: bool,
    /// Planned items, in discovery order. Associated files follow their parent.
    pub entries: Vec<PlanEntry>,
    /// Files rejected by the filter chain.
    pub excluded: Vec<ExcludedEntry>,
    /// Files that could not be planned.
    pub errors: Vec<ErrorEntry>,
    /// Aggregate counters.
    pub counters: PlanCounters,
}

impl CopyPlan {
    /// Entries that will move bytes.
    pub fn actionable(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.action.writes())
    }

    /// Number of entries that will move bytes.
    pub fn actionable_count(&self) -> usize {
        self.actionable().count()
    }

    /// Total bytes that will be copied.
    pub fn total_bytes(&self) -> u64 {
        self.actionable().map(|e| e.size).sum()
    }

    /// Find the entry planned for a record.
    pub fn entry(&self, id: RecordId) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| e.id == id)
    }
}

/// One planned file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    /// Record identifier.
    pub id: RecordId,
    /// Owning main file, for associated files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<RecordId>,
    /// Source path.
    pub source: PathBuf,
    /// Final destination path.
    pub destination: PathBuf,
    /// Action to perform.
    pub action: PlanAction,
    /// Duplicate classification against the destination.
    pub classification: Classification,
    /// Source size in bytes.
    pub size: u64,
    /// Source modified time.
    pub modified: DateTime<Utc>,
    /// Source content hash, when it was needed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_hash: Option<String>,
    /// Why the action was chosen.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What the executor does with an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanAction {
    /// Copy to a free destination name.
    Copy,
    /// Do nothing.
    Skip,
    /// Replace the existing destination file.
    Overwrite,
    /// Copy under a collision-resolved name.
    Rename,
}

impl PlanAction {
    /// Whether the action writes to the destination.
    pub fn writes(&self) -> bool {
        !matches!(self, PlanAction::Skip)
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanAction::Copy => write!(f, "copy"),
            PlanAction::Skip => write!(f, "skip"),
            PlanAction::Overwrite => write!(f, "overwrite"),
            PlanAction::Rename => write!(f, "rename"),
        }
    }
}

/// Result of comparing a source file with its proposed destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// Nothing exists at the destination.
    New,
    /// The destination holds identical content.
    DuplicateContent,
    /// The destination holds different content under the same name.
    NameConflictDifferentContent,
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Classification::New => write!(f, "new"),
            Classification::DuplicateContent => write!(f, "duplicate content"),
            Classification::NameConflictDifferentContent => write!(f, "name conflict"),
        }
    }
}

/// A file rejected by a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedEntry {
    pub id: RecordId,
    pub source: PathBuf,
    /// Filter that rejected the file.
    pub filter: String,
    pub reason: String,
}

/// A file that could not be planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub id: RecordId,
    pub source: PathBuf,
    pub message: String,
}

/// Aggregate plan counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanCounters {
    /// Entries that will be copied, overwritten or renamed.
    pub included: usize,
    /// Files rejected by the filter chain.
    pub excluded_by_filter: usize,
    /// Files skipped as duplicates.
    pub duplicate: usize,
    /// Files that failed planning.
    pub error: usize,
}

/// Save a plan to a JSON file.
pub fn save_plan(plan: &CopyPlan, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(plan)?;

    // Create parent directory if needed
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    file.write_all(json.as_bytes())?;

    tracing::info!("Plan saved to {:?}", path);
    Ok(())
}

/// Load a plan from a JSON file.
pub fn load_plan(path: &Path) -> Result<CopyPlan> {
    if !path.exists() {
        return Err(crate::Error::PathNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let plan: CopyPlan = serde_json::from_str(&content)?;
    Ok(plan)
}

/// Default plan output path inside `dir`.
pub fn default_plan_path(dir: &Path) -> PathBuf {
    let filename = format!("plan_{}.json", Utc::now().format("%Y%m%d_%H%M%S"));
    dir.join(filename)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: usize, action: PlanAction, size: u64) -> PlanEntry {
        PlanEntry {
            id: RecordId(id),
            parent: None,
            source: PathBuf::from(format!("/src/{}.jpg", id)),
            destination: PathBuf::from(format!("/dst/{}.jpg", id)),
            action,
            classification: Classification::New,
            size,
            modified: Utc::now(),
            source_hash: None,
            reason: None,
        }
    }

    #[test]
    fn test_actionable_excludes_skips() {
        let plan = CopyPlan {
            entries: vec![
                entry(0, PlanAction::Copy, 10),
                entry(1, PlanAction::Skip, 20),
                entry(2, PlanAction::Rename, 30),
            ],
            ..Default::default()
        };
        assert_eq!(plan.actionable_count(), 2);
        assert_eq!(plan.total_bytes(), 40);
        assert!(plan.entry(RecordId(1)).is_some());
    }

    #[test]
    fn test_classification_serializes_snake_case() {
        let json = serde_json::to_string(&Classification::NameConflictDifferentContent).unwrap();
        assert_eq!(json, "\"name_conflict_different_content\"");
    }

    #[test]
    fn test_default_plan_path() {
        let path = default_plan_path(Path::new("/tmp/out"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("plan_"));
        assert!(name.ends_with(".json"));
    }
}
