//! Preset data model.
//!
//! A preset is a named, declarative recipe: where files go, what they are
//! called, how duplicates are treated, which sidecars travel along and which
//! filters apply. It is loaded once per run and only read afterwards.

use crate::core::filters::FilterRegistry;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Largest zero-pad width accepted for counters.
const MAX_DIGITS: usize = 18;

/// A named run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preset {
    /// Preset name.
    pub name: String,
    /// Free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Default destination root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    /// Destination folder levels.
    #[serde(default)]
    pub folder_structure: FolderStructure,
    /// Destination file name pattern.
    #[serde(default)]
    pub file_name_pattern: FileNamePattern,
    /// What to do with duplicates and name conflicts.
    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,
    /// Sidecar matching rules.
    #[serde(default)]
    pub associated_file_rules: AssociatedFileRules,
    /// Filter specs keyed by filter name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, FilterSpec>,
    /// Log level used when none is given on the command line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for Preset {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            description: Some("Year/month folders, original file names".to_string()),
            destination: None,
            folder_structure: FolderStructure::default(),
            file_name_pattern: FileNamePattern::default(),
            duplicate_handling: DuplicateHandling::default(),
            associated_file_rules: AssociatedFileRules::default(),
            filters: BTreeMap::new(),
            log_level: None,
        }
    }
}

/// One typed component of a folder or file name pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PatternComponent {
    /// Emit `value` verbatim.
    Literal { value: String },
    /// Look up a metadata field, optionally formatted.
    Metadata {
        #[serde(alias = "value")]
        field: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fallback: Option<String>,
    },
    /// The source file name, with or without its extension.
    OriginalFilename {
        #[serde(default)]
        include_extension: bool,
    },
    /// The source extension without the dot.
    OriginalExtension,
    /// A counter that is never reused within its scope.
    Sequence {
        #[serde(default = "default_sequence_digits")]
        digits: usize,
        #[serde(default)]
        scope: SequenceScope,
    },
}

impl PatternComponent {
    /// Shorthand for a literal component.
    pub fn literal(value: impl Into<String>) -> Self {
        PatternComponent::Literal {
            value: value.into(),
        }
    }

    /// Shorthand for a metadata component.
    pub fn metadata(field: impl Into<String>, format: Option<&str>) -> Self {
        PatternComponent::Metadata {
            field: field.into(),
            format: format.map(str::to_string),
            fallback: None,
        }
    }

    /// Whether this component already emits the file extension.
    pub fn emits_extension(&self) -> bool {
        matches!(
            self,
            PatternComponent::OriginalExtension
                | PatternComponent::OriginalFilename {
                    include_extension: true
                }
        )
    }
}

fn default_sequence_digits() -> usize {
    3
}

/// Scope of a sequence counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceScope {
    /// One counter for the whole run.
    #[default]
    Run,
    /// One counter per calendar day of the resolved date.
    Day,
}

/// One destination folder level.
///
/// Usually a single component; an array of components is concatenated into
/// one folder name (`{year}-{month}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FolderLevel {
    Single(PatternComponent),
    Composite(Vec<PatternComponent>),
}

impl FolderLevel {
    /// Components of this level, in order.
    pub fn components(&self) -> &[PatternComponent] {
        match self {
            FolderLevel::Single(c) => std::slice::from_ref(c),
            FolderLevel::Composite(cs) => cs,
        }
    }
}

impl From<PatternComponent> for FolderLevel {
    fn from(component: PatternComponent) -> Self {
        FolderLevel::Single(component)
    }
}

/// Folder structure: pattern levels joined by a separator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderStructure {
    #[serde(default)]
    pub levels: Vec<FolderLevel>,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl Default for FolderStructure {
    fn default() -> Self {
        Self {
            levels: vec![
                PatternComponent::metadata("year", None).into(),
                PatternComponent::metadata("month", Some("%02d")).into(),
            ],
            separator: default_separator(),
        }
    }
}

fn default_separator() -> String {
    "/".to_string()
}

/// File name pattern plus the rule for resolving name collisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileNamePattern {
    #[serde(default)]
    pub components: Vec<PatternComponent>,
    #[serde(default)]
    pub conflict_resolution: ConflictResolution,
}

impl FileNamePattern {
    /// Whether the pattern emits the extension itself.
    pub fn emits_extension(&self) -> bool {
        self.components.iter().any(PatternComponent::emits_extension)
    }
}

impl Default for FileNamePattern {
    fn default() -> Self {
        Self {
            components: vec![PatternComponent::OriginalFilename {
                include_extension: false,
            }],
            conflict_resolution: ConflictResolution::default(),
        }
    }
}

/// Collision resolution rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictResolution {
    #[serde(rename = "type", default)]
    pub strategy: ConflictStrategy,
    #[serde(default = "default_conflict_digits")]
    pub digits: usize,
    #[serde(default)]
    pub position: SuffixPosition,
}

impl Default for ConflictResolution {
    fn default() -> Self {
        Self {
            strategy: ConflictStrategy::default(),
            digits: default_conflict_digits(),
            position: SuffixPosition::default(),
        }
    }
}

fn default_conflict_digits() -> usize {
    1
}

/// How a colliding name is made unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// `name_1.ext`, `name_2.ext`, ...
    #[default]
    Sequence,
    /// `name_<modified time>.ext`, then numbered if that is taken too.
    Timestamp,
}

/// Where the collision suffix goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuffixPosition {
    #[default]
    #[serde(alias = "after_name")]
    BeforeExtension,
    AfterExtension,
}

/// Duplicate handling policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateHandling {
    Skip,
    Overwrite,
    #[default]
    Rename,
    Ask,
}

impl std::fmt::Display for DuplicateHandling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicateHandling::Skip => write!(f, "skip"),
            DuplicateHandling::Overwrite => write!(f, "overwrite"),
            DuplicateHandling::Rename => write!(f, "rename"),
            DuplicateHandling::Ask => write!(f, "ask"),
        }
    }
}

impl std::str::FromStr for DuplicateHandling {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(DuplicateHandling::Skip),
            "overwrite" => Ok(DuplicateHandling::Overwrite),
            "rename" => Ok(DuplicateHandling::Rename),
            "ask" => Ok(DuplicateHandling::Ask),
            other => Err(crate::Error::InvalidPreset(format!(
                "unknown duplicate handling '{}'",
                other
            ))),
        }
    }
}

/// Rules for finding sidecar and paired files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssociatedFileRules {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Sidecar extensions matched by base name.
    #[serde(default = "default_sidecar_extensions")]
    pub same_base_name: Vec<String>,
    /// Image extensions paired with a video of the same base name.
    #[serde(default = "default_pair_extensions")]
    pub video_to_image: Vec<String>,
    /// Extensions that count as video for pairing.
    #[serde(default = "default_video_extensions")]
    pub video_extensions: Vec<String>,
    #[serde(default)]
    pub custom_patterns: Vec<CustomPattern>,
    /// Run associated files through the filter chain too.
    #[serde(default)]
    pub apply_filters: bool,
}

impl Default for AssociatedFileRules {
    fn default() -> Self {
        Self {
            enabled: true,
            same_base_name: default_sidecar_extensions(),
            video_to_image: default_pair_extensions(),
            video_extensions: default_video_extensions(),
            custom_patterns: Vec::new(),
            apply_filters: false,
        }
    }
}

/// A custom association rule.
///
/// `main` is a regex over the main file name. `associated` is a regex over
/// candidate names in the same folder; `$1` / `${name}` refer to captures of
/// `main` and are substituted literally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPattern {
    pub main: String,
    pub associated: String,
}

fn default_true() -> bool {
    true
}

fn default_sidecar_extensions() -> Vec<String> {
    vec!["xmp".to_string(), "thm".to_string(), "aae".to_string()]
}

fn default_pair_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string()]
}

fn default_video_extensions() -> Vec<String> {
    ["mp4", "mov", "avi", "wmv", "m4v", "mts", "m2ts"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One filter entry of a preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Registered filter kind; defaults to the entry name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Overrides the kind's default priority.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i32>,
    /// Kind-specific options.
    #[serde(flatten)]
    pub options: serde_json::Map<String, serde_json::Value>,
}

impl FilterSpec {
    /// Create an enabled spec with the given options.
    pub fn new(options: serde_json::Value) -> Self {
        let options = match options {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            kind: None,
            enabled: true,
            priority: None,
            options,
        }
    }
}

impl Preset {
    /// Check the preset before planning.
    ///
    /// Pattern shape, regexes and filter kinds are all checked so a broken
    /// preset fails before any file is touched.
    pub fn validate(&self) -> Result<()> {
        self.validate_with(&FilterRegistry::with_builtins())
    }

    /// Validate against the filter kinds of `registry`.
    pub fn validate_with(&self, registry: &FilterRegistry) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(crate::Error::InvalidPreset("preset name is empty".to_string()));
        }
        if self.folder_structure.separator.is_empty() {
            return Err(crate::Error::InvalidPreset(format!(
                "{}: folder separator is empty",
                self.name
            )));
        }

        for component in self
            .folder_structure
            .levels
            .iter()
            .flat_map(FolderLevel::components)
            .chain(self.file_name_pattern.components.iter())
        {
            validate_component(&self.name, component)?;
        }

        let digits = self.file_name_pattern.conflict_resolution.digits;
        if digits == 0 || digits > MAX_DIGITS {
            return Err(crate::Error::InvalidPreset(format!(
                "{}: conflict digits must be between 1 and {}",
                self.name, MAX_DIGITS
            )));
        }

        for rule in &self.associated_file_rules.custom_patterns {
            regex::Regex::new(&rule.main)?;
            if rule.associated.trim().is_empty() {
                return Err(crate::Error::InvalidPreset(format!(
                    "{}: custom pattern for '{}' has no associated pattern",
                    self.name, rule.main
                )));
            }
        }

        registry.build_chain(&self.filters)?;

        Ok(())
    }
}

fn validate_component(preset: &str, component: &PatternComponent) -> Result<()> {
    match component {
        PatternComponent::Metadata { field, .. } if field.trim().is_empty() => Err(
            crate::Error::InvalidPreset(format!("{}: metadata component without field", preset)),
        ),
        PatternComponent::Sequence { digits, .. } if *digits == 0 || *digits > MAX_DIGITS => {
            Err(crate::Error::InvalidPreset(format!(
                "{}: sequence digits must be between 1 and {}",
                preset, MAX_DIGITS
            )))
        }
        _ => Ok(()),
    }
}

fn is_toml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("toml"))
}

/// Load a preset from a JSON or TOML file.
pub fn load_preset(path: &Path) -> Result<Preset> {
    if !path.exists() {
        return Err(crate::Error::PathNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let preset: Preset = if is_toml(path) {
        toml::from_str(&content)?
    } else {
        serde_json::from_str(&content)?
    };
    Ok(preset)
}

/// Save a preset as JSON or TOML, chosen by file extension.
pub fn save_preset(preset: &Preset, path: &Path) -> Result<()> {
    let content = if is_toml(path) {
        toml::to_string_pretty(preset)
            .map_err(|e| crate::Error::other(format!("Failed to encode preset: {}", e)))?
    } else {
        serde_json::to_string_pretty(preset)?
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::File::create(path)?;
    file.write_all(content.as_bytes())?;

    tracing::info!("Preset saved to {:?}", path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset() {
        let preset = Preset::default();
        assert_eq!(preset.duplicate_handling, DuplicateHandling::Rename);
        assert_eq!(preset.associated_file_rules.same_base_name, vec!["xmp", "thm", "aae"]);
        assert_eq!(preset.file_name_pattern.conflict_resolution.digits, 1);
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_parse_camel_case_schema() {
        let json = r#"{
            "name": "camera",
            "folderStructure": {
                "levels": [
                    {"type": "metadata", "field": "year"},
                    {"type": "metadata", "value": "month", "format": "%02d"},
                    [{"type": "literal", "value": "cam-"}, {"type": "metadata", "field": "make"}]
                ]
            },
            "fileNamePattern": {
                "components": [
                    {"type": "metadata", "field": "datetime", "format": "YYYYMMDD_HHMMSS"},
                    {"type": "literal", "value": "_"},
                    {"type": "original_filename", "includeExtension": true}
                ],
                "conflictResolution": {"type": "sequence", "digits": 2, "position": "before_extension"}
            },
            "duplicateHandling": "skip",
            "associatedFileRules": {"sameBaseName": ["aae"], "customPatterns": [{"main": "^(.+)\\.mp4$", "associated": "^$1\\.lrv$"}]},
            "filters": {
                "media_type": {"enabled": true, "priority": 5, "includeTypes": ["image"]}
            },
            "logLevel": "debug"
        }"#;

        let preset: Preset = serde_json::from_str(json).unwrap();
        assert_eq!(preset.folder_structure.levels.len(), 3);
        assert_eq!(
            preset.folder_structure.levels[1],
            FolderLevel::Single(PatternComponent::metadata("month", Some("%02d")))
        );
        assert_eq!(preset.folder_structure.levels[2].components().len(), 2);
        assert!(preset.file_name_pattern.emits_extension());
        assert_eq!(preset.file_name_pattern.conflict_resolution.digits, 2);
        assert_eq!(preset.duplicate_handling, DuplicateHandling::Skip);
        assert_eq!(preset.associated_file_rules.video_to_image, vec!["jpg", "jpeg"]);
        assert_eq!(preset.filters["media_type"].priority, Some(5));
        assert!(preset.filters["media_type"].options.contains_key("includeTypes"));
        assert!(preset.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_filter_kind() {
        let mut preset = Preset::default();
        preset
            .filters
            .insert("mystery".to_string(), FilterSpec::new(serde_json::json!({})));
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_regex() {
        let mut preset = Preset::default();
        preset.associated_file_rules.custom_patterns.push(CustomPattern {
            main: "(".to_string(),
            associated: "x".to_string(),
        });
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_duplicate_handling_from_str() {
        assert_eq!("ASK".parse::<DuplicateHandling>().unwrap(), DuplicateHandling::Ask);
        assert!("merge".parse::<DuplicateHandling>().is_err());
    }

    #[test]
    fn test_save_and_load_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("preset.toml");
        let mut preset = Preset::default();
        preset.name = "toml".to_string();
        preset.file_name_pattern.components.push(PatternComponent::Sequence {
            digits: 4,
            scope: SequenceScope::Day,
        });

        save_preset(&preset, &path).unwrap();
        let loaded = load_preset(&path).unwrap();
        assert_eq!(loaded, preset);
    }
}
