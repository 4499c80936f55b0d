//! Screenshot filter.
//!
//! Detection methods, tried in order: custom name patterns, built-in name
//! patterns, folder names, metadata text and known screen resolutions.
//! Only images are considered.

use super::{parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::{FileRecord, MediaType};
use crate::Result;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;

pub const KIND: &str = "screenshot";
pub const PRIORITY: i32 = 50;

const FILENAME_PATTERNS: &[&str] = &[
    r"^img_\d{4}\.png$",
    r"^screenshot.*\.png$",
    r"^screenshot_\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}.*\.png$",
    r"^スクリーンショット.*\.png$",
];

const PATH_PATTERNS: &[&str] = &[
    "/pictures/screenshots/",
    "/dcim/screenshots/",
    "/screenshot/",
    "/スクリーンショット/",
];

const IOS_RESOLUTIONS: &[(i64, i64)] = &[
    (1125, 2436),
    (1242, 2688),
    (828, 1792),
    (750, 1334),
    (1242, 2208),
    (640, 1136),
    (640, 960),
    (320, 480),
    (1668, 2388),
    (2048, 2732),
    (1536, 2048),
];

const ANDROID_RESOLUTIONS: &[(i64, i64)] = &[
    (1080, 1920),
    (1440, 2560),
    (1080, 2340),
    (720, 1280),
    (1080, 2160),
    (1440, 3120),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum DeviceType {
    #[default]
    #[serde(alias = "auto")]
    Auto,
    #[serde(rename = "iOS", alias = "ios")]
    Ios,
    #[serde(alias = "android")]
    Android,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Detection {
    enable_filename_pattern: bool,
    enable_path_pattern: bool,
    enable_metadata_pattern: bool,
    enable_resolution_detection: bool,
    custom_patterns: Vec<String>,
}

impl Default for Detection {
    fn default() -> Self {
        Self {
            enable_filename_pattern: true,
            enable_path_pattern: true,
            enable_metadata_pattern: true,
            enable_resolution_detection: true,
            custom_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    exclude_screenshots: bool,
    device_type: DeviceType,
    detection: Detection,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            exclude_screenshots: true,
            device_type: DeviceType::Auto,
            detection: Detection::default(),
        }
    }
}

/// Excludes screenshots.
#[derive(Debug)]
pub struct ScreenshotFilter {
    name: String,
    priority: i32,
    enabled: bool,
    device_type: DeviceType,
    detection: Detection,
    builtin: Vec<Regex>,
    custom: Vec<Regex>,
}

impl ScreenshotFilter {
    /// Create a new screenshot filter with every detection method on.
    pub fn new() -> Result<Self> {
        Self::from_options(KIND, PRIORITY, Options::default())
    }

    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;
        let priority = spec.priority.unwrap_or(PRIORITY);
        Ok(Box::new(Self::from_options(name, priority, options)?))
    }

    fn from_options(name: &str, priority: i32, options: Options) -> Result<Self> {
        let builtin = FILENAME_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let custom = options
            .detection
            .custom_patterns
            .iter()
            .map(|p| {
                RegexBuilder::new(&format!("^(?:{})", p))
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| {
                        crate::Error::InvalidPreset(format!("filter '{}': {}", name, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: name.to_string(),
            priority,
            enabled: options.exclude_screenshots,
            device_type: options.device_type,
            detection: options.detection,
            builtin,
            custom,
        })
    }

    /// Detection method that flags `record`, if any.
    pub fn detect(&self, record: &FileRecord) -> Option<&'static str> {
        let filename = record.original_filename.to_lowercase();

        if self.custom.iter().any(|r| r.is_match(&filename)) {
            return Some("custom_pattern");
        }
        if self.detection.enable_filename_pattern
            && self.builtin.iter().any(|r| r.is_match(&filename))
        {
            return Some("filename_pattern");
        }
        if self.detection.enable_path_pattern && self.matches_path(record) {
            return Some("path_pattern");
        }
        if self.detection.enable_metadata_pattern && self.matches_metadata(record) {
            return Some("metadata_pattern");
        }
        if self.detection.enable_resolution_detection && self.matches_resolution(record) {
            return Some("resolution_pattern");
        }
        None
    }

    fn matches_path(&self, record: &FileRecord) -> bool {
        let path = record
            .source_path
            .to_string_lossy()
            .to_lowercase()
            .replace('\\', "/");

        if path.contains("/pictures/") && !path.contains("/dcim/") && is_png(record) {
            return true;
        }
        PATH_PATTERNS.iter().any(|p| path.contains(p))
    }

    fn matches_metadata(&self, record: &FileRecord) -> bool {
        let text = |field: &str| {
            record
                .metadata_value(field)
                .map(|v| v.to_string().to_lowercase())
                .unwrap_or_default()
        };

        let description = text("image_description");
        if description.contains("screenshot") || description.contains("スクリーンショット") {
            return true;
        }
        if text("software").contains("screenshot") {
            return true;
        }

        record
            .device_type
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case("ios"))
            && is_png(record)
            && resolution_in(record, IOS_RESOLUTIONS)
    }

    fn matches_resolution(&self, record: &FileRecord) -> bool {
        if !is_png(record) {
            return false;
        }
        match self.device_type {
            DeviceType::Ios => resolution_in(record, IOS_RESOLUTIONS),
            DeviceType::Android => resolution_in(record, ANDROID_RESOLUTIONS),
            DeviceType::Auto => {
                resolution_in(record, IOS_RESOLUTIONS) || resolution_in(record, ANDROID_RESOLUTIONS)
            }
        }
    }
}

fn is_png(record: &FileRecord) -> bool {
    record.extension.eq_ignore_ascii_case("png")
}

/// Whether the record's dimensions match one of `table`, in either orientation.
fn resolution_in(record: &FileRecord, table: &[(i64, i64)]) -> bool {
    let dimension = |field: &str| record.metadata_value(field).and_then(|v| v.as_i64());
    let (Some(width), Some(height)) = (dimension("width"), dimension("height")) else {
        return false;
    };
    if width <= 0 || height <= 0 {
        return false;
    }
    table
        .iter()
        .any(|&(w, h)| (width == w && height == h) || (width == h && height == w))
}

impl Filter for ScreenshotFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        if !self.enabled || record.media_type != MediaType::Image {
            return Ok(FilterDecision::include());
        }

        match self.detect(record) {
            Some(method) => Ok(FilterDecision::exclude(format!(
                "Screenshot detected by {}",
                method
            ))
            .with_detail("detection_method", method)),
            None => Ok(FilterDecision::include()),
        }
    }
}
