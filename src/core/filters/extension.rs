//! Extension filter.

use super::{parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::FileRecord;
use crate::utils::fs::normalize_extension;
use crate::Result;
use serde::Deserialize;

pub const KIND: &str = "extension";
pub const PRIORITY: i32 = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    include_extensions: Vec<String>,
    exclude_extensions: Vec<String>,
}

/// Includes or excludes files by extension, case-insensitively.
#[derive(Debug)]
pub struct ExtensionFilter {
    name: String,
    priority: i32,
    include: Vec<String>,
    exclude: Vec<String>,
}

impl ExtensionFilter {
    /// Create a new extension filter. A leading dot is optional.
    pub fn new(include: &[&str], exclude: &[&str]) -> Self {
        Self {
            name: KIND.to_string(),
            priority: PRIORITY,
            include: include.iter().map(|e| normalize_extension(e)).collect(),
            exclude: exclude.iter().map(|e| normalize_extension(e)).collect(),
        }
    }

    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;
        Ok(Box::new(Self {
            name: name.to_string(),
            priority: spec.priority.unwrap_or(PRIORITY),
            include: options
                .include_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
            exclude: options
                .exclude_extensions
                .iter()
                .map(|e| normalize_extension(e))
                .collect(),
        }))
    }
}

impl Filter for ExtensionFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        let ext = normalize_extension(&record.extension);

        if self.exclude.contains(&ext) {
            return Ok(FilterDecision::exclude(format!("Excluded extension: {}", ext)));
        }
        if !self.include.is_empty() && !self.include.contains(&ext) {
            return Ok(FilterDecision::exclude(format!(
                "Not in included extensions: {}",
                ext
            )));
        }

        Ok(FilterDecision::include())
    }
}
