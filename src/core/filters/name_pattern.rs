//! Name and path pattern filter.

use super::{compile_patterns, parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::FileRecord;
use crate::Result;
use regex::Regex;
use serde::Deserialize;

pub const KIND: &str = "name_pattern";
pub const PRIORITY: i32 = 60;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    exclude_by_filename: Vec<String>,
    exclude_by_path: Vec<String>,
    include_by_filename: Vec<String>,
}

/// Excludes files whose name or path matches a regex (searched anywhere,
/// case-insensitive). Paths are matched with `/` separators.
#[derive(Debug)]
pub struct NamePatternFilter {
    name: String,
    priority: i32,
    exclude_filename: Vec<Regex>,
    exclude_path: Vec<Regex>,
    include_filename: Vec<Regex>,
}

impl NamePatternFilter {
    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;
        Ok(Box::new(Self {
            name: name.to_string(),
            priority: spec.priority.unwrap_or(PRIORITY),
            exclude_filename: compile_patterns(name, &options.exclude_by_filename)?,
            exclude_path: compile_patterns(name, &options.exclude_by_path)?,
            include_filename: compile_patterns(name, &options.include_by_filename)?,
        }))
    }
}

impl Filter for NamePatternFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        let filename = &record.original_filename;
        if let Some(r) = self.exclude_filename.iter().find(|r| r.is_match(filename)) {
            return Ok(FilterDecision::exclude(format!(
                "File name matches excluded pattern {}",
                r.as_str()
            )));
        }

        let path = record.source_path.to_string_lossy().replace('\\', "/");
        if let Some(r) = self.exclude_path.iter().find(|r| r.is_match(&path)) {
            return Ok(FilterDecision::exclude(format!(
                "Path matches excluded pattern {}",
                r.as_str()
            )));
        }

        if !self.include_filename.is_empty()
            && !self.include_filename.iter().any(|r| r.is_match(filename))
        {
            return Ok(FilterDecision::exclude(
                "File name matches no included pattern",
            ));
        }

        Ok(FilterDecision::include())
    }
}
