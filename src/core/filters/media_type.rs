//! Media type filter.

use super::{parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::{FileRecord, MediaType};
use crate::Result;
use serde::Deserialize;

pub const KIND: &str = "media_type";
pub const PRIORITY: i32 = 10;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    include_types: Vec<MediaType>,
    exclude_types: Vec<MediaType>,
}

/// Includes or excludes files by media category. Exclusion is checked first.
#[derive(Debug)]
pub struct MediaTypeFilter {
    name: String,
    priority: i32,
    include: Vec<MediaType>,
    exclude: Vec<MediaType>,
}

impl MediaTypeFilter {
    /// Create a new media type filter.
    pub fn new(include: Vec<MediaType>, exclude: Vec<MediaType>) -> Self {
        Self {
            name: KIND.to_string(),
            priority: PRIORITY,
            include,
            exclude,
        }
    }

    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;
        Ok(Box::new(Self {
            name: name.to_string(),
            priority: spec.priority.unwrap_or(PRIORITY),
            include: options.include_types,
            exclude: options.exclude_types,
        }))
    }
}

impl Filter for MediaTypeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        let media_type = record.media_type;

        if self.exclude.contains(&media_type) {
            return Ok(FilterDecision::exclude(format!(
                "Excluded media type: {}",
                media_type
            )));
        }
        if !self.include.is_empty() && !self.include.contains(&media_type) {
            return Ok(FilterDecision::exclude(format!(
                "Not in included media types: {}",
                media_type
            )));
        }

        Ok(FilterDecision::include().with_detail("media_type", media_type))
    }
}
