//! File size filter.

use super::{parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::FileRecord;
use crate::Result;
use serde::Deserialize;

pub const KIND: &str = "file_size";
pub const PRIORITY: i32 = 40;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    #[serde(alias = "minFileSize")]
    min_size: u64,
    #[serde(alias = "maxFileSize")]
    max_size: Option<u64>,
}

/// Keeps files whose size lies within inclusive bounds, in bytes.
#[derive(Debug)]
pub struct FileSizeFilter {
    name: String,
    priority: i32,
    min: u64,
    max: Option<u64>,
}

impl FileSizeFilter {
    /// Create a new file size filter.
    pub fn new(min: u64, max: Option<u64>) -> Self {
        Self {
            name: KIND.to_string(),
            priority: PRIORITY,
            min,
            max,
        }
    }

    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;
        if options.max_size.is_some_and(|max| max < options.min_size) {
            return Err(crate::Error::InvalidPreset(format!(
                "filter '{}': maxSize is below minSize",
                name
            )));
        }
        Ok(Box::new(Self {
            name: name.to_string(),
            priority: spec.priority.unwrap_or(PRIORITY),
            min: options.min_size,
            max: options.max_size,
        }))
    }
}

impl Filter for FileSizeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        if record.size < self.min {
            return Ok(FilterDecision::exclude(format!(
                "File size {} is below minimum {}",
                record.size, self.min
            )));
        }
        if let Some(max) = self.max {
            if record.size > max {
                return Ok(FilterDecision::exclude(format!(
                    "File size {} is above maximum {}",
                    record.size, max
                )));
            }
        }
        Ok(FilterDecision::include())
    }
}
