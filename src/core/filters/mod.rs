//! Filter chain.
//!
//! Filters decide whether a discovered file takes part in the run. They run
//! in ascending priority order and the first exclusion wins. A filter that
//! fails is logged and treated as including the file.

pub mod date_range;
pub mod extension;
pub mod file_size;
pub mod media_type;
pub mod name_pattern;
pub mod screenshot;

use crate::models::preset::FilterSpec;
use crate::models::record::FileRecord;
use crate::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

pub use date_range::DateRangeFilter;
pub use extension::ExtensionFilter;
pub use file_size::FileSizeFilter;
pub use media_type::MediaTypeFilter;
pub use name_pattern::NamePatternFilter;
pub use screenshot::ScreenshotFilter;

/// Outcome of one filter for one file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterDecision {
    pub include: bool,
    pub reason: Option<String>,
    /// Side-channel facts for statistics.
    pub details: BTreeMap<String, String>,
}

impl FilterDecision {
    /// Include the file.
    pub fn include() -> Self {
        Self {
            include: true,
            ..Default::default()
        }
    }

    /// Exclude the file with a reason.
    pub fn exclude(reason: impl Into<String>) -> Self {
        Self {
            include: false,
            reason: Some(reason.into()),
            details: BTreeMap::new(),
        }
    }

    /// Attach a detail.
    pub fn with_detail(mut self, key: &str, value: impl ToString) -> Self {
        self.details.insert(key.to_string(), value.to_string());
        self
    }
}

/// A pure include/exclude predicate over a file record.
pub trait Filter: Send + Sync {
    /// Name of this filter instance, as used in plans and statistics.
    fn name(&self) -> &str;

    /// Lower runs first.
    fn priority(&self) -> i32;

    /// Decide about one file.
    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision>;
}

/// Verdict of the whole chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainVerdict {
    Included,
    Excluded { filter: String, reason: String },
}

impl ChainVerdict {
    pub fn is_included(&self) -> bool {
        matches!(self, ChainVerdict::Included)
    }
}

/// Counters collected while the chain runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FilterStats {
    pub total: usize,
    pub included: usize,
    pub excluded: usize,
    /// Filter failures that were treated as inclusion.
    pub errors: usize,
    pub exclusion_by_filter: BTreeMap<String, usize>,
}

impl FilterStats {
    /// Share of evaluated files that were included, in percent.
    pub fn inclusion_rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.included as f64 / self.total as f64 * 100.0
    }
}

/// Ordered set of filters.
#[derive(Default)]
pub struct FilterChain {
    filters: Vec<Box<dyn Filter>>,
    stats: Mutex<FilterStats>,
}

impl std::fmt::Debug for FilterChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterChain")
            .field("filters", &self.names())
            .finish()
    }
}

impl FilterChain {
    /// Create an empty chain that includes everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, keeping the chain ordered by priority then name.
    pub fn add(&mut self, filter: Box<dyn Filter>) {
        self.filters.push(filter);
        self.filters
            .sort_by(|a, b| (a.priority(), a.name()).cmp(&(b.priority(), b.name())));
    }

    /// Filter names in evaluation order.
    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|f| f.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Run every filter against `record` until one excludes it.
    pub fn evaluate(&self, record: &FileRecord) -> ChainVerdict {
        let mut failures = 0;
        let mut verdict = ChainVerdict::Included;

        for filter in &self.filters {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| filter.evaluate(record)))
                .unwrap_or_else(|_| {
                    Err(crate::Error::FilterInternal {
                        filter: filter.name().to_string(),
                        message: "filter panicked".to_string(),
                    })
                });
            match outcome {
                Ok(decision) if decision.include => {}
                Ok(decision) => {
                    let reason = decision
                        .reason
                        .unwrap_or_else(|| format!("Excluded by {}", filter.name()));
                    tracing::debug!(
                        "Excluded {} by {}: {}",
                        record.source_path.display(),
                        filter.name(),
                        reason
                    );
                    verdict = ChainVerdict::Excluded {
                        filter: filter.name().to_string(),
                        reason,
                    };
                    break;
                }
                Err(e) => {
                    failures += 1;
                    tracing::warn!(
                        "Filter {} failed on {}, including file: {}",
                        filter.name(),
                        record.source_path.display(),
                        e
                    );
                }
            }
        }

        let mut stats = self.stats.lock().unwrap_or_else(|e| e.into_inner());
        stats.total += 1;
        stats.errors += failures;
        match &verdict {
            ChainVerdict::Included => stats.included += 1,
            ChainVerdict::Excluded { filter, .. } => {
                stats.excluded += 1;
                *stats.exclusion_by_filter.entry(filter.clone()).or_insert(0) += 1;
            }
        }

        verdict
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> FilterStats {
        self.stats.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Builds a filter from its instance name and preset entry.
pub type FilterConstructor = fn(&str, &FilterSpec) -> Result<Box<dyn Filter>>;

/// Registry of filter kinds.
pub struct FilterRegistry {
    constructors: BTreeMap<String, FilterConstructor>,
}

impl FilterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Create a registry with every built-in kind.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(media_type::KIND, MediaTypeFilter::build);
        registry.register(extension::KIND, ExtensionFilter::build);
        registry.register(date_range::KIND, DateRangeFilter::build);
        registry.register(file_size::KIND, FileSizeFilter::build);
        registry.register(screenshot::KIND, ScreenshotFilter::build);
        registry.register(name_pattern::KIND, NamePatternFilter::build);
        registry
    }

    /// Register (or replace) a filter kind.
    pub fn register(&mut self, kind: &str, constructor: FilterConstructor) {
        self.constructors.insert(kind.to_string(), constructor);
    }

    /// Registered kinds.
    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(|k| k.as_str()).collect()
    }

    /// Create one filter. The kind defaults to the entry name.
    pub fn create(&self, name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let kind = spec.kind.as_deref().unwrap_or(name);
        let constructor = self.constructors.get(kind).ok_or_else(|| {
            crate::Error::InvalidPreset(format!(
                "unknown filter kind '{}' (known: {})",
                kind,
                self.kinds().join(", ")
            ))
        })?;
        constructor(name, spec)
    }

    /// Build the chain of every enabled entry.
    pub fn build_chain(&self, specs: &BTreeMap<String, FilterSpec>) -> Result<FilterChain> {
        let mut chain = FilterChain::new();
        for (name, spec) in specs {
            if !spec.enabled {
                tracing::debug!("Filter {} disabled", name);
                continue;
            }
            chain.add(self.create(name, spec)?);
        }
        Ok(chain)
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

/// Decode the kind-specific options of a preset entry.
pub(crate) fn parse_options<T: DeserializeOwned>(name: &str, spec: &FilterSpec) -> Result<T> {
    serde_json::from_value(serde_json::Value::Object(spec.options.clone())).map_err(|e| {
        crate::Error::InvalidPreset(format!("filter '{}': {}", name, e))
    })
}

/// Compile a list of user regexes, case-insensitively.
pub(crate) fn compile_patterns(name: &str, patterns: &[String]) -> Result<Vec<regex::Regex>> {
    patterns
        .iter()
        .map(|p| {
            regex::RegexBuilder::new(p)
                .case_insensitive(true)
                .build()
                .map_err(|e| crate::Error::InvalidPreset(format!("filter '{}': {}", name, e)))
        })
        .collect()
}
