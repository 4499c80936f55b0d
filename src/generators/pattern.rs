//! Pattern resolution.
//!
//! Turns a list of [`PatternComponent`]s into a string for one file. Apart
//! from the sequence counters, resolution is a pure function of the
//! components and the record.

use crate::models::preset::{
    FileNamePattern, FolderLevel, FolderStructure, PatternComponent, SequenceScope,
};
use crate::models::record::{FileRecord, MetadataValue};
use crate::Result;
use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::OnceLock;

/// Fields derived from the captured datetime when not present verbatim.
pub const DATE_FIELDS: &[&str] = &[
    "year", "month", "day", "hour", "minute", "second", "date", "time", "datetime",
];

/// Sequence counters of one run.
///
/// Counters start at 1 and are never reused within their scope.
#[derive(Debug, Clone, Default)]
pub struct SequenceState {
    run: u64,
    days: HashMap<NaiveDate, u64>,
}

impl SequenceState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state whose run counter continues after `last`.
    pub fn starting_after(last: u64) -> Self {
        Self {
            run: last,
            days: HashMap::new(),
        }
    }

    /// Take the next value for `scope`.
    pub fn next(&mut self, scope: SequenceScope, day: NaiveDate) -> u64 {
        match scope {
            SequenceScope::Run => {
                self.run += 1;
                self.run
            }
            SequenceScope::Day => {
                let counter = self.days.entry(day).or_insert(0);
                *counter += 1;
                *counter
            }
        }
    }
}

/// Evaluates pattern components against a file record.
#[derive(Debug, Clone)]
pub struct PatternResolver {
    placeholder: Option<String>,
    modified_fallback: bool,
}

impl Default for PatternResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl PatternResolver {
    /// Create a resolver that substitutes `Unknown` for missing fields and
    /// falls back to the file-modified time for dates.
    pub fn new() -> Self {
        Self {
            placeholder: Some("Unknown".to_string()),
            modified_fallback: true,
        }
    }

    /// Create a resolver that fails on missing fields instead of substituting.
    pub fn strict() -> Self {
        Self {
            placeholder: None,
            modified_fallback: false,
        }
    }

    /// Set the placeholder for missing fields (`None` makes them errors).
    pub fn with_placeholder(mut self, placeholder: Option<String>) -> Self {
        self.placeholder = placeholder;
        self
    }

    /// Enable or disable the file-modified-time fallback for date fields.
    pub fn with_modified_fallback(mut self, enabled: bool) -> Self {
        self.modified_fallback = enabled;
        self
    }

    /// Resolve `components` into one string.
    pub fn resolve(
        &self,
        components: &[PatternComponent],
        record: &FileRecord,
        sequences: &mut SequenceState,
    ) -> Result<String> {
        let mut out = String::new();
        for component in components {
            out.push_str(&self.resolve_component(component, record, sequences)?);
        }
        Ok(out)
    }

    fn resolve_component(
        &self,
        component: &PatternComponent,
        record: &FileRecord,
        sequences: &mut SequenceState,
    ) -> Result<String> {
        match component {
            PatternComponent::Literal { value } => Ok(value.clone()),
            PatternComponent::Metadata {
                field,
                format,
                fallback,
            } => match self.lookup(record, field) {
                Some(value) => render_value(field, &value, format.as_deref()),
                None => {
                    if let Some(fallback) = fallback {
                        return Ok(fallback.clone());
                    }
                    match &self.placeholder {
                        Some(placeholder) => {
                            tracing::debug!(
                                "Missing field '{}' for {}, using '{}'",
                                field,
                                record.original_filename,
                                placeholder
                            );
                            Ok(placeholder.clone())
                        }
                        None => Err(crate::Error::MissingMetadata {
                            field: field.clone(),
                        }),
                    }
                }
            },
            PatternComponent::OriginalFilename { include_extension } => {
                if *include_extension {
                    Ok(record.original_filename.clone())
                } else {
                    Ok(record.base_name.clone())
                }
            }
            PatternComponent::OriginalExtension => Ok(record.extension.clone()),
            PatternComponent::Sequence { digits, scope } => {
                let day = self
                    .record_datetime(record)
                    .unwrap_or_else(|| record.modified.naive_utc())
                    .date();
                let value = sequences.next(*scope, day);
                Ok(format!("{:0width$}", value, width = *digits))
            }
        }
    }

    /// Captured datetime, or the modified time when the fallback is enabled.
    pub fn record_datetime(&self, record: &FileRecord) -> Option<NaiveDateTime> {
        record.captured_datetime().or_else(|| {
            self.modified_fallback
                .then(|| record.modified.naive_utc())
        })
    }

    fn lookup(&self, record: &FileRecord, field: &str) -> Option<MetadataValue> {
        if let Some(value) = record.metadata_value(field) {
            return Some(value.clone());
        }
        if !DATE_FIELDS.contains(&field) {
            return None;
        }

        let dt = self.record_datetime(record)?;
        let value = match field {
            "year" => MetadataValue::Integer(dt.year() as i64),
            "month" => MetadataValue::Integer(dt.month() as i64),
            "day" => MetadataValue::Integer(dt.day() as i64),
            "hour" => MetadataValue::Integer(dt.hour() as i64),
            "minute" => MetadataValue::Integer(dt.minute() as i64),
            "second" => MetadataValue::Integer(dt.second() as i64),
            "date" | "time" | "datetime" => MetadataValue::DateTime(dt),
            _ => return None,
        };
        Some(value)
    }
}

fn printf_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"%(0?)(\d*)(?:\.(\d+))?([difsx])").ok())
        .as_ref()
}

/// Whether `format` is a printf-style numeric format rather than a date format.
fn is_printf(format: &str) -> bool {
    let Some(re) = printf_regex() else {
        return false;
    };
    if !re.is_match(format) {
        return false;
    }
    let rest = re.replace_all(format, "");
    !rest
        .split('%')
        .skip(1)
        .any(|tail| tail.chars().next().is_some_and(|c| c.is_ascii_alphabetic()))
}

/// Render a value with an optional format.
fn render_value(field: &str, value: &MetadataValue, format: Option<&str>) -> Result<String> {
    let printf = format.is_some_and(is_printf);

    let datetime = match value {
        MetadataValue::DateTime(dt) => Some(*dt),
        MetadataValue::Text(_) if !printf => value.as_datetime(),
        _ => None,
    };

    if let Some(dt) = datetime {
        let format = match format {
            Some(f) if f.contains('%') => f.to_string(),
            Some(f) => token_format_to_strftime(f),
            None => default_date_format(field).to_string(),
        };
        return format_datetime(&dt, &format);
    }

    match format {
        Some(f) if printf => Ok(apply_printf(f, value)),
        _ => Ok(value.to_string()),
    }
}

fn default_date_format(field: &str) -> &'static str {
    match field {
        "date" => "%Y-%m-%d",
        "time" => "%H%M%S",
        _ => "%Y%m%d_%H%M%S",
    }
}

fn format_datetime(dt: &NaiveDateTime, format: &str) -> Result<String> {
    let mut out = String::new();
    write!(out, "{}", dt.format(format))
        .map_err(|_| crate::Error::InvalidPattern(format!("bad date format '{}'", format)))?;
    Ok(out)
}

/// Apply the first printf-style conversion in `format` to `value`.
fn apply_printf(format: &str, value: &MetadataValue) -> String {
    let Some(caps) = printf_regex().and_then(|re| re.captures(format)) else {
        return value.to_string();
    };

    let zero = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
    let width: usize = caps
        .get(2)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0);
    let precision: Option<usize> = caps.get(3).and_then(|m| m.as_str().parse().ok());
    let conversion = caps.get(4).map(|m| m.as_str()).unwrap_or("s");

    let rendered = match conversion {
        "d" | "i" => match value.as_i64().or_else(|| value.as_f64().map(|f| f as i64)) {
            Some(n) if zero => format!("{:0width$}", n, width = width),
            Some(n) => format!("{:width$}", n, width = width),
            None => value.to_string(),
        },
        "x" => match value.as_i64() {
            Some(n) if zero => format!("{:0width$x}", n, width = width),
            Some(n) => format!("{:width$x}", n, width = width),
            None => value.to_string(),
        },
        "f" => match value.as_f64() {
            Some(f) => {
                let precision = precision.unwrap_or(6);
                if zero {
                    format!("{:0width$.prec$}", f, width = width, prec = precision)
                } else {
                    format!("{:width$.prec$}", f, width = width, prec = precision)
                }
            }
            None => value.to_string(),
        },
        _ => format!("{:width$}", value.to_string(), width = width),
    };

    let range = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
    format!("{}{}{}", &format[..range.start], rendered, &format[range.end..])
}

/// Convert a token date format (`YYYYMMDD_HHMMSS`) to strftime.
///
/// `MM` means minutes when the previous token was an hour, otherwise month.
/// `mm` is always minutes.
pub fn token_format_to_strftime(format: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("YY", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("SS", "%S"),
        ("ss", "%S"),
    ];

    let mut out = String::new();
    let mut rest = format;
    let mut after_hour = false;

    'outer: while !rest.is_empty() {
        for (token, spec) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                let spec = if *token == "MM" && after_hour { "%M" } else { spec };
                after_hour = matches!(*token, "HH" | "hh");
                out.push_str(spec);
                rest = tail;
                continue 'outer;
            }
        }

        let Some(c) = rest.chars().next() else {
            break;
        };
        if c == '%' {
            out.push_str("%%");
        } else {
            out.push(c);
        }
        rest = &rest[c.len_utf8()..];
    }

    out
}

/// Parse compact pattern text (`{year}-{month:%02d}_{seq:3}`) into components.
pub fn parse_pattern(text: &str) -> Result<Vec<PatternComponent>> {
    let mut components = Vec::new();
    let mut literal = String::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        match c {
            '{' => {
                let Some(end) = text[start..].find('}').map(|i| start + i) else {
                    return Err(crate::Error::InvalidPattern(format!(
                        "unclosed '{{' in '{}'",
                        text
                    )));
                };
                if !literal.is_empty() {
                    components.push(PatternComponent::literal(std::mem::take(&mut literal)));
                }
                components.push(parse_placeholder(&text[start + 1..end])?);
                while chars.peek().is_some_and(|(i, _)| *i <= end) {
                    chars.next();
                }
            }
            '}' => {
                return Err(crate::Error::InvalidPattern(format!(
                    "unexpected '}}' in '{}'",
                    text
                )));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        components.push(PatternComponent::literal(literal));
    }
    Ok(components)
}

fn parse_placeholder(body: &str) -> Result<PatternComponent> {
    let (body, fallback) = match body.split_once('|') {
        Some((b, f)) => (b, Some(f.to_string())),
        None => (body, None),
    };
    let (name, spec) = match body.split_once(':') {
        Some((n, s)) => (n.trim(), Some(s)),
        None => (body.trim(), None),
    };

    if name.is_empty() {
        return Err(crate::Error::InvalidPattern("empty placeholder '{}'".to_string()));
    }

    let component = match name {
        "original_filename" | "filename" | "original_name" | "name" => {
            PatternComponent::OriginalFilename {
                include_extension: spec.is_some_and(|s| s == "ext"),
            }
        }
        "original_extension" | "ext" | "extension" => PatternComponent::OriginalExtension,
        "seq" | "sequence" => {
            let mut parts = spec.unwrap_or("").split(':');
            let digits = match parts.next().filter(|s| !s.is_empty()) {
                Some(d) => d.parse().map_err(|_| {
                    crate::Error::InvalidPattern(format!("bad sequence digits '{}'", d))
                })?,
                None => 3,
            };
            let scope = match parts.next() {
                Some("day") => SequenceScope::Day,
                Some("run") | None => SequenceScope::Run,
                Some(other) => {
                    return Err(crate::Error::InvalidPattern(format!(
                        "unknown sequence scope '{}'",
                        other
                    )))
                }
            };
            PatternComponent::Sequence { digits, scope }
        }
        field => PatternComponent::Metadata {
            field: field.to_string(),
            format: spec.map(str::to_string),
            fallback,
        },
    };

    Ok(component)
}

/// Split `text` on `/` outside of braces.
fn split_levels(text: &str) -> Vec<&str> {
    let mut levels = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '/' | '\\' if depth == 0 => {
                levels.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    levels.push(&text[start..]);
    levels
}

/// Parse a compact folder pattern such as `{year}/{month:%02d}`.
pub fn parse_folder_pattern(text: &str) -> Result<FolderStructure> {
    let mut levels = Vec::new();
    for segment in split_levels(text) {
        if segment.trim().is_empty() {
            continue;
        }
        let mut components = parse_pattern(segment)?;
        if components.len() == 1 {
            if let Some(component) = components.pop() {
                levels.push(FolderLevel::Single(component));
            }
        } else {
            levels.push(FolderLevel::Composite(components));
        }
    }
    Ok(FolderStructure {
        levels,
        separator: "/".to_string(),
    })
}

/// Parse a compact file name pattern such as `{datetime:YYYYMMDD_HHMMSS}_{original_filename}`.
pub fn parse_filename_pattern(text: &str) -> Result<FileNamePattern> {
    Ok(FileNamePattern {
        components: parse_pattern(text)?,
        ..Default::default()
    })
}
