//! Date range filter.
//!
//! The file date comes from metadata (the configured field, then the usual
//! capture fields) and optionally from the modified time. A file whose date
//! cannot be determined is included.

use super::{parse_options, Filter, FilterDecision};
use crate::models::preset::FilterSpec;
use crate::models::record::{FileRecord, CAPTURE_DATETIME_FIELDS};
use crate::Result;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Deserialize;

pub const KIND: &str = "date_range";
pub const PRIORITY: i32 = 30;

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y:%m:%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y:%m:%d"];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Options {
    start_date: Option<String>,
    end_date: Option<String>,
    use_metadata_date: bool,
    use_file_modified_date: bool,
    date_field: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            use_metadata_date: true,
            use_file_modified_date: false,
            date_field: "datetime".to_string(),
        }
    }
}

/// Which end of the range a bound is.
#[derive(Clone, Copy)]
enum Bound {
    Start,
    End,
}

/// Parse a range bound. A date-only end bound covers the whole day.
fn parse_bound(text: &str, bound: Bound) -> Option<NaiveDateTime> {
    let text = text.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            let time = match bound {
                Bound::Start => NaiveTime::MIN,
                Bound::End => NaiveTime::from_hms_nano_opt(23, 59, 59, 999_999_999)?,
            };
            return Some(date.and_time(time));
        }
    }
    None
}

/// Keeps files whose date falls inside an inclusive range.
#[derive(Debug)]
pub struct DateRangeFilter {
    name: String,
    priority: i32,
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    use_metadata_date: bool,
    use_file_modified_date: bool,
    date_field: String,
}

impl DateRangeFilter {
    /// Create a new date range filter over metadata dates.
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        let options = Options::default();
        Self {
            name: KIND.to_string(),
            priority: PRIORITY,
            start,
            end,
            use_metadata_date: options.use_metadata_date,
            use_file_modified_date: options.use_file_modified_date,
            date_field: options.date_field,
        }
    }

    /// Fall back to the modified time when metadata has no date.
    pub fn with_modified_fallback(mut self, enabled: bool) -> Self {
        self.use_file_modified_date = enabled;
        self
    }

    pub(crate) fn build(name: &str, spec: &FilterSpec) -> Result<Box<dyn Filter>> {
        let options: Options = parse_options(name, spec)?;

        let parse = |text: &Option<String>, bound| -> Result<Option<NaiveDateTime>> {
            match text.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
                None => Ok(None),
                Some(t) => parse_bound(t, bound).map(Some).ok_or_else(|| {
                    crate::Error::InvalidPreset(format!(
                        "filter '{}': cannot parse date '{}'",
                        name, t
                    ))
                }),
            }
        };
        let start = parse(&options.start_date, Bound::Start)?;
        let end = parse(&options.end_date, Bound::End)?;

        if let (Some(s), Some(e)) = (start, end) {
            if s > e {
                return Err(crate::Error::InvalidPreset(format!(
                    "filter '{}': start date is after end date",
                    name
                )));
            }
        }

        Ok(Box::new(Self {
            name: name.to_string(),
            priority: spec.priority.unwrap_or(PRIORITY),
            start,
            end,
            use_metadata_date: options.use_metadata_date,
            use_file_modified_date: options.use_file_modified_date,
            date_field: options.date_field,
        }))
    }

    fn file_date(&self, record: &FileRecord) -> Option<NaiveDateTime> {
        if self.use_metadata_date {
            let found = std::iter::once(self.date_field.as_str())
                .chain(CAPTURE_DATETIME_FIELDS.iter().copied())
                .filter_map(|field| record.metadata_value(field))
                .find_map(|value| value.as_datetime());
            if found.is_some() {
                return found;
            }
        }
        if self.use_file_modified_date {
            return Some(record.modified.naive_utc());
        }
        None
    }
}

impl Filter for DateRangeFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn evaluate(&self, record: &FileRecord) -> Result<FilterDecision> {
        if self.start.is_none() && self.end.is_none() {
            return Ok(FilterDecision::include());
        }

        let Some(date) = self.file_date(record) else {
            return Ok(FilterDecision::include().with_detail("date", "unknown"));
        };

        if let Some(start) = self.start {
            if date < start {
                return Ok(FilterDecision::exclude(format!(
                    "File date {} is before start date {}",
                    date.format("%Y-%m-%d %H:%M:%S"),
                    start.format("%Y-%m-%d %H:%M:%S")
                )));
            }
        }
        if let Some(end) = self.end {
            if date > end {
                return Ok(FilterDecision::exclude(format!(
                    "File date {} is after end date {}",
                    date.format("%Y-%m-%d %H:%M:%S"),
                    end.format("%Y-%m-%d %H:%M:%S")
                )));
            }
        }

        Ok(FilterDecision::include().with_detail("date", date.format("%Y-%m-%d %H:%M:%S")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::{Metadata, RecordId};
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn record(datetime: Option<&str>) -> FileRecord {
        let mut m = Metadata::new();
        if let Some(dt) = datetime {
            m.insert("dateTimeOriginal".into(), dt.into());
        }
        FileRecord::new(
            RecordId(0),
            "/a.jpg",
            1,
            Utc.with_ymd_and_hms(2019, 6, 1, 12, 0, 0).unwrap(),
        )
        .with_metadata(m)
    }

    fn filter(options: serde_json::Value) -> Box<dyn Filter> {
        DateRangeFilter::build("date_range", &FilterSpec::new(options)).unwrap()
    }

    #[test]
    fn test_range_bounds() {
        let f = filter(json!({"startDate": "2023-01-01", "endDate": "2023-12-31"}));
        assert!(f.evaluate(&record(Some("2023:10:27 15:30:00"))).unwrap().include);

        let before = f.evaluate(&record(Some("2022:12:31 23:59:59"))).unwrap();
        assert!(!before.include);
        assert!(before.reason.unwrap().contains("before start date"));

        let after = f.evaluate(&record(Some("2024:01:01 00:00:00"))).unwrap();
        assert!(after.reason.unwrap().contains("after end date"));
    }

    #[test]
    fn test_date_only_end_is_inclusive() {
        let f = filter(json!({"endDate": "2023-12-31"}));
        assert!(f.evaluate(&record(Some("2023:12:31 23:59:59"))).unwrap().include);
    }

    #[test]
    fn test_unknown_date_included() {
        let f = filter(json!({"startDate": "2023-01-01"}));
        assert!(f.evaluate(&record(None)).unwrap().include);
    }

    #[test]
    fn test_modified_fallback() {
        let f = filter(json!({"startDate": "2023-01-01", "useFileModifiedDate": true}));
        assert!(!f.evaluate(&record(None)).unwrap().include);

        let f = DateRangeFilter::new(parse_bound("2023-01-01", Bound::Start), None)
            .with_modified_fallback(true);
        assert!(!f.evaluate(&record(None)).unwrap().include);
    }

    #[test]
    fn test_bad_dates_rejected() {
        let spec = FilterSpec::new(json!({"startDate": "yesterday"}));
        assert!(DateRangeFilter::build("date_range", &spec).is_err());

        let spec = FilterSpec::new(json!({"startDate": "2024-01-01", "endDate": "2023-01-01"}));
        assert!(DateRangeFilter::build("date_range", &spec).is_err());
    }
}
