//! File name generator.

use crate::generators::pattern::{PatternResolver, SequenceState};
use crate::models::preset::FileNamePattern;
use crate::models::record::FileRecord;
use crate::Result;

/// Name used when a pattern resolves to nothing.
pub const EMPTY_NAME: &str = "file";

/// Device names Windows reserves regardless of extension.
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

fn is_reserved(base: &str) -> bool {
    RESERVED_NAMES.iter().any(|r| r.eq_ignore_ascii_case(base.trim_end()))
}

/// Sanitize a string for use as a file or folder name.
///
/// Characters illegal on common destination file systems become `_`;
/// surrounding whitespace and trailing dots are removed. Reserved device
/// names (`CON`, `NUL.txt`) get a `_` after the device part.
pub fn sanitize_filename(s: &str) -> String {
    let replaced: String = s
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();

    let trimmed = replaced.trim();
    if trimmed == "." || trimmed == ".." {
        return trimmed.to_string();
    }
    let cleaned = trimmed.trim_end_matches('.').trim_end();

    let (base, rest) = match cleaned.find('.') {
        Some(i) => cleaned.split_at(i),
        None => (cleaned, ""),
    };
    if is_reserved(base) {
        format!("{}_{}", base.trim_end(), rest)
    } else {
        cleaned.to_string()
    }
}

/// Generate the destination file name of `record`.
///
/// The source extension (original case) is appended unless the pattern
/// already emits it.
pub fn generate_filename(
    resolver: &PatternResolver,
    pattern: &FileNamePattern,
    record: &FileRecord,
    sequences: &mut SequenceState,
) -> Result<String> {
    let raw = resolver.resolve(&pattern.components, record, sequences)?;
    let mut stem = sanitize_filename(&raw);

    if stem.is_empty() || stem == "." || stem == ".." {
        stem = EMPTY_NAME.to_string();
    }

    if pattern.emits_extension() || record.extension.is_empty() {
        Ok(stem)
    } else {
        Ok(format!("{}.{}", stem, record.extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::pattern::parse_filename_pattern;
    use crate::models::preset::PatternComponent;
    use crate::models::record::{Metadata, RecordId};
    use chrono::{TimeZone, Utc};

    fn record(path: &str) -> FileRecord {
        let mut m = Metadata::new();
        m.insert("datetime".into(), "2023:10:27 15:30:00".into());
        FileRecord::new(
            RecordId(0),
            path,
            1,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        )
        .with_metadata(m)
    }

    fn generate(pattern: &FileNamePattern, path: &str) -> String {
        generate_filename(
            &PatternResolver::new(),
            pattern,
            &record(path),
            &mut SequenceState::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_scenario_name() {
        let pattern =
            parse_filename_pattern("{datetime:YYYYMMDD_HHMMSS}_{original_filename}").unwrap();
        assert_eq!(
            generate(&pattern, "/card/DSC00001.JPG"),
            "20231027_153000_DSC00001.JPG"
        );
    }

    #[test]
    fn test_pattern_with_extension_is_not_doubled() {
        let pattern = FileNamePattern {
            components: vec![PatternComponent::OriginalFilename {
                include_extension: true,
            }],
            ..Default::default()
        };
        assert_eq!(generate(&pattern, "/card/a.jpg"), "a.jpg");

        let pattern = parse_filename_pattern("{seq:4}.{ext}").unwrap();
        assert_eq!(generate(&pattern, "/card/a.mov"), "0001.mov");
    }

    #[test]
    fn test_empty_name_uses_default() {
        let pattern = parse_filename_pattern("{caption|}").unwrap();
        assert_eq!(generate(&pattern, "/card/a.jpg"), "file.jpg");
    }

    #[test]
    fn test_no_extension() {
        let pattern = parse_filename_pattern("{original_filename}").unwrap();
        assert_eq!(generate(&pattern, "/card/README"), "README");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("a<b>c:d"), "a_b_c_d");
        assert_eq!(sanitize_filename("  name. "), "name");
        assert_eq!(sanitize_filename(".."), "..");
    }

    #[test]
    fn test_sanitize_reserved_device_names() {
        assert_eq!(sanitize_filename("CON"), "CON_");
        assert_eq!(sanitize_filename("nul"), "nul_");
        assert_eq!(sanitize_filename("com1.jpg"), "com1_.jpg");
        assert_eq!(sanitize_filename("LPT9.tar.gz"), "LPT9_.tar.gz");
        assert_eq!(sanitize_filename("CONSOLE"), "CONSOLE");
        assert_eq!(sanitize_filename("COM10"), "COM10");
        assert_eq!(sanitize_filename("my_con"), "my_con");

        let pattern = parse_filename_pattern("{original_filename}").unwrap();
        assert_eq!(generate(&pattern, "/card/aux.jpg"), "aux_.jpg");
    }
}
