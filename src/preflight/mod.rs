//! Preflight checks module.
//!
//! Runs before planning so a run fails before any file is touched.

mod destination;
mod preset;
mod source;

use crate::models::config::GlobalSettings;
use crate::models::preset::Preset;
use colored::Colorize;
use std::path::Path;

/// Result of a preflight check.
#[derive(Debug)]
pub struct CheckResult {
    pub name: String,
    pub success: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl CheckResult {
    pub fn ok(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            message: message.to_string(),
            hint: None,
        }
    }

    pub fn fail(name: &str, message: &str, hint: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            message: message.to_string(),
            hint: Some(hint.to_string()),
        }
    }
}

/// Run all preflight checks.
pub fn run_preflight_checks(
    source: &Path,
    destination: &Path,
    preset: &Preset,
    settings: &GlobalSettings,
) -> Vec<CheckResult> {
    vec![
        source::check(source),
        destination::check(destination, source),
        preset::check(preset),
        destination::check_cache(settings),
    ]
}

/// Print preflight check results.
pub fn print_results(results: &[CheckResult]) {
    for result in results {
        if result.success {
            println!(
                "{} {}: {}",
                "[OK]".green(),
                result.name.bold(),
                result.message
            );
        } else {
            println!(
                "{} {}: {}",
                "[FAIL]".red(),
                result.name.bold(),
                result.message
            );
            if let Some(ref hint) = result.hint {
                println!("  {} {}", "->".yellow(), hint);
            }
        }
    }
}

/// Check if all preflight checks passed.
pub fn all_passed(results: &[CheckResult]) -> bool {
    results.iter().all(|r| r.success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checks_pass_for_valid_setup() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let settings = GlobalSettings {
            cache_hashes: false,
            ..Default::default()
        };
        let results = run_preflight_checks(
            src.path(),
            &dst.path().join("library"),
            &Preset::default(),
            &settings,
        );
        assert!(all_passed(&results), "{:?}", results);
    }

    #[test]
    fn test_missing_source_fails() {
        let dst = tempfile::tempdir().unwrap();
        let results = run_preflight_checks(
            Path::new("/nonexistent/card"),
            dst.path(),
            &Preset::default(),
            &GlobalSettings::default(),
        );
        assert!(!all_passed(&results));
        assert!(!results[0].success);
    }

    #[test]
    fn test_destination_inside_source_fails() {
        let src = tempfile::tempdir().unwrap();
        let result = destination::check(&src.path().join("out"), src.path());
        assert!(!result.success);
    }
}
