//! Destination and hash cache checks.

use super::CheckResult;
use crate::models::config::GlobalSettings;
use std::fs;
use std::path::Path;

/// The destination must be creatable, writable and outside the source.
pub fn check(destination: &Path, source: &Path) -> CheckResult {
    let inside_source = match (destination.canonicalize(), source.canonicalize()) {
        (Ok(d), Ok(s)) => d.starts_with(s),
        (Err(_), Ok(s)) => destination.starts_with(&s) || destination.starts_with(source),
        _ => destination.starts_with(source),
    };
    if inside_source {
        return CheckResult::fail(
            "Destination",
            &format!("{} is inside the source folder", destination.display()),
            "Choose a destination outside the source",
        );
    }

    if let Err(e) = fs::create_dir_all(destination) {
        return CheckResult::fail(
            "Destination",
            &format!("cannot create {}: {}", destination.display(), e),
            "Check that the drive is mounted and writable",
        );
    }

    let probe = destination.join(format!(".media_ingest_probe_{}", std::process::id()));
    match fs::write(&probe, b"") {
        Ok(()) => {
            let _ = fs::remove_file(&probe);
            CheckResult::ok("Destination", &destination.display().to_string())
        }
        Err(e) => CheckResult::fail(
            "Destination",
            &format!("{} is not writable: {}", destination.display(), e),
            "Check the folder permissions",
        ),
    }
}

/// The hash cache folder must be writable when caching is on.
pub fn check_cache(settings: &GlobalSettings) -> CheckResult {
    if !settings.cache_hashes {
        return CheckResult::ok("Hash cache", "disabled");
    }
    let Some(parent) = settings.cache_path.parent() else {
        return CheckResult::ok("Hash cache", &settings.cache_path.display().to_string());
    };
    match fs::create_dir_all(parent) {
        Ok(()) => CheckResult::ok("Hash cache", &settings.cache_path.display().to_string()),
        Err(e) => CheckResult::fail(
            "Hash cache",
            &format!("cannot create {}: {}", parent.display(), e),
            "Set cache_path in config.toml or disable cache_hashes",
        ),
    }
}
