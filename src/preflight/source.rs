//! Source folder check.

use super::CheckResult;
use std::path::Path;

pub fn check(source: &Path) -> CheckResult {
    match crate::utils::fs::ensure_directory(source) {
        Ok(()) => match std::fs::read_dir(source) {
            Ok(_) => CheckResult::ok("Source", &source.display().to_string()),
            Err(e) => CheckResult::fail(
                "Source",
                &format!("cannot read {}: {}", source.display(), e),
                "Check the folder permissions or remount the device",
            ),
        },
        Err(e) => CheckResult::fail(
            "Source",
            &e.to_string(),
            "Pass an existing folder or mounted device path",
        ),
    }
}
