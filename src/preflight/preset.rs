//! Preset check.

use super::CheckResult;
use crate::models::preset::Preset;

pub fn check(preset: &Preset) -> CheckResult {
    match preset.validate() {
        Ok(()) => CheckResult::ok(
            "Preset",
            &format!("{} ({} filters)", preset.name, preset.filters.len()),
        ),
        Err(e) => CheckResult::fail(
            "Preset",
            &e.to_string(),
            "Run `media-ingest presets validate` for details",
        ),
    }
}
