//! Presets command implementation.

use crate::core::filters::FilterRegistry;
use crate::models::config::AppConfig;
use crate::models::preset::{load_preset, Preset};
use crate::Result;
use colored::Colorize;
use std::path::Path;

/// List the built-in and configured presets.
pub fn list_presets(config: &AppConfig) -> Result<()> {
    println!("{}", "📚 Presets".bold().cyan());
    println!();

    let mut presets: Vec<Preset> = config.presets.clone();
    if !presets.iter().any(|p| p.name.eq_ignore_ascii_case("default")) {
        presets.insert(0, Preset::default());
    }

    for preset in &presets {
        println!(
            "  {} {}",
            preset.name.bold(),
            preset.description.as_deref().unwrap_or("").dimmed()
        );
        println!(
            "    duplicates: {}, filters: {}, destination: {}",
            preset.duplicate_handling,
            preset.filters.len(),
            preset
                .destination
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "-".to_string())
        );
    }

    Ok(())
}

/// Print one preset as JSON.
pub fn show_preset(config: &AppConfig, name: &str) -> Result<()> {
    let preset = config.preset(name)?;
    println!("{}", serde_json::to_string_pretty(&preset)?);
    Ok(())
}

/// Validate a preset file.
pub fn validate_preset(path: &Path) -> Result<()> {
    let preset = load_preset(path)?;

    match preset.validate() {
        Ok(()) => {
            println!(
                "{} {}: {}",
                "[OK]".green(),
                preset.name.bold(),
                path.display()
            );
            let chain = FilterRegistry::with_builtins().build_chain(&preset.filters)?;
            if !chain.is_empty() {
                println!("  {} {}", "Filters:".bold(), chain.names().join(", "));
            }
            Ok(())
        }
        Err(e) => {
            println!("{} {}: {}", "[FAIL]".red(), preset.name.bold(), e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_preset_file() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("phone.json");
        std::fs::write(
            &good,
            r#"{
                "name": "phone",
                "duplicateHandling": "skip",
                "filters": { "screenshot": { "enabled": true } }
            }"#,
        )
        .unwrap();
        assert!(validate_preset(&good).is_ok());

        let bad = dir.path().join("bad.json");
        std::fs::write(
            &bad,
            r#"{ "name": "bad", "filters": { "sharpness": { "enabled": true } } }"#,
        )
        .unwrap();
        assert!(validate_preset(&bad).is_err());
    }

    #[test]
    fn test_show_unknown_preset_fails() {
        assert!(show_preset(&AppConfig::default(), "missing").is_err());
        assert!(show_preset(&AppConfig::default(), "default").is_ok());
    }
}
