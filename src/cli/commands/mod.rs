//! CLI command implementations.

pub mod cache;
pub mod copy;
pub mod plan;
pub mod presets;

use crate::cli::args::RunArgs;
use crate::core::hash_cache::HashCache;
use crate::core::planner::PlannedRun;
use crate::core::scanner::{self, ScanOptions};
use crate::generators::pattern::{parse_filename_pattern, parse_folder_pattern};
use crate::models::config::{AppConfig, GlobalSettings};
use crate::models::plan::PlanAction;
use crate::models::preset::{load_preset, Preset};
use crate::models::record::FileRecord;
use crate::preflight;
use crate::Result;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Resolve the preset for a run: named or from file, then CLI overrides.
pub fn resolve_preset(config: &AppConfig, args: &RunArgs) -> Result<Preset> {
    let mut preset = match &args.preset_file {
        Some(path) => load_preset(path)?,
        None => config.preset(&args.preset)?,
    };

    if let Some(text) = &args.folder_structure {
        preset.folder_structure = parse_folder_pattern(text)?;
    }
    if let Some(text) = &args.filename_pattern {
        preset.file_name_pattern.components = parse_filename_pattern(text)?.components;
    }
    if let Some(text) = &args.duplicate_handling {
        preset.duplicate_handling = text.parse()?;
    }

    Ok(preset)
}

/// Destination root from the command line or the preset.
pub(crate) fn destination_root(args: &RunArgs, preset: &Preset) -> Result<PathBuf> {
    args.destination
        .clone()
        .or_else(|| preset.destination.clone())
        .ok_or_else(|| {
            crate::Error::InvalidPreset(format!(
                "{}: no destination given and the preset has none",
                preset.name
            ))
        })
}

/// Run preflight checks and fail if any of them fail.
pub(crate) fn run_preflight(
    args: &RunArgs,
    destination: &Path,
    preset: &Preset,
    settings: &GlobalSettings,
) -> Result<()> {
    println!("{}", "Running preflight checks...".bold());
    println!();

    let results = preflight::run_preflight_checks(&args.source, destination, preset, settings);
    preflight::print_results(&results);
    println!();

    if !preflight::all_passed(&results) {
        return Err(crate::Error::other(
            "Preflight checks failed. Fix the issues above and try again.",
        ));
    }
    Ok(())
}

/// Scan the source and attach manifest metadata.
pub(crate) fn discover(args: &RunArgs) -> Result<Vec<FileRecord>> {
    let options = ScanOptions {
        recursive: !args.non_recursive,
        include_hidden: args.include_hidden,
        device_type: args.device_type.clone(),
    };
    let scan = scanner::scan_directory(&args.source, &options)?;

    println!(
        "  {} {} files in {} folders ({})",
        "Scanned:".bold(),
        scan.records.len(),
        scan.total_dirs_scanned,
        format_bytes(scan.total_bytes())
    );
    if !scan.unreadable.is_empty() {
        println!(
            "  {} {} entries could not be read",
            "Unreadable:".bold().yellow(),
            scan.unreadable.len()
        );
    }

    let records = match &args.manifest {
        Some(path) => {
            let manifest = scanner::load_manifest(path)?;
            let (records, matched) = scanner::apply_manifest(scan.records, &manifest, &args.source);
            println!("  {} {} files", "Metadata:".bold(), matched);
            records
        }
        None => scan.records,
    };

    Ok(records)
}

/// Open the persistent hash cache, or an in-memory one when disabled.
pub(crate) fn open_cache(settings: &GlobalSettings) -> Arc<HashCache> {
    if !settings.cache_hashes {
        return Arc::new(HashCache::in_memory());
    }
    match HashCache::open(&settings.cache_path) {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            tracing::warn!(
                "Hash cache {:?} unavailable, using memory only: {}",
                settings.cache_path,
                e
            );
            Arc::new(HashCache::in_memory())
        }
    }
}

/// Print the summary of a planned run.
pub(crate) fn print_plan_summary(run: &PlannedRun) {
    let plan = &run.plan;
    let count = |action: PlanAction| plan.entries.iter().filter(|e| e.action == action).count();

    println!();
    println!("{}", "📋 Plan Summary".bold().green());
    println!("  {} {}", "To copy:".bold(), count(PlanAction::Copy));
    println!("  {} {}", "To rename:".bold(), count(PlanAction::Rename));
    println!("  {} {}", "To overwrite:".bold(), count(PlanAction::Overwrite));
    println!("  {} {}", "Duplicates:".bold(), plan.counters.duplicate);
    println!("  {} {}", "Skipped:".bold(), count(PlanAction::Skip));
    println!(
        "  {} {}",
        "Excluded by filters:".bold(),
        plan.counters.excluded_by_filter
    );
    println!("  {} {}", "Errors:".bold(), plan.counters.error);
    println!("  {} {}", "Total size:".bold(), format_bytes(plan.total_bytes()));

    let stats = &run.filter_stats;
    if stats.total > 0 && !stats.exclusion_by_filter.is_empty() {
        println!();
        println!(
            "{} {:.1}% included",
            "🔎 Filters:".bold(),
            stats.inclusion_rate()
        );
        for (filter, excluded) in &stats.exclusion_by_filter {
            println!("  {} {}", format!("{}:", filter).bold(), excluded);
        }
    }

    if !plan.errors.is_empty() {
        println!();
        println!("{}", "⚠️  Not planned:".bold().yellow());
        for error in &plan.errors {
            println!("  {} - {}", error.source.display().to_string().red(), error.message);
        }
    }
}

/// Human-readable byte count.
pub(crate) fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
