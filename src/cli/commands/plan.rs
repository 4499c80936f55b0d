//! Plan command implementation.
//!
//! Scans the source, runs the planner against the destination and saves the
//! resulting plan. Nothing is copied.

use crate::cli::args::RunArgs;
use crate::core::context::{RunContext, RunOptions};
use crate::core::planner::CopyPlanner;
use crate::models::config::{dirs_cache_path, AppConfig};
use crate::models::plan::{default_plan_path, save_plan};
use crate::models::preset::Preset;
use crate::Result;
use colored::Colorize;
use std::path::Path;
use std::sync::Arc;

/// Execute the plan command.
pub async fn plan(
    config: &AppConfig,
    preset: Preset,
    args: &RunArgs,
    output: Option<&Path>,
    skip_preflight: bool,
) -> Result<()> {
    println!("{}", "📋 Planning media ingest...".bold().cyan());
    println!();

    let destination = super::destination_root(args, &preset)?;

    println!("  {} {}", "Source:".bold(), args.source.display());
    println!("  {} {}", "Destination:".bold(), destination.display());
    println!("  {} {}", "Preset:".bold(), preset.name);
    println!("  {} {}", "Duplicates:".bold(), preset.duplicate_handling);
    println!();

    if !skip_preflight {
        super::run_preflight(args, &destination, &preset, &config.settings)?;
    }

    let records = super::discover(args)?;

    // `ask` is answered with skip while previewing.
    let ctx = RunContext::new(&destination, config.settings.clone())
        .with_options(RunOptions {
            dry_run: true,
            assume_yes: true,
            show_progress: false,
        })
        .with_cache(super::open_cache(&config.settings));
    let planner = CopyPlanner::new(preset, Arc::new(ctx))?;
    let mut run = planner.plan(records).await?;
    run.plan.dry_run = true;

    super::print_plan_summary(&run);
    println!();

    let output_path = match output {
        Some(o) => o.to_path_buf(),
        None => default_plan_path(&dirs_cache_path().join("plans")),
    };
    save_plan(&run.plan, &output_path)?;
    println!(
        "{} {}",
        "✅ Plan saved to:".bold().green(),
        output_path.display()
    );

    println!();
    println!("{}", "📝 Next Steps:".bold().yellow());
    println!(
        "  1. Review the plan: {}",
        format!("cat {}", output_path.display()).cyan()
    );
    println!(
        "  2. Copy the files: {}",
        format!(
            "media-ingest copy {} {} --preset {}",
            args.source.display(),
            destination.display(),
            planner.preset().name
        )
        .cyan()
    );

    Ok(())
}
