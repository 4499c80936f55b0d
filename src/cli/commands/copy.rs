//! Copy command implementation.
//!
//! Plans the run, then copies every actionable entry. Ctrl-C stops the run
//! cleanly: queued files are reported as cancelled and no partial files are
//! left in the destination.

use crate::cli::args::RunArgs;
use crate::core::context::{CancelFlag, RunContext, RunOptions};
use crate::core::decision::{AutoDecision, DecisionProvider, PromptDecision};
use crate::core::executor::{CopyExecutor, ExecutionReport, ItemResult, RunOutcome};
use crate::core::planner::CopyPlanner;
use crate::models::config::AppConfig;
use crate::models::plan::{CopyPlan, PlanAction};
use crate::models::preset::Preset;
use crate::Result;
use colored::Colorize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Switches of the copy command.
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyFlags {
    pub dry_run: bool,
    pub assume_yes: bool,
    pub skip_preflight: bool,
}

/// Execute the copy command.
pub async fn copy(
    config: &AppConfig,
    preset: Preset,
    args: &RunArgs,
    flags: CopyFlags,
    report_path: Option<&Path>,
) -> Result<RunOutcome> {
    if flags.dry_run {
        println!("{}", "[DRY RUN] Planning media ingest...".bold().cyan());
    } else {
        println!("{}", "📥 Ingesting media...".bold().cyan());
    }
    println!();

    let destination = super::destination_root(args, &preset)?;

    println!("  {} {}", "Source:".bold(), args.source.display());
    println!("  {} {}", "Destination:".bold(), destination.display());
    println!("  {} {}", "Preset:".bold(), preset.name);
    println!("  {} {}", "Duplicates:".bold(), preset.duplicate_handling);
    println!();

    if !flags.skip_preflight {
        super::run_preflight(args, &destination, &preset, &config.settings)?;
    }

    let records = super::discover(args)?;

    let cancel = CancelFlag::new();
    watch_ctrl_c(cancel.clone());

    let decisions: Arc<dyn DecisionProvider> = if flags.assume_yes {
        Arc::new(AutoDecision::default())
    } else {
        Arc::new(PromptDecision::new())
    };

    let ctx = Arc::new(
        RunContext::new(&destination, config.settings.clone())
            .with_options(RunOptions {
                dry_run: flags.dry_run,
                assume_yes: flags.assume_yes,
                show_progress: true,
            })
            .with_cache(super::open_cache(&config.settings))
            .with_decisions(decisions)
            .with_cancel(cancel),
    );

    let planner = CopyPlanner::new(preset, ctx.clone())?;
    let run = planner.plan(records).await?;
    super::print_plan_summary(&run);
    println!();

    if flags.dry_run {
        print_dry_run(&run.plan);
        return Ok(RunOutcome::NothingToCopy);
    }

    let executor = CopyExecutor::new(ctx);
    let report = executor.execute(&run.plan).await?;

    if let Some(path) = report_path {
        save_report(&report, path)?;
        println!("{} {}", "Report saved to:".bold(), path.display());
    }

    print_report(&report);
    Ok(report.outcome())
}

/// Cancel the run on Ctrl-C.
fn watch_ctrl_c(cancel: CancelFlag) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing in-flight copies");
            cancel.cancel();
        }
    });
}

fn print_dry_run(plan: &CopyPlan) {
    println!("{}", "Planned operations:".bold());
    for entry in &plan.entries {
        let label = entry.action.to_string();
        let action = match entry.action {
            PlanAction::Skip => label.dimmed(),
            PlanAction::Overwrite => label.red(),
            PlanAction::Rename => label.yellow(),
            PlanAction::Copy => label.green(),
        };
        println!(
            "  [{}] {} -> {}",
            action,
            entry.source.display(),
            entry.destination.display()
        );
    }
    println!();
    println!(
        "{}",
        "[DRY RUN] No files were copied. Run without --dry-run to copy."
            .bold()
            .yellow()
    );
}

fn print_report(report: &ExecutionReport) {
    println!();
    println!("{}", "📊 Copy Summary".bold().green());
    println!("  {} {}", "Copied:".bold(), report.copied);
    println!("  {} {}", "Skipped:".bold(), report.skipped);
    println!("  {} {}", "Failed:".bold(), report.failed + report.plan_errors);
    if report.cancelled > 0 {
        println!("  {} {}", "Cancelled:".bold(), report.cancelled);
    }
    println!(
        "  {} {}",
        "Bytes copied:".bold(),
        super::format_bytes(report.bytes_copied)
    );

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| match &o.result {
            ItemResult::Failed { message } => Some((o, message)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("{}", "❌ Failed files:".bold().red());
        for (outcome, message) in failures {
            println!("  {} - {}", outcome.source.display().to_string().red(), message);
        }
    }

    println!();
    let outcome = report.outcome();
    let line = format!("Run {}: {}", report.run_id, outcome);
    match outcome {
        RunOutcome::AllSucceeded | RunOutcome::NothingToCopy => println!("{}", line.bold().green()),
        RunOutcome::PartialFailure => println!("{}", line.bold().yellow()),
        RunOutcome::TotalFailure => println!("{}", line.bold().red()),
    }
}

/// Save an execution report as JSON.
pub fn save_report(report: &ExecutionReport, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(report)?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)?;
    tracing::info!("Report saved to {:?}", path);
    Ok(())
}
