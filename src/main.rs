//! Media Ingest CLI
//!
//! A command-line tool for copying photos and videos into an organized library.

use clap::Parser;
use media_ingest::cli::{
    args::{CacheAction, Cli, Commands, PresetsAction},
    commands::{self, cache, copy, plan, presets},
};
use media_ingest::models::config::{load_config, load_config_from, AppConfig};
use std::path::Path;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Parse command line arguments
    let cli = Cli::parse();

    let config: AppConfig = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config(),
    };

    // Resolve the preset first so its log level can apply
    let preset = match cli.command.run_args() {
        Some(args) => Some(commands::resolve_preset(&config, args)?),
        None => None,
    };

    let level = cli
        .log_level
        .clone()
        .or_else(|| cli.verbose.then(|| "debug".to_string()))
        .or_else(|| preset.as_ref().and_then(|p| p.log_level.clone()))
        .unwrap_or_else(|| "info".to_string());
    let _guard = init_logging(&level, cli.log_file.as_deref())?;

    // Run the appropriate command
    match cli.command {
        Commands::Plan { run, output } => {
            plan::plan(
                &config,
                preset.unwrap_or_default(),
                &run,
                output.as_deref(),
                cli.skip_preflight,
            )
            .await?;
        }

        Commands::Copy {
            run,
            dry_run,
            yes,
            report,
        } => {
            let flags = copy::CopyFlags {
                dry_run,
                assume_yes: yes,
                skip_preflight: cli.skip_preflight,
            };
            let outcome = copy::copy(
                &config,
                preset.unwrap_or_default(),
                &run,
                flags,
                report.as_deref(),
            )
            .await?;
            return Ok(ExitCode::from(outcome.exit_code()));
        }

        Commands::Presets { action } => match action {
            PresetsAction::List => presets::list_presets(&config)?,
            PresetsAction::Show { name } => presets::show_preset(&config, &name)?,
            PresetsAction::Validate { file } => presets::validate_preset(&file)?,
        },

        Commands::Cache { action } => match action {
            CacheAction::Stats => cache::stats(&config.settings)?,
            CacheAction::Clear => cache::clear(&config.settings)?,
            CacheAction::Compact => cache::compact(&config.settings)?,
        },
    }

    Ok(ExitCode::SUCCESS)
}

/// Initialize the logging system.
///
/// The returned guard flushes the log file on drop and must live until exit.
fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_new(format!("media_ingest={}", level))?;

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", path.display()))?;
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(file_layer)
        .with(filter)
        .init();

    Ok(guard)
}
