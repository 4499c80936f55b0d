//! Command line argument definitions.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Media Ingest - Copy photos and videos from cards and phones into an organized library
#[derive(Parser, Debug)]
#[command(name = "media-ingest")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log level (error, warn, info, debug, trace); overrides --verbose
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Also write logs to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Skip preflight checks
    #[arg(long, global = true)]
    pub skip_preflight: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a copy plan and save it without copying anything
    Plan {
        #[command(flatten)]
        run: RunArgs,

        /// Output path for the plan JSON
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Plan and copy files into the destination
    Copy {
        #[command(flatten)]
        run: RunArgs,

        /// Show what would be copied without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Do not prompt; `ask` duplicates are skipped
        #[arg(short, long)]
        yes: bool,

        /// Write the execution report as JSON
        #[arg(long, value_name = "PATH")]
        report: Option<PathBuf>,
    },

    /// Inspect presets
    Presets {
        #[command(subcommand)]
        action: PresetsAction,
    },

    /// Manage the hash cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

/// Source, destination and preset selection shared by `plan` and `copy`.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Source folder or mounted device
    #[arg(value_name = "SOURCE")]
    pub source: PathBuf,

    /// Destination library root (defaults to the preset's destination)
    #[arg(value_name = "DESTINATION")]
    pub destination: Option<PathBuf>,

    /// Preset name from the configuration file
    #[arg(short, long, default_value = "default")]
    pub preset: String,

    /// Load the preset from a JSON or TOML file instead
    #[arg(long, value_name = "PATH", conflicts_with = "preset")]
    pub preset_file: Option<PathBuf>,

    /// Folder pattern, e.g. "{year}/{month:%02d}"
    #[arg(long, value_name = "PATTERN")]
    pub folder_structure: Option<String>,

    /// File name pattern, e.g. "{datetime:YYYYMMDD_HHMMSS}_{original_filename}"
    #[arg(long, value_name = "PATTERN")]
    pub filename_pattern: Option<String>,

    /// Duplicate handling: skip, overwrite, rename or ask
    #[arg(long, value_name = "POLICY")]
    pub duplicate_handling: Option<String>,

    /// JSON metadata manifest produced by an extractor
    #[arg(short, long, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Only scan the top level of the source
    #[arg(long)]
    pub non_recursive: bool,

    /// Include dot files and dot folders
    #[arg(long)]
    pub include_hidden: bool,

    /// Source device type (ios, android) used by screenshot detection
    #[arg(long, value_name = "TYPE")]
    pub device_type: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum PresetsAction {
    /// List available presets
    List,

    /// Show a preset as JSON
    Show {
        /// Preset name
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Validate a preset file
    Validate {
        /// Path to a JSON or TOML preset
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show hash cache statistics
    Stats,

    /// Remove every cached hash
    Clear,

    /// Drop stale entries and rewrite the cache file
    Compact,
}

impl Commands {
    /// Run arguments, for commands that plan.
    pub fn run_args(&self) -> Option<&RunArgs> {
        match self {
            Commands::Plan { run, .. } | Commands::Copy { run, .. } => Some(run),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copy() {
        let cli = Cli::try_parse_from([
            "media-ingest",
            "copy",
            "/media/card",
            "/photos",
            "--preset",
            "phone",
            "--yes",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Copy {
                run, dry_run, yes, ..
            } => {
                assert_eq!(run.source, PathBuf::from("/media/card"));
                assert_eq!(run.destination, Some(PathBuf::from("/photos")));
                assert_eq!(run.preset, "phone");
                assert!(dry_run);
                assert!(yes);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_preset_file_conflicts_with_preset() {
        let result = Cli::try_parse_from([
            "media-ingest",
            "plan",
            "/media/card",
            "--preset",
            "phone",
            "--preset-file",
            "phone.toml",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["media-ingest", "cache", "stats", "--verbose"]).unwrap();
        assert!(cli.verbose);
        assert!(cli.command.run_args().is_none());
    }
}
