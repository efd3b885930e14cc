//! Command-line arguments for the `sip` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use sip_model::Path;

#[derive(Parser)]
#[command(
    name = "sip",
    version,
    about = "Map and profile XML metadata records",
    long_about = "Map XML metadata dumps onto a target record definition.\n\n\
                  Applies a crosswalk to every record in parallel and gathers\n\
                  bounded-memory field statistics over a dump."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// TOML file with [parse], [runner] and [stats] settings.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the target tree of a record definition.
    Schema(SchemaArgs),

    /// Apply a mapping to every record of a dump.
    Map(MapArgs),

    /// Gather field statistics over a dump.
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct SchemaArgs {
    /// Record-definition XML file.
    #[arg(long = "rec-def", value_name = "FILE")]
    pub rec_def: PathBuf,
}

/// How records are cut out of a dump.
#[derive(Args)]
pub struct RecordArgs {
    /// Path of the element that delimits one record (e.g. /harvest/record).
    #[arg(long = "record-root", value_name = "PATH")]
    pub record_root: Option<Path>,

    /// Path of the record identifier, element or attribute.
    #[arg(long = "unique-element", value_name = "PATH")]
    pub unique_element: Option<Path>,
}

#[derive(Args)]
pub struct MapArgs {
    /// Record-definition XML file.
    #[arg(long = "rec-def", value_name = "FILE")]
    pub rec_def: PathBuf,

    /// Mapping XML file.
    #[arg(long = "mapping", value_name = "FILE")]
    pub mapping: PathBuf,

    /// Metadata dump to map.
    #[arg(long = "input", value_name = "DUMP")]
    pub input: PathBuf,

    /// Write the mapped documents here; without it the run only reports.
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Number of mapping worker threads.
    #[arg(long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    #[command(flatten)]
    pub records: RecordArgs,
}

#[derive(Args)]
pub struct StatsArgs {
    /// Metadata dump to profile.
    #[arg(long = "input", value_name = "DUMP")]
    pub input: PathBuf,

    /// Write the statistics document here.
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub records: RecordArgs,
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}
