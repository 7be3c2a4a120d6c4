use std::path::PathBuf;

use abscissa_core::{Command, Runnable};
use clap::{Parser, builder::Styles};

use crate::fl;

#[derive(Debug, Parser, Command)]
#[command(author, about, version)]
#[command(help_template = format!("\
{{before-help}}{{about-with-newline}}
{}{}:{} {{usage}}

{{all-args}}{{after-help}}\
    ",
    Styles::default().get_usage().render(),
    fl!("usage-header"),
    Styles::default().get_usage().render_reset()))]
#[command(next_help_heading = fl!("flags-header"))]
pub struct EntryPoint {
    #[command(subcommand)]
    pub(crate) cmd: RewindCmd,

    /// Enable verbose logging
    #[arg(short, long)]
    pub(crate) verbose: bool,

    /// Specify the data directory for the Rewind instance
    #[arg(short, long)]
    pub(crate) datadir: Option<PathBuf>,

    /// Use the specified config file
    ///
    /// Relative paths are resolved against the data directory.
    #[arg(short, long)]
    pub(crate) config: Option<PathBuf>,
}

#[derive(Debug, Parser, Command, Runnable)]
pub(crate) enum RewindCmd {
    /// Generate an example config file with the current defaults
    ExampleConfig(ExampleConfigCmd),

    /// Show the checkpoint a replay would start from
    Checkpoint(CheckpointCmd),
}

/// `example-config` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct ExampleConfigCmd {
    /// Where to write the example config, or `-` to print it
    #[arg(short, long, value_name = "PATH", default_value = "-")]
    pub(crate) output: String,

    /// Overwrite an existing file
    #[arg(long)]
    pub(crate) force: bool,
}

/// `checkpoint` subcommand
#[derive(Debug, Parser, Command)]
pub(crate) struct CheckpointCmd {
    /// Replay up to this block height
    #[arg(long, conflicts_with = "date", required_unless_present = "date")]
    pub(crate) height: Option<u32>,

    /// Replay everything since this RFC 3339 date, e.g. `2024-06-01T00:00:00Z`
    #[arg(long, value_parser = parse_date)]
    pub(crate) date: Option<time::OffsetDateTime>,

    /// Fail if the checkpoint file cannot be used, instead of replaying from genesis
    #[arg(long)]
    pub(crate) strict: bool,
}

fn parse_date(value: &str) -> Result<time::OffsetDateTime, String> {
    time::OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|e| e.to_string())
}
