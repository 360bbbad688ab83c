//! CLI argument definitions for the live results client.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;

#[derive(Parser)]
#[command(
    name = "elect-live",
    version,
    about = "Follow the live election results feed",
    long_about = "Follow the live election results feed.\n\n\
                  Resolves the active snapshot directory from the published pointer file,\n\
                  honors the operators' curtain and prints results as they change."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub connection: ConnectionArgs,

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
}

/// Where the results come from.
#[derive(Args)]
pub struct ConnectionArgs {
    /// TOML configuration file.
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Origin of the results server (overrides the configuration file).
    #[arg(long = "base-url", value_name = "URL", global = true)]
    pub base_url: Option<String>,

    /// Read this snapshot directory instead of following the pointer file.
    #[arg(long = "directory", value_name = "DIR", global = true)]
    pub directory: Option<String>,

    /// Show results even while the operators hold them back.
    #[arg(long = "disable-curtain", global = true)]
    pub disable_curtain: bool,

    /// Seconds to wait for data before giving up (one-shot commands).
    #[arg(long = "timeout", value_name = "SECS", default_value_t = 30, global = true)]
    pub timeout_secs: u64,
}

#[derive(Subcommand)]
pub enum Command {
    /// Follow the feed and print every change until interrupted.
    Watch,

    /// Print the active snapshot directory, curtain and status.
    Directory,

    /// Print the nationwide summary.
    Summary,

    /// Print the information of one zone.
    Zone(ZoneArgs),
}

#[derive(Args)]
pub struct ZoneArgs {
    /// Province id.
    #[arg(value_name = "PROVINCE")]
    pub province: u32,

    /// Zone number within the province.
    #[arg(value_name = "ZONE")]
    pub zone: u32,
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
