//! Command-line arguments and subcommands of `kcc-conformance`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::stage::Stage;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "kcc-conformance",
    version,
    about = "Stage-by-stage conformance harness for the Kayte C compiler."
)]
pub struct HarnessArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run every fixture through the configured compiler commands.
    Run {
        /// YAML configuration file.
        #[arg(long, short)]
        config: Option<PathBuf>,
        #[command(flatten)]
        source: FixtureSource,
        /// Worker threads per stage (overrides the configuration).
        #[arg(long)]
        workers: Option<usize>,
        /// Per-invocation timeout in milliseconds (overrides the configuration).
        #[arg(long)]
        timeout_ms: Option<u64>,
        #[arg(long, value_enum, default_value_t = Format::Text)]
        format: Format,
    },
    /// List registered fixtures per stage in registration order.
    List {
        #[command(flatten)]
        source: FixtureSource,
        /// Only list this stage.
        #[arg(long, value_parser = parse_stage)]
        stage: Option<Stage>,
    },
}

/// Where fixtures come from. Defaults to the configured fixture root.
#[derive(Debug, Args)]
pub struct FixtureSource {
    /// Directory of YAML fixture files.
    #[arg(long, conflicts_with = "builtin")]
    pub fixtures: Option<PathBuf>,
    /// Use the built-in Kayte suite.
    #[arg(long)]
    pub builtin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Text,
    Json,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    s.parse().map_err(|e: crate::errors::HarnessError| e.to_string())
}
