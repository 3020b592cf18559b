use clap::Parser;
use std::path::PathBuf;

use super::commands::Commands;

#[derive(Parser)]
#[command(name = "schoolgate", version)]
#[command(about = "Issue tokens, inspect policy and replay authorization decisions")]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Path to schoolgate.yaml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level (overrides the configured one)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Verbose logging with file and line locations
    #[arg(short, long)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}
