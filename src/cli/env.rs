use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::run::RunArgs;
use super::serve::ServeArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (defaults to the configured level)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the HTTP API
    Serve(ServeArgs),
    /// Run one recipe and print its result as JSON
    Run(RunArgs),
}
