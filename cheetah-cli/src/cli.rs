//! CLI argument definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::CONFIG_FILE_NAME;

/// Cheetah CLI - Schema migrations for PostgreSQL
#[derive(Parser, Debug)]
#[command(name = "cheetah")]
#[command(version)]
#[command(about = "Cheetah CLI - Schema migrations for PostgreSQL", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = CONFIG_FILE_NAME)]
    pub config: PathBuf,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate a migration file from the entity descriptors
    #[command(name = "migration:generate")]
    Generate(GenerateArgs),

    /// Apply pending migration files
    #[command(name = "migration:run")]
    Run,
}

/// Arguments for the `migration:generate` command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Print the statements without writing a file
    #[arg(long)]
    pub dry_run: bool,
}
