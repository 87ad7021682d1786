//! Cheetah CLI - Command-line interface for Cheetah schema migrations.

use clap::Parser;

use cheetah_cli::cli::{Cli, Command};
use cheetah_cli::commands;
use cheetah_cli::error::CliResult;
use cheetah_cli::{logging, output};

#[tokio::main]
async fn main() {
    logging::init();

    if let Err(e) = run().await {
        output::newline();
        output::error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => commands::migrate::generate(&cli.config, args).await,
        Command::Run => commands::migrate::run(&cli.config).await,
    }
}
