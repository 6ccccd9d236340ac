//! refinery CLI entry point

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Merge queue processor for agent-produced merge requests
#[derive(Parser)]
#[command(name = "refinery", version, about)]
struct Cli {
    /// Rig directory (repository and tracker root)
    #[arg(long, global = true, default_value = ".")]
    rig: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the tracker and process merge requests until interrupted
    Run,
    /// Process a single cycle and exit
    Once,
    /// Reopen merge requests left in progress by an interrupted run
    Recover,
    /// Print the resolved merge queue configuration
    Config,
}

fn setup_logging(verbose: bool) {
    let default = if verbose { "refinery=debug" } else { "refinery=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match cli.command {
        Command::Run => cli::run_engine(&cli.rig).await?,
        Command::Once => cli::run_once(&cli.rig).await?,
        Command::Recover => cli::run_recover(&cli.rig).await?,
        Command::Config => cli::show_config(&cli.rig)?,
    }
    Ok(())
}
