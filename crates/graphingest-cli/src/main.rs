//! graphingest - stream delimited, JSON and triple files into a graph store
//!
//! Each configured file is decoded lazily, cut into batches, and written
//! through parameterized statements, optionally over several sessions.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod cmd;
mod config;

#[derive(Parser)]
#[command(name = "graphingest")]
#[command(about = "Streaming ingestion of data files into a graph store")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Config file path (default: ./graphingest.toml or ~/.config/graphingest/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run pre statements, ingest every file, run post statements
    Run(cmd::run::RunArgs),
    /// Validate the configuration and show the resolved file plan
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = graphingest_core::ProgressContext::new();

    // Logging:
    //   TTY:     warn unless --debug, progress lines show activity
    //   non-TTY: info unless --quiet, logs are the only progress indicator
    let is_tty = progress.is_tty();
    let multi = if is_tty { Some(progress.multi()) } else { None };
    let quiet = cli.quiet || (is_tty && !cli.debug);
    graphingest_core::init_logging(quiet, cli.debug, multi);

    let path = config::locate(cli.config)?;
    let config = config::load(&path)?;

    match cli.command {
        Command::Run(args) => cmd::run::run(args, config, &progress),
        Command::Check => cmd::check::run(&config),
    }
}
