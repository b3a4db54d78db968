mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, init, replay, CheckArgs, InitArgs, ReplayArgs};
use config::CliConfig;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Folio CLI - drive the editor core from the command line
#[derive(Parser, Debug)]
#[command(name = "folio")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a default folio.config.json
    Init(InitArgs),

    /// Load and re-validate a serialized document
    Check(CheckArgs),

    /// Run a JSON edit script and print each commit's mutations
    Replay(ReplayArgs),
}

fn init_tracing(config: &CliConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli, cwd: &Path) -> anyhow::Result<()> {
    let config = CliConfig::load(cwd)?;
    init_tracing(&config);

    match cli.command {
        Command::Init(args) => init(args, cwd),
        Command::Check(args) => check(args, cwd),
        Command::Replay(args) => replay(args, cwd, &config),
    }
}

fn main() {
    let cli = Cli::parse();

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|cwd| run(cli, &cwd));

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
