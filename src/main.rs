use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod app;
mod commands;
mod compose;
mod decks;
mod error;
mod exec;
mod infofile;
mod input;
mod parse;
mod plan;
mod report;
mod residues;
mod results;
mod traj;

use commands::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(opts) => app::run(opts),
        Commands::PrintInput { namespace } => commands::print_input(namespace),
    }
}
