//! ## pwrlvl-cli
//! **Control server entrypoint**
//! Loads the layered configuration, builds the orchestrator and serves the HTTP control
//! surface until SIGINT/SIGTERM.
//!
//! ### Commands:
//! - `pwrlvl serve [--config PATH] [--port N] [--bind ADDR] [--web-root DIR]`
//! - `pwrlvl config [--config PATH]`

use clap::Parser;

mod commands;
mod error;

use commands::Cli;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    commands::run_command(cli)?;
    Ok(())
}
