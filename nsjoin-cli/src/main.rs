//! nsjoin CLI
//!
//! Runs a command inside the namespaces of an already running process.

use clap::Parser;
use std::io::IsTerminal;
use std::process;
use tracing_subscriber::EnvFilter;

mod cli;
mod run;

use cli::Cli;

fn main() {
    // Parse command-line arguments
    let cli = Cli::parse();

    // Quiet by default: the launched command owns the terminal
    let default_level = if cli.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    match run::execute(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("❌ Error: {e}");
            process::exit(1);
        }
    }
}
