//! Husk CLI entry point.

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use husk::cli::Cli;

fn main() -> Result<()> {
    // Must run while the process is still single-threaded.
    if let Some(code) = husk::exec::enter_if_requested() {
        std::process::exit(code);
    }

    // Initialize error handling
    color_eyre::install()?;

    let cli = Cli::parse();

    let level = if cli.debug { "husk=debug" } else { "husk=info" };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let code = cli.execute()?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}
