//! flowexpr CLI - compile, validate and evaluate workflow expressions.

use clap::Parser;
use flowexpr_cli::cli::{Cli, Command};
use flowexpr_cli::{commands, common};

fn main() {
    use tracing_subscriber::{EnvFilter, fmt};

    // Use RUST_LOG environment variable to control log level
    // Default to WARN if not set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Command::Eval(args) => commands::eval::run(args),
        Command::Check(args) => commands::check::run(args, cli.no_color),
    };

    if let Err(e) = result {
        common::error::render_and_exit(e, cli.no_color);
    }
}
