//! artnode CLI - content graph compiler.
//!
//! Provides commands for:
//! - `build`: Compile the content tree once and write the artifact set
//! - `watch`: Build, then re-index incrementally as files change

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{BuildArgs, WatchArgs};
use output::Output;

/// artnode - content graph compiler.
#[derive(Parser)]
#[command(name = "artnode", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile the content tree and write artifacts.
    Build(BuildArgs),
    /// Build, then rebuild affected nodes on every change.
    Watch(WatchArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = match &cli.command {
        Commands::Build(args) => args.common.verbose,
        Commands::Watch(args) => args.common.verbose,
    };

    // --verbose enables INFO level, otherwise use RUST_LOG or default to WARN
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Build(args) => args.execute(),
        Commands::Watch(args) => args.execute(),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}
