//! Statesync CLI
//!
//! Command-line tools for working with encoded diff payloads.
//!
//! # Commands
//!
//! - `apply` - Replay payload files into a client model and print the document
//! - `inspect` - Count the changes in a payload file by type
//! - `demo` - Run a few sessions and print what they send

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Statesync payload tools.
#[derive(Parser)]
#[command(name = "statesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay payload files into a client model and print the document
    Apply {
        /// Payload files, applied in order
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Reject changes that target unknown nodes
        #[arg(short, long)]
        strict: bool,
    },

    /// Count the changes in a payload file by type
    Inspect {
        /// Payload file
        file: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run a few sessions and print what they send
    Demo,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Apply { files, strict } => {
            commands::apply::run(&files, strict)?;
        }
        Commands::Inspect { file, format } => {
            commands::inspect::run(&file, &format)?;
        }
        Commands::Demo => {
            commands::demo::run()?;
        }
        Commands::Version => {
            println!("Statesync CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Statesync Core v{}", statesync_core::VERSION);
        }
    }

    Ok(())
}
