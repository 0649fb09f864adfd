//! DAS log CLI
//!
//! Command-line tools for the log saver's dead-letter files.
//!
//! # Commands
//!
//! - `inspect` - Show per-kind entry and row counts
//! - `dump` - Print spilled records
//! - `verify` - Check envelopes, checksums and row layouts

mod commands;

use clap::{Parser, Subcommand};
use das_log_protocol::LogKind;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// DAS dead-letter tools.
#[derive(Parser)]
#[command(name = "das-log")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Dead-letter directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show per-kind entry and row counts
    Inspect {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the records of one kind's dead-letter file
    Dump {
        /// Log kind (value, event, param, status, mode or its code)
        #[arg(short, long, value_parser = commands::parse_kind)]
        kind: LogKind,

        /// Maximum number of entries to print
        #[arg(short, long)]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Verify dead-letter files
    Verify {
        /// Only verify this kind
        #[arg(short, long, value_parser = commands::parse_kind)]
        kind: Option<LogKind>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Inspect { format } => {
            let path = cli.path.ok_or("Dead-letter directory required for inspect")?;
            commands::inspect::run(&path, &format)?;
        }
        Commands::Dump {
            kind,
            limit,
            format,
        } => {
            let path = cli.path.ok_or("Dead-letter directory required for dump")?;
            commands::dump::run(&path, kind, limit, &format)?;
        }
        Commands::Verify { kind } => {
            let path = cli.path.ok_or("Dead-letter directory required for verify")?;
            commands::verify::run(&path, kind)?;
        }
        Commands::Version => {
            println!("DAS log CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
