//! Tally CLI - import bank CSV statements into your ledger

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{account, import, inspect, logs};
use tally_core::services::LoggingService;
use tally_core::OperationResult;

/// Tally - bank statement import with column mapping and deduplication
#[derive(Parser)]
#[command(name = "tally", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage import accounts
    Account {
        #[command(subcommand)]
        command: account::AccountCommands,
    },

    /// Show headers, sample rows and the detected mapping of a CSV file
    Inspect {
        /// Path to CSV file
        file: PathBuf,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Import transactions from CSV
    Import(import::ImportArgs),

    /// Show recent log entries
    Logs {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only errors
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Account { .. } => "account",
            Commands::Inspect { .. } => "inspect",
            Commands::Import(_) => "import",
            Commands::Logs { .. } => "logs",
        }
    }

    fn json(&self) -> bool {
        match self {
            Commands::Account { command } => command.json(),
            Commands::Inspect { json, .. } => *json,
            Commands::Import(args) => args.json,
            Commands::Logs { json, .. } => *json,
        }
    }
}

fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let json = cli.command.json();
    let name = cli.command.name();

    let logger = commands::get_logger();
    if let Some(l) = &logger {
        let _ = l.log_command(name);
    }

    match run(cli, &logger) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(l) = &logger {
                let _ = l.log_error("command_failed", &e.to_string(), Some(name));
            }
            if json {
                let envelope = OperationResult::<()>::fail(format!("{:#}", e));
                match serde_json::to_string_pretty(&envelope) {
                    Ok(text) => println!("{}", text),
                    Err(_) => output::error(&format!("{:#}", e)),
                }
            } else {
                output::error(&format!("{:#}", e));
            }
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr, filtered by `TALLY_LOG` (default: warn)
fn init_tracing() {
    let filter = EnvFilter::try_from_env("TALLY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli, logger: &Option<LoggingService>) -> Result<()> {
    match cli.command {
        Commands::Account { command } => account::run(command),
        Commands::Inspect { file, json } => inspect::run(&file, json),
        Commands::Import(args) => import::run(args, logger),
        Commands::Logs { limit, errors, json } => logs::run(limit, errors, json, logger),
    }
}
