//! CLI entrypoint for the segfit trace harness.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use segfit_harness::{ReplaySettings, parse_file, replay};

/// Trace tooling for the segfit allocator.
#[derive(Debug, Parser)]
#[command(name = "segfit-harness")]
#[command(about = "Trace replay and verification harness for the segfit allocator")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay an allocation trace and verify allocator properties.
    Replay {
        /// Trace file (`a <id> <size>` / `r <id> <size>` / `f <id>` lines).
        #[arg(long)]
        trace: PathBuf,
        /// Cap total heap growth in bytes to simulate out-of-memory.
        #[arg(long)]
        heap_limit: Option<usize>,
        /// Run the heap consistency checker every N operations.
        #[arg(long)]
        check_every: Option<usize>,
        /// Write the JSON report here (if omitted, prints to stdout).
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Parse and validate a trace file without replaying it.
    Check {
        /// Trace file to validate.
        #[arg(long)]
        trace: PathBuf,
    },
}

fn main() -> ExitCode {
    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::Replay {
            trace,
            heap_limit,
            check_every,
            report,
        } => {
            let ops = parse_file(&trace)?;
            let settings = ReplaySettings {
                heap_limit,
                check_every,
            };
            let summary = replay(&ops, &settings)?;
            let rendered = serde_json::to_string_pretty(&summary)?;
            match report {
                Some(path) => std::fs::write(path, rendered)?,
                None => println!("{rendered}"),
            }
            Ok(())
        }
        Command::Check { trace } => {
            let ops = parse_file(&trace)?;
            println!("{} ops ok", ops.len());
            Ok(())
        }
    }
}
