// georecon CLI - coordinate reconciliation for field monitoring exports

mod exit_codes;
mod paths;
mod reconcile;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use exit_codes::{EXIT_CONFIG, EXIT_INPUT, EXIT_OUTPUT, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "georecon")]
#[command(about = "Reconcile point coordinates and names in monitoring observation exports")]
#[command(version)]
struct Cli {
    /// Debug-level engine logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve coordinate discrepancies, then canonicalize point names
    #[command(after_help = "\
Examples:
  georecon run -i monitoring.csv
  georecon run -i monitoring.csv -c site.recon.toml --json > audit.json
  georecon run -i monitoring.csv --distance-threshold 50 -o out/clean.csv

Exit codes:
  0  all outputs written, nothing left to curate
  1  outputs written, flagged groups or unresolved conflicts remain
  2  invalid flag value
  3  input unreadable or missing a required column
  4  config invalid or a correction rule matched no rows
  5  an output could not be written

Gating: only 1 means \"review needed\". Fatal errors use 2-5, so a script
that treats any non-zero status as failure still works, and one that
checks for 1 can tell curation work apart from a broken run.")]
    Run(reconcile::RunArgs),

    /// Resolve coordinate discrepancies only
    #[command(after_help = "\
Examples:
  georecon clean -i monitoring.csv
  georecon clean -i monitoring.csv --flagged review/flagged.csv")]
    Clean(reconcile::CleanArgs),

    /// Canonicalize point names on an already cleaned file
    #[command(after_help = "\
Examples:
  georecon conflicts -i monitoring_cleaned_mult_coord.csv
  georecon conflicts -i cleaned.csv --coordinate-precision 0.001")]
    Conflicts(reconcile::ConflictsArgs),

    /// Parse and validate a config file without touching any data
    #[command(after_help = "\
Examples:
  georecon validate --config site.recon.toml")]
    Validate {
        /// Config file to check
        #[arg(short, long)]
        config: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Run(args) => reconcile::cmd_run(args),
        Commands::Clean(args) => reconcile::cmd_clean(args),
        Commands::Conflicts(args) => reconcile::cmd_conflicts(args),
        Commands::Validate { config } => reconcile::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn input(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INPUT, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self { code: EXIT_OUTPUT, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
