//! # CRM Import CLI (`crm-import`)
//!
//! Bulk-loads companies, contacts and tickets from CSV into a CRM and
//! creates the associations between them.
//!
//! ## Usage
//!
//! ```bash
//! crm-import --config ./config/crm-import.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `crm-import validate` | Check required columns and data quality |
//! | `crm-import check` | Probe API connectivity and credentials |
//! | `crm-import enrich` | Show emails and phone numbers found in tickets |
//! | `crm-import run` | Run the full import |
//!
//! ## Examples
//!
//! ```bash
//! # Validate the CSV files under the configured input directory
//! crm-import validate
//!
//! # Full pipeline without touching the network
//! crm-import run --dry-run
//!
//! # Real import, machine-readable summary
//! CRM_API_KEY=... crm-import run --json > summary.json
//! ```
//!
//! The API key is read from the environment variable named by
//! `[api].api_key_env` (default `CRM_API_KEY`). A `.env` file in the working
//! directory is loaded first if present.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crm_bulk_import::config::{self, Config};
use crm_bulk_import::import::{self, RunOptions};
use crm_bulk_import::progress::ProgressMode;
use crm_bulk_import::{enrich, validate};

/// CRM bulk import: CSV to CRM objects plus associations.
#[derive(Parser)]
#[command(
    name = "crm-import",
    about = "Bulk-import companies, contacts and tickets into a CRM",
    version,
    long_about = "Loads companies, contacts and tickets from CSV files, creates them in the CRM \
    in batches with retry and backoff, and links tickets to contacts and companies using the \
    email addresses found in ticket text."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/crm-import.toml`. When the file does not exist,
    /// built-in defaults are used (input from `./data`).
    #[arg(long, global = true, default_value = "./config/crm-import.toml")]
    config: PathBuf,

    /// Increase log verbosity (`-v` info, `-vv` debug). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Progress output on stderr: `auto`, `off`, `human` or `json`.
    #[arg(long, global = true, default_value = "auto")]
    progress: String,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Validate the input files.
    ///
    /// Checks that every required column is present, counts rows that will
    /// be skipped for missing values, flags malformed contact emails and
    /// prints completeness figures per file.
    Validate {
        /// Exit successfully even if required columns are missing.
        #[arg(long)]
        force: bool,
    },

    /// Check that the CRM API is reachable with the configured key.
    Check,

    /// Preview contact details extracted from ticket text.
    ///
    /// Reads only the tickets file; makes no API calls.
    Enrich {
        /// Print the extraction results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the full import.
    ///
    /// Validates, creates companies, contacts and tickets in that order,
    /// then creates contact → company, ticket → contact and
    /// ticket → company associations. Prints a summary to stdout.
    Run {
        /// Continue even if required columns are missing.
        #[arg(long)]
        force: bool,

        /// Answer every API call locally with synthetic ids.
        #[arg(long)]
        dry_run: bool,

        /// Print the summary as JSON instead of a table.
        #[arg(long)]
        json: bool,

        /// Override `[import].batch_size` (1-100).
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config_or_default(path: &std::path::Path) -> anyhow::Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        tracing::info!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::minimal())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = load_config_or_default(&cli.config)?;
    let progress = ProgressMode::parse(&cli.progress)?;
    let observer = progress.observer();

    match cli.command {
        Commands::Validate { force } => {
            validate::run_validate(&cfg, force)?;
        }
        Commands::Check => {
            import::run_check(&cfg, observer.as_ref()).await?;
        }
        Commands::Enrich { json } => {
            enrich::run_enrich(&cfg, json)?;
        }
        Commands::Run {
            force,
            dry_run,
            json,
            batch_size,
        } => {
            let options = RunOptions {
                force,
                dry_run,
                json,
                batch_size,
            };
            import::run_import(&cfg, &options, observer.as_ref()).await?;
        }
    }

    Ok(())
}
