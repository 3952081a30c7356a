//! Presale CLI
//!
//! Operator command-line interface over the presale stage engine

use crate::commands;
use crate::error::{CliError, CliResult};

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Presale operator CLI
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(name = "presale-cli")]
pub struct PresaleCli {
    /// Configuration file path
    #[arg(short, long, default_value = "presale.toml", env = "PRESALE_CONFIG")]
    pub config: PathBuf,

    /// SQLite database path (overrides `database_path` from the config)
    #[arg(short, long, env = "PRESALE_DB")]
    pub database: Option<PathBuf>,

    /// Output format (json, table)
    #[arg(short, long, default_value = "table", env = "PRESALE_FORMAT")]
    pub format: String,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Evaluate as of this unix timestamp instead of the wall clock
    #[arg(long)]
    pub at: Option<i64>,

    #[command(subcommand)]
    pub command: PresaleCommand,
}

/// Presale commands
#[derive(Subcommand, Debug, Clone)]
pub enum PresaleCommand {
    /// Create the database and seed it from the configured schedule
    Init {
        /// Replace stages that already exist
        #[arg(long)]
        force: bool,
    },

    /// Show the current stage and aggregate figures
    Status,

    /// Synchronize stage windows and report what changed
    Sync,

    /// List every stage
    Stages,

    /// Price a purchase without executing it
    Quote {
        /// Amount paid, in `currency` units
        amount: f64,
        /// Payment currency
        #[arg(default_value = "USD")]
        currency: String,
    },

    /// Execute a purchase
    Purchase {
        /// Amount paid, in `currency` units
        amount: f64,
        /// Payment currency
        #[arg(default_value = "USD")]
        currency: String,
    },
}

impl PresaleCli {
    /// Timestamp commands evaluate against
    pub fn now(&self) -> i64 {
        self.at.unwrap_or_else(lib_presale::unix_now)
    }
}

/// Install the tracing subscriber: RUST_LOG wins, then `--log-level`
pub fn init_logging(default_filter: &str) {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}

/// Main CLI runner
pub async fn run_cli() -> Result<()> {
    let cli = PresaleCli::parse();
    init_logging(&cli.log_level);

    match &cli.command {
        PresaleCommand::Init { force } => commands::init::handle_init_command(*force, &cli).await?,
        PresaleCommand::Status => commands::status::handle_status_command(&cli).await?,
        PresaleCommand::Sync => commands::status::handle_sync_command(&cli).await?,
        PresaleCommand::Stages => commands::status::handle_stages_command(&cli).await?,
        PresaleCommand::Quote { amount, currency } => {
            commands::purchase::handle_quote_command(*amount, currency, &cli).await?
        }
        PresaleCommand::Purchase { amount, currency } => {
            commands::purchase::handle_purchase_command(*amount, currency, &cli).await?
        }
    }
    Ok(())
}

/// Format output based on CLI format preference
pub fn format_output(data: &Value, format: &str) -> CliResult<String> {
    match format {
        "json" => Ok(serde_json::to_string_pretty(data)?),
        "table" => {
            if let Some(obj) = data.as_object() {
                let mut result = String::new();
                for (key, value) in obj {
                    result.push_str(&format!("{:<20} {}\n", key, value));
                }
                Ok(result)
            } else if let Some(array) = data.as_array() {
                let mut result = String::new();
                for (i, item) in array.iter().enumerate() {
                    result.push_str(&format!("[{}] {}\n", i, item));
                }
                Ok(result)
            } else {
                Ok(data.to_string())
            }
        }
        other => Err(CliError::FormatError(format!(
            "unsupported output format '{}' (expected json or table)",
            other
        ))),
    }
}
