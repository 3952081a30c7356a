//! Presale Command-Line Interface
//!
//! Entry point for the presale-cli binary.

use presale_cli::run_cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    run_cli().await
}
