//! Presale CLI Library
//!
//! Operator interface for the presale stage engine: seed a database from
//! configuration, inspect and synchronize the schedule, quote and execute
//! purchases.
//!
//! ## Architecture
//!
//! - **Functional Core**: pure `build_*` functions in each command module turn
//!   engine results into display values
//! - **Imperative Shell** (`commands/`): config loading, database access, output
//! - **Error Handling** (`error`): structured CLI errors
//! - **Output Abstraction** (`output`): testable printing interface

pub mod argument_parsing;
pub mod commands;
pub mod error;
pub mod output;

pub use argument_parsing::{format_output, run_cli, PresaleCli, PresaleCommand};
pub use error::{CliError, CliResult};
pub use output::Output;

/// Presale CLI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
