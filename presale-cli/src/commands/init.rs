//! Database initialization
//!
//! Seeds the stage table from the `[schedule]` section of the config.

use lib_presale::{Stage, StageStore};
use serde_json::{json, Value};
use tracing::info;

use crate::argument_parsing::{format_output, PresaleCli};
use crate::commands::{build_stage_row, PresaleContext};
use crate::error::{CliError, CliResult};
use crate::output::{ConsoleOutput, Output};

// ============================================================================
// PURE LOGIC
// ============================================================================

/// Summary of a freshly seeded schedule
pub fn build_seed_summary(stages: &[Stage]) -> Value {
    let first_start = stages.first().map(|s| s.start_time);
    let last_end = stages.last().map(|s| s.end_time);
    json!({
        "stages": stages.len(),
        "capacity": stages.iter().map(|s| s.target).sum::<f64>(),
        "pre_funded": stages.iter().map(|s| s.raised).sum::<f64>(),
        "start_time": first_start,
        "end_time": last_end,
    })
}

// ============================================================================
// IMPERATIVE SHELL
// ============================================================================

/// Handle `init`
pub async fn handle_init_command(force: bool, cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_init_command_with_output(&context, force, &cli.format, &ConsoleOutput).await
}

/// Handle `init` with injected output (for testing)
pub async fn handle_init_command_with_output<O: Output>(
    context: &PresaleContext,
    force: bool,
    format: &str,
    output: &O,
) -> CliResult<()> {
    let stages = context.config.seed_stages()?;

    let existing = context.store.stage_count().await?;
    if existing > 0 && !force {
        return Err(CliError::AlreadyInitialized {
            path: context.database.display().to_string(),
            stages: existing,
        });
    }

    context.store.seed_stages(&stages, force).await?;
    info!(
        "Seeded {} stage(s) into {}",
        stages.len(),
        context.database.display()
    );

    output.success(&format!(
        "Seeded {} stage(s) into {}",
        stages.len(),
        context.database.display()
    ))?;
    if format == "json" {
        let rows: Vec<Value> = stages.iter().map(build_stage_row).collect();
        output.print_json(&json!({ "summary": build_seed_summary(&stages), "stages": rows }))?;
    } else {
        output.print(&format_output(&build_seed_summary(&stages), format)?)?;
    }
    Ok(())
}
