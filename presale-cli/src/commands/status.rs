//! Read-side commands: `status`, `sync`, `stages`

use lib_presale::{
    PresaleQueryService, PresaleStatus, StageStore, StageSynchronizer, SyncReport,
};
use serde_json::{json, Value};

use crate::argument_parsing::{format_output, PresaleCli};
use crate::commands::{build_stage_row, describe_stage, format_timestamp, PresaleContext};
use crate::error::CliResult;
use crate::output::{ConsoleOutput, Output};

// ============================================================================
// PURE LOGIC
// ============================================================================

/// Flat status view shown by `status`
pub fn build_status_view(status: &PresaleStatus, now: i64) -> Value {
    let current = &status.current_stage;
    let aggregates = &status.aggregates;
    json!({
        "as_of": format_timestamp(now),
        "current_stage": current.stage_number,
        "stage_rate": current.rate,
        "listing_price": current.listing_price,
        "stage_raised": current.raised,
        "stage_target": current.target,
        "stage_progress": aggregates.stage_progress,
        "stage_ends": format_timestamp(current.end_time),
        "seconds_remaining": aggregates.seconds_remaining,
        "total_raised": aggregates.total_raised,
        "tokens_sold": aggregates.tokens_sold,
        "tokens_remaining": aggregates.tokens_remaining,
        "remaining_capacity": aggregates.remaining_capacity,
    })
}

/// What a synchronization pass changed
pub fn build_sync_view(report: &SyncReport) -> Value {
    json!({
        "current_stage": report.current_stage.stage_number,
        "changed": !report.outcome.is_noop(),
        "closed_early": report.outcome.closed_early,
        "extended": report.outcome.extended,
        "shift_origin": report.outcome.shift_origin,
    })
}

// ============================================================================
// IMPERATIVE SHELL
// ============================================================================

/// Handle `status`
pub async fn handle_status_command(cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_status_command_with_output(&context, cli.now(), &cli.format, &ConsoleOutput).await
}

/// Handle `status` with injected output (for testing)
pub async fn handle_status_command_with_output<O: Output>(
    context: &PresaleContext,
    now: i64,
    format: &str,
    output: &O,
) -> CliResult<()> {
    context.ensure_initialized().await?;

    let service = PresaleQueryService::new(
        StageSynchronizer::new(context.store.clone(), context.config.sync_policy()),
        context.config.total_supply,
        context.config.allocation.token_precision,
    );
    let status = service.get_status(now).await?;

    if format == "table" {
        output.header(&format!("Presale status (stage {})", status.current_stage.stage_number))?;
    }
    output.print(&format_output(&build_status_view(&status, now), format)?)?;
    Ok(())
}

/// Handle `sync`
pub async fn handle_sync_command(cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_sync_command_with_output(&context, cli.now(), &cli.format, &ConsoleOutput).await
}

/// Handle `sync` with injected output (for testing)
pub async fn handle_sync_command_with_output<O: Output>(
    context: &PresaleContext,
    now: i64,
    format: &str,
    output: &O,
) -> CliResult<()> {
    context.ensure_initialized().await?;

    let synchronizer = StageSynchronizer::new(context.store.clone(), context.config.sync_policy());
    let report = synchronizer.synchronize(now).await?;

    if report.outcome.is_noop() {
        output.info("Stage windows already consistent")?;
    } else {
        for stage_number in &report.outcome.closed_early {
            output.success(&format!("Stage {} sold out and closed early", stage_number))?;
        }
        if let Some(stage_number) = report.outcome.extended {
            output.warning(&format!(
                "Stage {} lapsed underfunded; extended to {}",
                stage_number,
                format_timestamp(report.current_stage.end_time)
            ))?;
        }
    }
    output.print(&format_output(&build_sync_view(&report), format)?)?;
    Ok(())
}

/// Handle `stages`
pub async fn handle_stages_command(cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_stages_command_with_output(&context, &cli.format, &ConsoleOutput).await
}

/// Handle `stages` with injected output (for testing)
///
/// Lists stages as stored; run `sync` or `status` first for a repaired view.
pub async fn handle_stages_command_with_output<O: Output>(
    context: &PresaleContext,
    format: &str,
    output: &O,
) -> CliResult<()> {
    context.ensure_initialized().await?;
    let stages = context.store.load_stages().await?;

    if format == "table" {
        output.header("Stages")?;
        for stage in &stages {
            output.print(&describe_stage(stage))?;
        }
    } else {
        let rows: Vec<Value> = stages.iter().map(build_stage_row).collect();
        output.print(&format_output(&Value::Array(rows), format)?)?;
    }
    Ok(())
}
