//! Write-side commands: `quote` and `purchase`

use lib_presale::{PurchaseReceipt, PurchaseRequest, PurchaseService, SqliteStageStore};
use serde_json::{json, Value};

use crate::argument_parsing::{format_output, PresaleCli};
use crate::commands::PresaleContext;
use crate::error::CliResult;
use crate::output::{ConsoleOutput, Output};

// ============================================================================
// PURE LOGIC
// ============================================================================

/// Flat receipt view
pub fn build_receipt_view(receipt: &PurchaseReceipt, reference_currency: &str) -> Value {
    let fills: Vec<Value> = receipt
        .fills
        .iter()
        .map(|fill| {
            json!({
                "stage": fill.stage_number,
                "amount": fill.amount,
                "tokens": fill.tokens,
                "completed_stage": fill.completed_stage,
            })
        })
        .collect();

    json!({
        "paid": format!("{} {}", receipt.amount_paid, receipt.currency),
        "reference_amount": format!("{} {}", receipt.reference_amount, reference_currency.to_uppercase()),
        "tokens": receipt.tokens,
        "unallocated": receipt.unallocated,
        "current_stage": receipt.current_stage.stage_number,
        "fills": fills,
    })
}

fn purchase_service(context: &PresaleContext) -> CliResult<PurchaseService<SqliteStageStore>> {
    Ok(PurchaseService::new(
        context.store.clone(),
        context.config.currency_converter()?,
        context.config.sync_policy(),
        context.config.allocation_policy(),
    ))
}

fn print_receipt<O: Output>(
    receipt: &PurchaseReceipt,
    context: &PresaleContext,
    format: &str,
    output: &O,
) -> CliResult<()> {
    let view = build_receipt_view(receipt, &context.config.reference_currency);
    if format == "json" {
        output.print_json(&view)?;
    } else {
        output.print(&format_output(&view, format)?)?;
    }
    if receipt.is_truncated() {
        output.warning(&format!(
            "Presale sold out: {} {} could not be allocated",
            receipt.unallocated, context.config.reference_currency
        ))?;
    }
    Ok(())
}

// ============================================================================
// IMPERATIVE SHELL
// ============================================================================

/// Handle `quote`
pub async fn handle_quote_command(amount: f64, currency: &str, cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_quote_command_with_output(&context, amount, currency, cli.now(), &cli.format, &ConsoleOutput)
        .await
}

/// Handle `quote` with injected output (for testing)
pub async fn handle_quote_command_with_output<O: Output>(
    context: &PresaleContext,
    amount: f64,
    currency: &str,
    now: i64,
    format: &str,
    output: &O,
) -> CliResult<()> {
    context.ensure_initialized().await?;
    let receipt = purchase_service(context)?
        .quote(&PurchaseRequest::new(amount, currency), now)
        .await?;

    output.info(&format!(
        "{} {} buys {} tokens (not executed)",
        receipt.amount_paid, receipt.currency, receipt.tokens
    ))?;
    print_receipt(&receipt, context, format, output)
}

/// Handle `purchase`
pub async fn handle_purchase_command(amount: f64, currency: &str, cli: &PresaleCli) -> CliResult<()> {
    let context = PresaleContext::load(cli).await?;
    handle_purchase_command_with_output(&context, amount, currency, cli.now(), &cli.format, &ConsoleOutput)
        .await
}

/// Handle `purchase` with injected output (for testing)
pub async fn handle_purchase_command_with_output<O: Output>(
    context: &PresaleContext,
    amount: f64,
    currency: &str,
    now: i64,
    format: &str,
    output: &O,
) -> CliResult<()> {
    context.ensure_initialized().await?;
    let receipt = purchase_service(context)?
        .purchase(&PurchaseRequest::new(amount, currency), now)
        .await?;

    output.success(&format!(
        "Purchased {} tokens for {} {}",
        receipt.tokens, receipt.amount_paid, receipt.currency
    ))?;
    print_receipt(&receipt, context, format, output)
}
