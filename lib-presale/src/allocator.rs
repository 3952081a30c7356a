//! Purchase allocation across stages
//!
//! A payment (already normalized to the reference currency) consumes stage
//! capacity in ascending stage order. When it does not fit in the current
//! stage, the stage is filled to its target and the remainder rolls into the
//! next one, priced at that stage's rate.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{PresaleError, PresaleResult};
use crate::store::StageStore;
use crate::types::{diff_stages, mark_committed, round_to_precision, Stage, TOKEN_PRECISION};

/// Slack tolerated when comparing a payment against remaining capacity, so
/// floating-point noise does not reject an exact fill.
pub const CAPACITY_TOLERANCE: f64 = 1e-9;

/// What to do with a payment larger than the capacity left in the sale
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverPurchasePolicy {
    /// Refuse the purchase before touching any stage
    #[default]
    Reject,
    /// Fill whatever capacity remains and drop the excess
    Truncate,
}

/// Allocation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocationPolicy {
    pub over_purchase: OverPurchasePolicy,
    pub token_precision: u32,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            over_purchase: OverPurchasePolicy::Reject,
            token_precision: TOKEN_PRECISION,
        }
    }
}

/// Portion of a payment committed to one stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFill {
    pub stage_number: u32,
    /// Reference-currency amount committed
    pub amount: f64,
    /// Tokens granted for `amount` at the stage rate
    pub tokens: f64,
    /// Whether this fill exhausted the stage
    pub completed_stage: bool,
}

/// Breakdown of an allocation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Allocation {
    pub fills: Vec<StageFill>,
    /// Total tokens granted
    pub tokens: f64,
    /// Reference-currency amount actually committed
    pub allocated: f64,
    /// Part of the payment no stage could absorb
    pub unallocated: f64,
}

impl Allocation {
    pub fn is_truncated(&self) -> bool {
        self.unallocated > CAPACITY_TOLERANCE
    }
}

/// Sum of the capacity left across every stage
pub fn total_remaining_capacity(stages: &[Stage]) -> f64 {
    stages.iter().map(Stage::remaining_capacity).sum()
}

/// Reject non-positive and non-finite amounts
pub fn validate_amount(amount: f64) -> PresaleResult<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(PresaleError::InvalidAmount(amount));
    }
    Ok(())
}

/// Reject a payment the remaining capacity cannot absorb under `Reject`
pub fn check_capacity(stages: &[Stage], amount: f64, policy: OverPurchasePolicy) -> PresaleResult<()> {
    if policy == OverPurchasePolicy::Truncate {
        return Ok(());
    }
    let available = total_remaining_capacity(stages);
    if amount > available + CAPACITY_TOLERANCE {
        return Err(PresaleError::CapacityExceeded {
            requested: amount,
            available,
        });
    }
    Ok(())
}

/// Allocate `amount_paid` across `stages` (ordered by stage number).
///
/// Whatever does not fit after the last stage is reported as
/// `unallocated`; callers enforce the over-purchase policy beforehand with
/// [`check_capacity`].
pub fn allocate_across_stages(
    stages: &mut [Stage],
    amount_paid: f64,
    precision: u32,
) -> PresaleResult<Allocation> {
    validate_amount(amount_paid)?;
    if stages.is_empty() {
        return Err(PresaleError::EmptyStore);
    }

    let mut remaining = amount_paid;
    let mut allocation = Allocation::default();

    for stage in stages.iter_mut() {
        if remaining <= 0.0 {
            break;
        }
        if stage.is_filled() {
            continue;
        }

        let capacity = stage.target - stage.raised;
        // A payment within tolerance of the capacity completes the stage
        // outright, so float noise never spills into the next stage.
        let completed_stage = remaining >= capacity - CAPACITY_TOLERANCE;
        let amount = if remaining > capacity + CAPACITY_TOLERANCE {
            capacity
        } else {
            remaining
        };

        // Pin a filled stage to its target rather than accumulating rounding.
        stage.raised = if completed_stage {
            stage.target
        } else {
            stage.raised + amount
        };

        let tokens = stage.tokens_for(amount, precision);
        allocation.tokens = round_to_precision(allocation.tokens + tokens, precision);
        allocation.allocated += amount;
        remaining = if amount == remaining { 0.0 } else { remaining - amount };

        debug!(
            "Stage {}: committed {} for {} tokens (raised {}/{})",
            stage.stage_number, amount, tokens, stage.raised, stage.target
        );

        allocation.fills.push(StageFill {
            stage_number: stage.stage_number,
            amount,
            tokens,
            completed_stage,
        });
    }

    allocation.unallocated = remaining.max(0.0);
    if allocation.is_truncated() {
        warn!(
            "Presale sold out mid-allocation: {} of {} could not be allocated",
            allocation.unallocated, amount_paid
        );
    }

    Ok(allocation)
}

/// Allocator bound to a stage store
#[derive(Debug)]
pub struct StageAllocator<S: StageStore + ?Sized> {
    store: Arc<S>,
    policy: AllocationPolicy,
}

impl<S: StageStore + ?Sized> StageAllocator<S> {
    pub fn new(store: Arc<S>, policy: AllocationPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &AllocationPolicy {
        &self.policy
    }

    /// Allocate a reference-currency payment and commit every touched stage
    /// in one atomic, version-checked write.
    pub async fn allocate(&self, amount_paid: f64) -> PresaleResult<Allocation> {
        validate_amount(amount_paid)?;
        let mut stages = self.store.load_stages().await?;
        check_capacity(&stages, amount_paid, self.policy.over_purchase)?;

        let snapshot = stages.clone();
        let allocation = allocate_across_stages(&mut stages, amount_paid, self.policy.token_precision)?;

        let changes = diff_stages(&snapshot, &stages);
        self.store.commit(&changes).await?;
        mark_committed(&mut stages, &changes);

        info!(
            "Allocated {} across {} stage(s) for {} tokens",
            allocation.allocated,
            allocation.fills.len(),
            allocation.tokens
        );
        Ok(allocation)
    }

    /// Price a payment against the current stages without committing it
    pub async fn quote(&self, amount_paid: f64) -> PresaleResult<Allocation> {
        validate_amount(amount_paid)?;
        let mut stages = self.store.load_stages().await?;
        check_capacity(&stages, amount_paid, self.policy.over_purchase)?;
        allocate_across_stages(&mut stages, amount_paid, self.policy.token_precision)
    }
}
