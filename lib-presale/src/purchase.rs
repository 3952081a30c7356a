//! Purchase execution
//!
//! A purchase runs as one logical transaction against the stage store:
//!
//! 1. normalize the payment into the reference currency
//! 2. load the stages and synchronize them in memory
//! 3. enforce the over-purchase policy
//! 4. allocate the payment across stages
//! 5. synchronize again so a stage filled by this purchase closes now
//! 6. commit every changed stage in one version-checked write
//!
//! The stage list is threaded through these steps in memory; the store is
//! read once and written once. A quote runs steps 1-5 and stops.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::allocator::{
    allocate_across_stages, check_capacity, validate_amount, AllocationPolicy, StageFill,
    CAPACITY_TOLERANCE,
};
use crate::currency::CurrencyConverter;
use crate::errors::PresaleResult;
use crate::store::StageStore;
use crate::synchronizer::{synchronize_stages, SyncPolicy};
use crate::types::{diff_stages, mark_committed, Stage};

/// Incoming purchase
#[derive(Debug, Clone, PartialEq)]
pub struct PurchaseRequest {
    /// Amount paid, in `currency` units
    pub amount: f64,
    pub currency: String,
}

impl PurchaseRequest {
    pub fn new(amount: f64, currency: impl Into<String>) -> Self {
        Self {
            amount,
            currency: currency.into(),
        }
    }
}

/// Outcome of a committed purchase
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseReceipt {
    pub currency: String,
    pub amount_paid: f64,
    /// `amount_paid` converted to the reference currency
    pub reference_amount: f64,
    pub tokens: f64,
    pub fills: Vec<StageFill>,
    /// Reference-currency amount no stage could absorb (truncate policy only)
    pub unallocated: f64,
    /// Current stage once the purchase is applied
    pub current_stage: Stage,
}

impl PurchaseReceipt {
    /// True when part of the payment found no stage to absorb it
    pub fn is_truncated(&self) -> bool {
        self.unallocated > CAPACITY_TOLERANCE
    }
}

/// In-memory result of a purchase, before it is committed
struct PricedPurchase {
    /// Stages as loaded from the store
    snapshot: Vec<Stage>,
    stages: Vec<Stage>,
    current_index: usize,
    receipt: PurchaseReceipt,
}

/// Executes purchases against a stage store
#[derive(Debug)]
pub struct PurchaseService<S: StageStore + ?Sized> {
    store: Arc<S>,
    converter: CurrencyConverter,
    sync_policy: SyncPolicy,
    allocation_policy: AllocationPolicy,
}

impl<S: StageStore + ?Sized> PurchaseService<S> {
    pub fn new(
        store: Arc<S>,
        converter: CurrencyConverter,
        sync_policy: SyncPolicy,
        allocation_policy: AllocationPolicy,
    ) -> Self {
        Self {
            store,
            converter,
            sync_policy,
            allocation_policy,
        }
    }

    /// Execute `request` as of `now`
    pub async fn purchase(&self, request: &PurchaseRequest, now: i64) -> PresaleResult<PurchaseReceipt> {
        let PricedPurchase {
            snapshot,
            mut stages,
            current_index,
            mut receipt,
        } = self.price(request, now).await?;

        let changes = diff_stages(&snapshot, &stages);
        self.store.commit(&changes).await?;
        mark_committed(&mut stages, &changes);
        receipt.current_stage = stages[current_index].clone();

        info!(
            "Purchase of {} {} ({} {}) granted {} tokens across stage(s) {:?}",
            receipt.amount_paid,
            receipt.currency,
            receipt.reference_amount,
            self.converter.reference(),
            receipt.tokens,
            receipt.fills.iter().map(|f| f.stage_number).collect::<Vec<_>>()
        );
        Ok(receipt)
    }

    /// Price `request` as of `now` without writing anything
    pub async fn quote(&self, request: &PurchaseRequest, now: i64) -> PresaleResult<PurchaseReceipt> {
        let receipt = self.price(request, now).await?.receipt;
        debug!(
            "Quoted {} {} at {} tokens",
            receipt.amount_paid, receipt.currency, receipt.tokens
        );
        Ok(receipt)
    }

    /// Run the purchase pipeline in memory
    async fn price(&self, request: &PurchaseRequest, now: i64) -> PresaleResult<PricedPurchase> {
        validate_amount(request.amount)?;
        let reference_amount = self.converter.to_reference(request.amount, &request.currency)?;
        validate_amount(reference_amount)?;

        let mut stages = self.store.load_stages().await?;
        let snapshot = stages.clone();

        synchronize_stages(&mut stages, now, &self.sync_policy)?;
        check_capacity(&stages, reference_amount, self.allocation_policy.over_purchase)?;
        let allocation =
            allocate_across_stages(&mut stages, reference_amount, self.allocation_policy.token_precision)?;
        let outcome = synchronize_stages(&mut stages, now, &self.sync_policy)?;

        let receipt = PurchaseReceipt {
            currency: request.currency.to_uppercase(),
            amount_paid: request.amount,
            reference_amount,
            tokens: allocation.tokens,
            fills: allocation.fills,
            unallocated: allocation.unallocated,
            current_stage: stages[outcome.current_index].clone(),
        };
        Ok(PricedPurchase {
            snapshot,
            stages,
            current_index: outcome.current_index,
            receipt,
        })
    }
}
