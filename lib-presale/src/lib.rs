//! Presale Stage Engine
//!
//! Tracks a multi-stage token presale: each stage has a funding target, a
//! token rate and a time window. The engine keeps stage windows consistent
//! with the wall clock and with funding velocity, and allocates payments
//! across stages when a purchase crosses a stage boundary.
//!
//! # Key Types
//!
//! - [`Stage`]: one tranche of the sale
//! - [`StageStore`]: persistent ordered stage collection ([`MemoryStageStore`], [`SqliteStageStore`])
//! - [`StageSynchronizer`]: closes sold-out stages, extends lapsed ones, cascades the schedule
//! - [`StageAllocator`]: spreads a payment across stages in order
//! - [`PurchaseService`]: synchronize → allocate → synchronize, committed atomically
//! - [`PresaleQueryService`]: status projection for the storefront
//!
//! # Execution
//!
//! Every service reads the stage list once, works on it in memory and writes
//! the resulting change set through [`StageStore::commit`], which is atomic
//! and version-checked per stage row.

pub mod allocator;
pub mod config;
pub mod currency;
pub mod errors;
pub mod purchase;
pub mod query;
pub mod store;
pub mod synchronizer;
pub mod types;

pub use allocator::{
    allocate_across_stages, total_remaining_capacity, Allocation, AllocationPolicy,
    OverPurchasePolicy, StageAllocator, StageFill,
};
pub use config::PresaleConfig;
pub use currency::{CurrencyConverter, CurrencyRate};
pub use errors::{PresaleError, PresaleResult};
pub use purchase::{PurchaseReceipt, PurchaseRequest, PurchaseService};
pub use query::{compute_aggregates, PresaleAggregates, PresaleQueryService, PresaleStatus};
pub use store::{MemoryStageStore, SqliteStageStore, StageStore};
pub use synchronizer::{synchronize_stages, StageSynchronizer, SyncOutcome, SyncPolicy, SyncReport};
pub use types::{current_stage_index, Stage, StageChange, StageUpdate, TOKEN_PRECISION};

/// Current wall-clock time as unix seconds
pub fn unix_now() -> i64 {
    chrono::Utc::now().timestamp()
}
