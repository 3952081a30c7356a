//! Stage store abstraction
//!
//! The store is the only shared mutable resource of the presale engine.
//! Services read the full ordered stage list, compute their changes in
//! memory and write them back through [`StageStore::commit`], which applies
//! a whole change set atomically and only if every touched row still has the
//! version it was read at. This closes the lost-update window between two
//! purchases that read the same snapshot.
//!
//! # Implementations
//!
//! - [`MemoryStageStore`]: in-memory, suitable for tests and development
//! - [`SqliteStageStore`]: persistent, backed by sqlx/SQLite
//!
//! ## Example
//! ```rust,ignore
//! use lib_presale::store::{StageStore, MemoryStageStore};
//! use lib_presale::types::{Stage, StageUpdate};
//!
//! async fn close_first<S: StageStore>(store: &S) -> lib_presale::PresaleResult<()> {
//!     let stages = store.load_stages().await?;
//!     store
//!         .update_stage(stages[0].stage_number, &StageUpdate { end_time: Some(0), ..Default::default() })
//!         .await
//! }
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use std::fmt;

use crate::errors::PresaleResult;
use crate::types::{Stage, StageChange, StageUpdate};

pub use memory::MemoryStageStore;
pub use sqlite::SqliteStageStore;

/// Persistent ordered collection of presale stages
#[async_trait]
pub trait StageStore: Send + Sync + fmt::Debug {
    /// Read every stage ordered by stage number
    async fn load_stages(&self) -> PresaleResult<Vec<Stage>>;

    /// Apply a partial update to one stage, bumping its version
    ///
    /// Fails with `StageNotFound` for an unknown stage number.
    async fn update_stage(&self, stage_number: u32, update: &StageUpdate) -> PresaleResult<()>;

    /// Atomically add `delta` to a stage's `raised`
    async fn increment_raised(&self, stage_number: u32, delta: f64) -> PresaleResult<()>;

    /// Apply a change set atomically.
    ///
    /// Implementations must apply either every change or none, and must fail
    /// with `ConcurrentModification` when a row's stored version differs from
    /// `expected_version`.
    async fn commit(&self, changes: &[StageChange]) -> PresaleResult<()>;

    /// Number of stages stored
    async fn stage_count(&self) -> PresaleResult<usize> {
        Ok(self.load_stages().await?.len())
    }

    /// Short backend identifier for logging
    fn backend_type(&self) -> &'static str;
}
