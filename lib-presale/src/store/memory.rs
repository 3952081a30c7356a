//! In-memory stage store for testing and development
//!
//! All data is lost on process termination.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::StageStore;
use crate::errors::{PresaleError, PresaleResult};
use crate::types::{validate_stage_sequence, Stage, StageChange, StageUpdate};

/// In-memory stage store
///
/// Stages live in a `BTreeMap` keyed by stage number behind `Arc<RwLock<>>`,
/// so clones share the same data. A commit holds the write lock for the
/// whole change set.
#[derive(Clone, Debug, Default)]
pub struct MemoryStageStore {
    stages: Arc<RwLock<BTreeMap<u32, Stage>>>,
}

impl MemoryStageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a validated stage sequence
    pub fn with_stages(stages: Vec<Stage>) -> PresaleResult<Self> {
        let store = Self::new();
        store.seed(stages)?;
        Ok(store)
    }

    /// Replace the stored sequence with `stages`
    pub fn seed(&self, stages: Vec<Stage>) -> PresaleResult<()> {
        validate_stage_sequence(&stages)?;
        let mut map = self.stages.write();
        map.clear();
        map.extend(stages.into_iter().map(|stage| (stage.stage_number, stage)));
        Ok(())
    }
}

#[async_trait]
impl StageStore for MemoryStageStore {
    async fn load_stages(&self) -> PresaleResult<Vec<Stage>> {
        let map = self.stages.read();
        Ok(map.values().cloned().collect())
    }

    async fn update_stage(&self, stage_number: u32, update: &StageUpdate) -> PresaleResult<()> {
        let mut map = self.stages.write();
        let stage = map
            .get_mut(&stage_number)
            .ok_or(PresaleError::StageNotFound(stage_number))?;
        update.apply_to(stage);
        stage.version += 1;
        Ok(())
    }

    async fn increment_raised(&self, stage_number: u32, delta: f64) -> PresaleResult<()> {
        let mut map = self.stages.write();
        let stage = map
            .get_mut(&stage_number)
            .ok_or(PresaleError::StageNotFound(stage_number))?;
        stage.raised += delta;
        stage.version += 1;
        Ok(())
    }

    async fn commit(&self, changes: &[StageChange]) -> PresaleResult<()> {
        let mut map = self.stages.write();

        // Check every row first so a conflict leaves the map untouched.
        for change in changes {
            let stage = map
                .get(&change.stage_number)
                .ok_or(PresaleError::StageNotFound(change.stage_number))?;
            if stage.version != change.expected_version {
                return Err(PresaleError::ConcurrentModification {
                    stage_number: change.stage_number,
                });
            }
        }

        for change in changes {
            if let Some(stage) = map.get_mut(&change.stage_number) {
                change.update.apply_to(stage);
                stage.version += 1;
            }
        }
        Ok(())
    }

    async fn stage_count(&self) -> PresaleResult<usize> {
        Ok(self.stages.read().len())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
