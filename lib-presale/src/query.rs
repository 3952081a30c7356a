//! Presale status projection
//!
//! Read path: synchronize the schedule, then derive the figures shown to
//! buyers. Writes only happen inside the synchronizer.

use serde::Serialize;

use crate::errors::PresaleResult;
use crate::store::StageStore;
use crate::synchronizer::StageSynchronizer;
use crate::types::{round_to_precision, Stage};

/// Aggregate presale figures
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresaleAggregates {
    /// Σ raised / rate over every stage
    pub tokens_sold: f64,
    /// Total supply minus tokens sold, floored at zero
    pub tokens_remaining: f64,
    /// Targets of completed stages plus the current stage's raised amount
    pub total_raised: f64,
    /// Capacity left across every stage
    pub remaining_capacity: f64,
    /// Current stage raised / target, in [0, 1]
    pub stage_progress: f64,
    /// Seconds until the current stage window closes, floored at zero
    pub seconds_remaining: i64,
}

/// Everything the storefront needs to render the sale
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresaleStatus {
    pub stages: Vec<Stage>,
    pub current_stage: Stage,
    pub aggregates: PresaleAggregates,
}

/// Compute aggregates for an already synchronized stage list
pub fn compute_aggregates(
    stages: &[Stage],
    current_index: usize,
    total_supply: f64,
    precision: u32,
    now: i64,
) -> PresaleAggregates {
    let tokens_sold: f64 = stages
        .iter()
        .map(|stage| stage.tokens_for(stage.raised, precision))
        .sum();
    let tokens_sold = round_to_precision(tokens_sold, precision);

    let current = &stages[current_index];
    let completed_raised: f64 = stages
        .iter()
        .enumerate()
        .filter(|(index, stage)| *index != current_index && stage.is_filled())
        .map(|(_, stage)| stage.target)
        .sum();

    PresaleAggregates {
        tokens_sold,
        tokens_remaining: round_to_precision((total_supply - tokens_sold).max(0.0), precision),
        total_raised: completed_raised + current.raised,
        remaining_capacity: stages.iter().map(Stage::remaining_capacity).sum(),
        stage_progress: (current.raised / current.target).clamp(0.0, 1.0),
        seconds_remaining: (current.end_time - now).max(0),
    }
}

/// Read-only presale projection
#[derive(Debug)]
pub struct PresaleQueryService<S: StageStore + ?Sized> {
    synchronizer: StageSynchronizer<S>,
    total_supply: f64,
    precision: u32,
}

impl<S: StageStore + ?Sized> PresaleQueryService<S> {
    pub fn new(synchronizer: StageSynchronizer<S>, total_supply: f64, precision: u32) -> Self {
        Self {
            synchronizer,
            total_supply,
            precision,
        }
    }

    /// Synchronize as of `now` and project the current presale state
    pub async fn get_status(&self, now: i64) -> PresaleResult<PresaleStatus> {
        let report = self.synchronizer.synchronize(now).await?;
        let aggregates = compute_aggregates(
            &report.stages,
            report.outcome.current_index,
            self.total_supply,
            self.precision,
            now,
        );

        Ok(PresaleStatus {
            stages: report.stages,
            current_stage: report.current_stage,
            aggregates,
        })
    }
}
