//! Stage window synchronization
//!
//! Repairs stage time windows against the wall clock and funding state:
//!
//! - A stage that sold out before its scheduled close is closed at `now`.
//! - A current stage whose window lapsed while underfunded is extended by
//!   the grace period.
//! - Any such correction cascades through the rest of the schedule, each
//!   later stage keeping its own duration and starting where the previous
//!   one ends.
//!
//! The pass is a pure function over an in-memory stage list
//! ([`synchronize_stages`]); [`StageSynchronizer`] wraps it with a load and
//! an atomic commit against a [`StageStore`].

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::{PresaleError, PresaleResult};
use crate::store::StageStore;
use crate::types::{current_stage_index, diff_stages, mark_committed, Stage};

/// Grace period granted to an expired, underfunded stage: 7 days.
pub const DEFAULT_GRACE_PERIOD_SECS: i64 = 7 * 24 * 60 * 60;

/// Forward nudge applied when closing a sold-out stage early.
pub const DEFAULT_COMPLETION_NUDGE_SECS: i64 = 1;

/// Timing parameters of the synchronization pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub grace_period_secs: i64,
    pub completion_nudge_secs: i64,
}

impl SyncPolicy {
    pub fn from_durations(grace_period: Duration, completion_nudge: Duration) -> Self {
        Self {
            grace_period_secs: i64::try_from(grace_period.as_secs()).unwrap_or(i64::MAX),
            completion_nudge_secs: i64::try_from(completion_nudge.as_secs()).unwrap_or(i64::MAX),
        }
    }
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            completion_nudge_secs: DEFAULT_COMPLETION_NUDGE_SECS,
        }
    }
}

/// What a synchronization pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    /// Index of the current stage after the pass
    pub current_index: usize,
    /// Stages closed early because they sold out
    pub closed_early: Vec<u32>,
    /// Stage extended by the grace period, if any
    pub extended: Option<u32>,
    /// Earliest stage whose correction was cascaded forward
    pub shift_origin: Option<u32>,
}

impl SyncOutcome {
    /// Whether the pass moved any window
    pub fn is_noop(&self) -> bool {
        self.shift_origin.is_none()
    }
}

/// Run one synchronization pass over `stages` (ordered by stage number).
pub fn synchronize_stages(
    stages: &mut [Stage],
    now: i64,
    policy: &SyncPolicy,
) -> PresaleResult<SyncOutcome> {
    if stages.is_empty() {
        return Err(PresaleError::EmptyStore);
    }

    // Durations as scheduled before this pass.
    let durations: Vec<i64> = stages.iter().map(Stage::duration).collect();
    let closed_at = now.saturating_add(policy.completion_nudge_secs);

    let mut outcome = SyncOutcome::default();
    let mut origin: Option<usize> = None;

    for (index, stage) in stages.iter_mut().enumerate() {
        // A stage never closes before it opened.
        let closes_at = closed_at.max(stage.start_time);
        if stage.is_filled() && stage.end_time > closes_at {
            debug!(
                "Stage {} sold out early, closing at {} (was {})",
                stage.stage_number, closes_at, stage.end_time
            );
            stage.end_time = closes_at;
            outcome.closed_early.push(stage.stage_number);
            origin.get_or_insert(index);
        }
    }

    let current = current_stage_index(stages).ok_or(PresaleError::EmptyStore)?;
    let stage = &mut stages[current];
    if !stage.is_filled() && stage.end_time < now && policy.grace_period_secs > 0 {
        // Widened so no lapse or grace period can overflow; clamping to
        // i64::MAX still covers `now`.
        let grace = i128::from(policy.grace_period_secs);
        let lapse = i128::from(now) - i128::from(stage.end_time);
        let periods = (lapse + grace - 1) / grace;
        let extended_to =
            i64::try_from(i128::from(stage.end_time) + periods * grace).unwrap_or(i64::MAX);
        debug!(
            "Stage {} expired underfunded, extending {} -> {}",
            stage.stage_number, stage.end_time, extended_to
        );
        stage.end_time = extended_to;
        outcome.extended = Some(stage.stage_number);
        origin = Some(origin.map_or(current, |earliest| earliest.min(current)));
    }

    if let Some(origin) = origin {
        for index in origin + 1..stages.len() {
            let previous_end = stages[index - 1].end_time;
            let stage = &mut stages[index];
            stage.start_time = previous_end;
            // Sold-out stages collapse to their closing instant.
            stage.end_time = if stage.is_filled() {
                closed_at.max(previous_end)
            } else {
                previous_end.saturating_add(durations[index])
            };
        }
        outcome.shift_origin = Some(stages[origin].stage_number);
    }

    outcome.current_index = current_stage_index(stages).ok_or(PresaleError::EmptyStore)?;
    Ok(outcome)
}

/// Result of a persisted synchronization
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub stages: Vec<Stage>,
    pub current_stage: Stage,
    pub outcome: SyncOutcome,
}

/// Synchronizer bound to a stage store
#[derive(Debug)]
pub struct StageSynchronizer<S: StageStore + ?Sized> {
    store: Arc<S>,
    policy: SyncPolicy,
}

impl<S: StageStore + ?Sized> Clone for StageSynchronizer<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            policy: self.policy,
        }
    }
}

impl<S: StageStore + ?Sized> StageSynchronizer<S> {
    pub fn new(store: Arc<S>, policy: SyncPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &SyncPolicy {
        &self.policy
    }

    /// Load stages, repair their windows as of `now` and persist any change
    /// in one atomic commit.
    pub async fn synchronize(&self, now: i64) -> PresaleResult<SyncReport> {
        let mut stages = self.store.load_stages().await?;
        let snapshot = stages.clone();
        let outcome = synchronize_stages(&mut stages, now, &self.policy)?;

        let changes = diff_stages(&snapshot, &stages);
        if !changes.is_empty() {
            self.store.commit(&changes).await?;
            mark_committed(&mut stages, &changes);
            info!(
                "Synchronized {} stage(s): closed early {:?}, extended {:?}",
                changes.len(),
                outcome.closed_early,
                outcome.extended
            );
        }

        let current_stage = stages[outcome.current_index].clone();
        Ok(SyncReport {
            stages,
            current_stage,
            outcome,
        })
    }
}
