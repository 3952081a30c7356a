//! Presale stage data model
//!
//! A presale is an ordered sequence of [`Stage`]s. Each stage has its own
//! price, capacity and time window. Monetary values (`target`, `raised`,
//! `rate`) are expressed in the reference currency; timestamps are unix
//! seconds.

use serde::{Deserialize, Serialize};

use crate::errors::{PresaleError, PresaleResult};

/// Default number of decimal places kept for token amounts.
pub const TOKEN_PRECISION: u32 = 8;

/// One sequential tranche of the token sale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    /// Position in the sale, starting at 1
    pub stage_number: u32,
    /// Window start (unix seconds)
    pub start_time: i64,
    /// Window end (unix seconds)
    pub end_time: i64,
    /// Capacity in reference currency
    pub target: f64,
    /// Amount already committed to this stage
    pub raised: f64,
    /// Price of one token in reference currency
    pub rate: f64,
    /// Informational reference price
    pub listing_price: f64,
    /// Optimistic concurrency counter, bumped on every persisted change
    #[serde(default)]
    pub version: u64,
}

impl Stage {
    /// Create an unfunded stage. The listing price defaults to the stage rate.
    pub fn new(stage_number: u32, start_time: i64, end_time: i64, target: f64, rate: f64) -> Self {
        Self {
            stage_number,
            start_time,
            end_time,
            target,
            raised: 0.0,
            rate,
            listing_price: rate,
            version: 0,
        }
    }

    pub fn with_raised(mut self, raised: f64) -> Self {
        self.raised = raised;
        self
    }

    pub fn with_listing_price(mut self, listing_price: f64) -> Self {
        self.listing_price = listing_price;
        self
    }

    /// Whether the stage has sold its full target
    pub fn is_filled(&self) -> bool {
        self.raised >= self.target
    }

    /// Room left in this stage, never negative
    pub fn remaining_capacity(&self) -> f64 {
        (self.target - self.raised).max(0.0)
    }

    /// Window length in seconds
    pub fn duration(&self) -> i64 {
        self.end_time.saturating_sub(self.start_time)
    }

    /// Tokens bought by `amount` reference-currency units at this stage's rate
    pub fn tokens_for(&self, amount: f64, precision: u32) -> f64 {
        round_to_precision(amount / self.rate, precision)
    }

    /// Check the per-stage creation invariants
    pub fn validate(&self) -> PresaleResult<()> {
        let n = self.stage_number;
        if n == 0 {
            return Err(PresaleError::InvalidStage("stage numbers start at 1".to_string()));
        }
        if self.start_time >= self.end_time {
            return Err(PresaleError::InvalidStage(format!(
                "stage {}: start_time {} must be before end_time {}",
                n, self.start_time, self.end_time
            )));
        }
        for (name, value) in [
            ("target", self.target),
            ("raised", self.raised),
            ("rate", self.rate),
            ("listing_price", self.listing_price),
        ] {
            if !value.is_finite() {
                return Err(PresaleError::InvalidStage(format!("stage {}: {} is not finite", n, name)));
            }
        }
        if self.target <= 0.0 {
            return Err(PresaleError::InvalidStage(format!("stage {}: target must be positive", n)));
        }
        if self.rate <= 0.0 {
            return Err(PresaleError::InvalidStage(format!("stage {}: rate must be positive", n)));
        }
        if self.raised < 0.0 || self.raised > self.target {
            return Err(PresaleError::InvalidStage(format!(
                "stage {}: raised {} outside [0, {}]",
                n, self.raised, self.target
            )));
        }
        Ok(())
    }
}

/// Validate a full seed sequence: every stage valid and numbered 1..=n in order
pub fn validate_stage_sequence(stages: &[Stage]) -> PresaleResult<()> {
    if stages.is_empty() {
        return Err(PresaleError::EmptyStore);
    }
    for (index, stage) in stages.iter().enumerate() {
        stage.validate()?;
        let expected = index as u32 + 1;
        if stage.stage_number != expected {
            return Err(PresaleError::InvalidStage(format!(
                "expected stage number {}, found {}",
                expected, stage.stage_number
            )));
        }
    }
    Ok(())
}

/// Index of the current stage: the first one still underfunded, or the last
/// stage once everything is sold. `None` only for an empty slice.
pub fn current_stage_index(stages: &[Stage]) -> Option<usize> {
    if stages.is_empty() {
        return None;
    }
    Some(
        stages
            .iter()
            .position(|stage| !stage.is_filled())
            .unwrap_or(stages.len() - 1),
    )
}

/// Round to a fixed number of fractional digits
pub fn round_to_precision(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Partial update of one stage row. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageUpdate {
    pub raised: Option<f64>,
    pub start_time: Option<i64>,
    pub end_time: Option<i64>,
}

impl StageUpdate {
    pub fn is_empty(&self) -> bool {
        self.raised.is_none() && self.start_time.is_none() && self.end_time.is_none()
    }

    /// Apply the update to an in-memory stage
    pub fn apply_to(&self, stage: &mut Stage) {
        if let Some(raised) = self.raised {
            stage.raised = raised;
        }
        if let Some(start_time) = self.start_time {
            stage.start_time = start_time;
        }
        if let Some(end_time) = self.end_time {
            stage.end_time = end_time;
        }
    }
}

/// A version-checked stage update, committed atomically with its siblings
#[derive(Debug, Clone, PartialEq)]
pub struct StageChange {
    pub stage_number: u32,
    /// Version the change was computed against
    pub expected_version: u64,
    pub update: StageUpdate,
}

/// Compute the changes that turn `before` into `after`.
///
/// Both slices must describe the same stages in the same order.
pub fn diff_stages(before: &[Stage], after: &[Stage]) -> Vec<StageChange> {
    before
        .iter()
        .zip(after.iter())
        .filter_map(|(old, new)| {
            let update = StageUpdate {
                raised: (old.raised != new.raised).then_some(new.raised),
                start_time: (old.start_time != new.start_time).then_some(new.start_time),
                end_time: (old.end_time != new.end_time).then_some(new.end_time),
            };
            (!update.is_empty()).then(|| StageChange {
                stage_number: old.stage_number,
                expected_version: old.version,
                update,
            })
        })
        .collect()
}

/// Bump in-memory versions after `changes` were committed to the store
pub fn mark_committed(stages: &mut [Stage], changes: &[StageChange]) {
    for change in changes {
        if let Some(stage) = stages
            .iter_mut()
            .find(|stage| stage.stage_number == change.stage_number)
        {
            stage.version = change.expected_version + 1;
        }
    }
}
