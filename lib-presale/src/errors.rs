//! Presale Engine Errors

use thiserror::Error;

/// Error during presale operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PresaleError {
    #[error("Stage store is empty; seed stages before use")]
    EmptyStore,

    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),

    #[error("Capacity exceeded: requested {requested}, available {available}")]
    CapacityExceeded { requested: f64, available: f64 },

    #[error("Unsupported currency: {0}")]
    UnsupportedCurrency(String),

    #[error("Stage not found: {0}")]
    StageNotFound(u32),

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Stage {stage_number} was modified concurrently")]
    ConcurrentModification { stage_number: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for presale operations
pub type PresaleResult<T> = Result<T, PresaleError>;
