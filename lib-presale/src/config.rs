//! Presale configuration
//!
//! Loaded from a TOML file. Durations use humantime notation ("7days",
//! "1s"). Example:
//!
//! ```toml
//! total_supply = 1000000000.0
//! reference_currency = "USD"
//! database_path = "presale.db"
//!
//! [sync]
//! grace_period = "7days"
//! completion_nudge = "1s"
//!
//! [allocation]
//! over_purchase = "reject"
//! token_precision = 8
//!
//! [[currencies]]
//! symbol = "SOL"
//! rate = 150.0
//!
//! [schedule]
//! start_time = 1767225600
//!
//! [[schedule.stages]]
//! target = 500000.0
//! rate = 0.01
//! duration = "30days"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::allocator::AllocationPolicy;
use crate::currency::{CurrencyConverter, CurrencyRate};
use crate::errors::{PresaleError, PresaleResult};
use crate::synchronizer::{SyncPolicy, DEFAULT_COMPLETION_NUDGE_SECS, DEFAULT_GRACE_PERIOD_SECS};
use crate::types::{validate_stage_sequence, Stage};

/// Largest token precision that still fits comfortably in an f64 mantissa
pub const MAX_TOKEN_PRECISION: u32 = 12;

/// Longest grace period an underfunded stage can be extended by
pub const MAX_GRACE_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Top-level presale configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresaleConfig {
    /// Total token supply offered by the sale
    pub total_supply: f64,

    /// Unit of account for targets, raised amounts and rates
    #[serde(default = "default_reference_currency")]
    pub reference_currency: String,

    /// SQLite database file
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub allocation: AllocationPolicy,

    /// Accepted payment currencies besides the reference currency
    #[serde(default)]
    pub currencies: Vec<CurrencyRate>,

    /// Stage schedule used to seed an empty store
    #[serde(default)]
    pub schedule: Option<ScheduleConfig>,
}

/// Synchronization timing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Extension granted to an expired, underfunded stage
    #[serde(with = "humantime_serde", default = "default_grace_period")]
    pub grace_period: Duration,

    /// Offset past `now` used when closing a sold-out stage
    #[serde(with = "humantime_serde", default = "default_completion_nudge")]
    pub completion_nudge: Duration,
}

/// Seed schedule: stages run back to back from `start_time`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Start of stage 1 (unix seconds)
    pub start_time: i64,
    pub stages: Vec<StageSeed>,
}

/// One seeded stage; its number is its position in the schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageSeed {
    pub target: f64,
    pub rate: f64,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    #[serde(default)]
    pub listing_price: Option<f64>,
    #[serde(default)]
    pub raised: f64,
}

fn default_reference_currency() -> String {
    "USD".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("presale.db")
}

fn default_grace_period() -> Duration {
    Duration::from_secs(DEFAULT_GRACE_PERIOD_SECS as u64)
}

fn default_completion_nudge() -> Duration {
    Duration::from_secs(DEFAULT_COMPLETION_NUDGE_SECS as u64)
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            grace_period: default_grace_period(),
            completion_nudge: default_completion_nudge(),
        }
    }
}

impl PresaleConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> PresaleResult<Self> {
        let config: PresaleConfig = toml::from_str(content)
            .map_err(|e| PresaleError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub async fn load(path: impl AsRef<Path>) -> PresaleResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            PresaleError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded presale configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> PresaleResult<()> {
        if !self.total_supply.is_finite() || self.total_supply <= 0.0 {
            return Err(PresaleError::Config(format!(
                "total_supply must be positive, got {}",
                self.total_supply
            )));
        }
        if self.reference_currency.trim().is_empty() {
            return Err(PresaleError::Config("reference_currency cannot be empty".to_string()));
        }
        if self.sync.grace_period.as_secs() == 0 {
            return Err(PresaleError::Config("sync.grace_period must be at least 1s".to_string()));
        }
        if self.sync.grace_period > MAX_GRACE_PERIOD {
            return Err(PresaleError::Config(format!(
                "sync.grace_period must be at most {} days, got {}s",
                MAX_GRACE_PERIOD.as_secs() / (24 * 60 * 60),
                self.sync.grace_period.as_secs()
            )));
        }
        if self.sync.completion_nudge > self.sync.grace_period {
            return Err(PresaleError::Config(
                "sync.completion_nudge cannot exceed sync.grace_period".to_string(),
            ));
        }
        if self.allocation.token_precision > MAX_TOKEN_PRECISION {
            return Err(PresaleError::Config(format!(
                "allocation.token_precision must be at most {}",
                MAX_TOKEN_PRECISION
            )));
        }
        self.currency_converter()?;
        if self.schedule.is_some() {
            validate_stage_sequence(&self.seed_stages()?)?;
        }
        Ok(())
    }

    pub fn sync_policy(&self) -> SyncPolicy {
        SyncPolicy::from_durations(self.sync.grace_period, self.sync.completion_nudge)
    }

    pub fn allocation_policy(&self) -> AllocationPolicy {
        self.allocation
    }

    pub fn currency_converter(&self) -> PresaleResult<CurrencyConverter> {
        CurrencyConverter::with_rates(&self.reference_currency, &self.currencies)
    }

    /// Expand the schedule into contiguous stages numbered from 1
    pub fn seed_stages(&self) -> PresaleResult<Vec<Stage>> {
        let schedule = self
            .schedule
            .as_ref()
            .ok_or_else(|| PresaleError::Config("no [schedule] section configured".to_string()))?;

        let mut start = schedule.start_time;
        let mut stages = Vec::with_capacity(schedule.stages.len());
        for (index, seed) in schedule.stages.iter().enumerate() {
            let end = i64::try_from(seed.duration.as_secs())
                .ok()
                .and_then(|secs| start.checked_add(secs))
                .ok_or_else(|| {
                    PresaleError::Config(format!(
                        "stage {} ends past the representable time range",
                        index + 1
                    ))
                })?;
            let stage = Stage::new(index as u32 + 1, start, end, seed.target, seed.rate)
                .with_raised(seed.raised)
                .with_listing_price(seed.listing_price.unwrap_or(seed.rate));
            stages.push(stage);
            start = end;
        }
        Ok(stages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::OverPurchasePolicy;

    const SAMPLE: &str = r#"
total_supply = 1000000.0
reference_currency = "usd"

[sync]
grace_period = "3days"

[allocation]
over_purchase = "truncate"

[[currencies]]
symbol = "SOL"
rate = 150.0

[schedule]
start_time = 1000

[[schedule.stages]]
target = 100.0
rate = 0.1
duration = "1h"
listing_price = 0.5

[[schedule.stages]]
target = 200.0
rate = 0.2
duration = "2h"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = PresaleConfig::from_toml_str(SAMPLE).unwrap();

        assert_eq!(config.total_supply, 1_000_000.0);
        assert_eq!(config.database_path, PathBuf::from("presale.db"));
        assert_eq!(config.sync_policy().grace_period_secs, 3 * 24 * 3600);
        assert_eq!(config.sync_policy().completion_nudge_secs, 1);
        assert_eq!(config.allocation.over_purchase, OverPurchasePolicy::Truncate);
        assert_eq!(config.allocation.token_precision, 8);

        let converter = config.currency_converter().unwrap();
        assert_eq!(converter.to_reference(1.0, "SOL").unwrap(), 150.0);
    }

    #[test]
    fn test_schedule_expands_to_contiguous_stages() {
        let config = PresaleConfig::from_toml_str(SAMPLE).unwrap();
        let stages = config.seed_stages().unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!((stages[0].start_time, stages[0].end_time), (1000, 4600));
        assert_eq!((stages[1].start_time, stages[1].end_time), (4600, 11800));
        assert_eq!(stages[0].listing_price, 0.5);
        assert_eq!(stages[1].listing_price, 0.2);
        assert_eq!(stages[1].stage_number, 2);
    }

    #[test]
    fn test_defaults_apply() {
        let config = PresaleConfig::from_toml_str("total_supply = 10.0").unwrap();
        assert_eq!(config.reference_currency, "USD");
        assert_eq!(config.sync_policy(), SyncPolicy::default());
        assert_eq!(config.allocation_policy(), AllocationPolicy::default());
        assert!(config.seed_stages().is_err());
    }

    #[test]
    fn test_validation_failures() {
        assert!(PresaleConfig::from_toml_str("total_supply = 0.0").is_err());
        assert!(PresaleConfig::from_toml_str("total_supply = 1.0\n[sync]\ngrace_period = \"0s\"").is_err());
        assert!(PresaleConfig::from_toml_str(
            "total_supply = 1.0\n[[currencies]]\nsymbol = \"SOL\"\nrate = -1.0"
        )
        .is_err());
        assert!(PresaleConfig::from_toml_str(
            "total_supply = 1.0\n[schedule]\nstart_time = 0\n[[schedule.stages]]\ntarget = 10.0\nrate = 0.0\nduration = \"1h\""
        )
        .is_err());
        assert!(PresaleConfig::from_toml_str("not toml at all = = =").is_err());
    }

    #[test]
    fn test_sync_durations_are_bounded() {
        let err = PresaleConfig::from_toml_str(
            "total_supply = 1.0\n[sync]\ngrace_period = \"1000years\"",
        )
        .unwrap_err();
        assert!(err.to_string().contains("sync.grace_period must be at most"));

        assert!(PresaleConfig::from_toml_str(
            "total_supply = 1.0\n[sync]\ngrace_period = \"1day\"\ncompletion_nudge = \"2days\""
        )
        .is_err());

        let config = PresaleConfig::from_toml_str(
            "total_supply = 1.0\n[sync]\ngrace_period = \"365days\"\ncompletion_nudge = \"1h\"",
        )
        .unwrap();
        assert_eq!(config.sync_policy().grace_period_secs, 365 * 24 * 3600);
    }

    #[test]
    fn test_schedule_past_time_range_is_rejected() {
        let mut config = PresaleConfig::from_toml_str("total_supply = 1.0").unwrap();
        config.schedule = Some(ScheduleConfig {
            start_time: i64::MAX - 10,
            stages: vec![StageSeed {
                target: 10.0,
                rate: 0.1,
                duration: Duration::from_secs(3600),
                listing_price: None,
                raised: 0.0,
            }],
        });
        assert!(config.validate().is_err());
        assert!(matches!(config.seed_stages(), Err(PresaleError::Config(_))));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("presale.toml");
        tokio::fs::write(&path, SAMPLE).await.unwrap();

        let config = PresaleConfig::load(&path).await.unwrap();
        assert_eq!(config.seed_stages().unwrap().len(), 2);

        let missing = PresaleConfig::load(dir.path().join("missing.toml")).await;
        assert!(matches!(missing, Err(PresaleError::Config(_))));
    }
}
