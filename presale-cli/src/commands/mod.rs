//! Command implementations for the presale CLI
//!
//! Each module keeps pure `build_*` functions (engine result → display value)
//! separate from the async handlers that touch config, database and output.

pub mod init;
pub mod purchase;
pub mod status;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::DateTime;
use lib_presale::{PresaleConfig, SqliteStageStore, Stage, StageStore};
use serde_json::{json, Value};
use tracing::debug;

use crate::argument_parsing::PresaleCli;
use crate::error::{CliError, CliResult};

/// Loaded configuration plus an open stage store
#[derive(Debug, Clone)]
pub struct PresaleContext {
    pub config: PresaleConfig,
    pub database: PathBuf,
    pub store: Arc<SqliteStageStore>,
}

impl PresaleContext {
    pub fn new(config: PresaleConfig, database: PathBuf, store: Arc<SqliteStageStore>) -> Self {
        Self {
            config,
            database,
            store,
        }
    }

    /// Load the config named on the command line and open its database
    pub async fn load(cli: &PresaleCli) -> CliResult<Self> {
        let config = PresaleConfig::load(&cli.config)
            .await
            .map_err(|e| CliError::ConfigLoadFailed {
                path: cli.config.display().to_string(),
                reason: e.to_string(),
            })?;
        let database = cli
            .database
            .clone()
            .unwrap_or_else(|| config.database_path.clone());

        debug!("Using database {}", database.display());
        let store = SqliteStageStore::open(&database).await?;
        Ok(Self::new(config, database, Arc::new(store)))
    }

    /// Fail with a pointer to `init` when the database holds no stages
    pub async fn ensure_initialized(&self) -> CliResult<()> {
        if self.store.stage_count().await? == 0 {
            return Err(CliError::NotInitialized {
                path: self.database.display().to_string(),
            });
        }
        Ok(())
    }
}

/// RFC 3339 rendering of a unix timestamp, falling back to the raw number
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Display value for one stage
pub fn build_stage_row(stage: &Stage) -> Value {
    json!({
        "stage": stage.stage_number,
        "start": format_timestamp(stage.start_time),
        "end": format_timestamp(stage.end_time),
        "raised": stage.raised,
        "target": stage.target,
        "rate": stage.rate,
        "listing_price": stage.listing_price,
        "filled": stage.is_filled(),
    })
}

/// One-line human summary of a stage
pub fn describe_stage(stage: &Stage) -> String {
    format!(
        "Stage {:>2}  {} → {}  raised {}/{}  rate {}{}",
        stage.stage_number,
        format_timestamp(stage.start_time),
        format_timestamp(stage.end_time),
        stage.raised,
        stage.target,
        stage.rate,
        if stage.is_filled() { "  [filled]" } else { "" }
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub const CONFIG: &str = r#"
total_supply = 10000.0

[[currencies]]
symbol = "SOL"
rate = 100.0

[schedule]
start_time = 0

[[schedule.stages]]
target = 100.0
rate = 0.1
duration = "10days"
raised = 90.0

[[schedule.stages]]
target = 100.0
rate = 0.2
duration = "10days"
"#;

    pub const DAY: i64 = 24 * 60 * 60;

    /// Context over an empty in-memory database
    pub async fn context() -> PresaleContext {
        let config = PresaleConfig::from_toml_str(CONFIG).unwrap();
        let store = SqliteStageStore::open_in_memory().await.unwrap();
        PresaleContext::new(config, PathBuf::from(":memory:"), Arc::new(store))
    }

    /// Context whose database is already seeded from [`CONFIG`]
    pub async fn seeded_context() -> PresaleContext {
        let context = context().await;
        let stages = context.config.seed_stages().unwrap();
        context.store.seed_stages(&stages, false).await.unwrap();
        context
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_stage_row() {
        let stage = Stage::new(2, 0, DAY, 100.0, 0.2).with_raised(100.0);
        let row = build_stage_row(&stage);

        assert_eq!(row["stage"], 2);
        assert_eq!(row["filled"], true);
        assert_eq!(row["end"], "1970-01-02T00:00:00+00:00");
        assert!(describe_stage(&stage).contains("[filled]"));
    }

    #[tokio::test]
    async fn test_uninitialized_database_is_reported() {
        let context = context().await;
        assert!(matches!(
            context.ensure_initialized().await,
            Err(CliError::NotInitialized { .. })
        ));

        let context = seeded_context().await;
        assert!(context.ensure_initialized().await.is_ok());
    }
}
