//! SQLite stage store
//!
//! Persistent storage for presale stages.
//!
//! # Features
//!
//! - WAL mode enabled for better concurrent performance
//! - Automatic schema migration on open
//! - Async operations via sqlx
//! - Change sets committed inside a single transaction, guarded by a
//!   per-row `version` column

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::StageStore;
use crate::errors::{PresaleError, PresaleResult};
use crate::types::{validate_stage_sequence, Stage, StageChange, StageUpdate};

// ============================================================================
// Row Definitions
// ============================================================================

/// Stage row as stored in SQLite
#[derive(Debug, Clone, FromRow)]
struct StageRow {
    stage_number: i64,
    start_time: i64,
    end_time: i64,
    target: f64,
    raised: f64,
    rate: f64,
    listing_price: f64,
    version: i64,
}

impl From<StageRow> for Stage {
    fn from(row: StageRow) -> Self {
        Stage {
            stage_number: row.stage_number as u32,
            start_time: row.start_time,
            end_time: row.end_time,
            target: row.target,
            raised: row.raised,
            rate: row.rate,
            listing_price: row.listing_price,
            version: row.version as u64,
        }
    }
}

fn storage_error(context: &str, err: sqlx::Error) -> PresaleError {
    PresaleError::Storage(format!("{}: {}", context, err))
}

// ============================================================================
// SqliteStageStore Implementation
// ============================================================================

/// SQLite-backed stage store
#[derive(Debug, Clone)]
pub struct SqliteStageStore {
    pool: SqlitePool,
}

impl SqliteStageStore {
    /// Open or create a SQLite database at the given path
    ///
    /// Creates the database if it doesn't exist, enables WAL mode and runs
    /// the schema migration.
    pub async fn open(path: impl AsRef<Path>) -> PresaleResult<Self> {
        let path = path.as_ref();
        let url = format!("sqlite:{}?mode=rwc", path.display());

        info!("Opening SQLite stage store at: {}", path.display());

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| storage_error("Invalid database path", e))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to connect to SQLite", e))?;

        Self::run_migrations(&pool).await?;

        info!("SQLite stage store initialized");
        Ok(Self { pool })
    }

    /// Open an in-memory SQLite database (for testing)
    pub async fn open_in_memory() -> PresaleResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| storage_error("Invalid in-memory options", e))?
            .journal_mode(SqliteJournalMode::Wal)
            .create_if_missing(true);

        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| storage_error("Failed to create in-memory SQLite", e))?;

        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> PresaleResult<()> {
        debug!("Running stage store migrations...");

        const MIGRATION_V1: &str = r#"
CREATE TABLE IF NOT EXISTS presale_stages (
    stage_number INTEGER PRIMARY KEY CHECK (stage_number > 0),
    start_time INTEGER NOT NULL,
    end_time INTEGER NOT NULL,
    target REAL NOT NULL CHECK (target > 0),
    raised REAL NOT NULL DEFAULT 0.0 CHECK (raised >= 0),
    rate REAL NOT NULL CHECK (rate > 0),
    listing_price REAL NOT NULL,
    version INTEGER NOT NULL DEFAULT 0,
    updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);
"#;

        sqlx::raw_sql(MIGRATION_V1)
            .execute(pool)
            .await
            .map_err(|e| storage_error("Migration failed", e))?;

        debug!("Migrations completed successfully");
        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert a validated stage sequence.
    ///
    /// With `replace` set, existing stages are deleted first; otherwise
    /// seeding a non-empty store fails. Runs in one transaction.
    pub async fn seed_stages(&self, stages: &[Stage], replace: bool) -> PresaleResult<()> {
        validate_stage_sequence(stages)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        if replace {
            sqlx::query("DELETE FROM presale_stages")
                .execute(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to clear stages", e))?;
        } else {
            let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM presale_stages")
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| storage_error("Failed to count stages", e))?;
            if existing > 0 {
                return Err(PresaleError::InvalidStage(format!(
                    "store already holds {} stage(s)",
                    existing
                )));
            }
        }

        for stage in stages {
            sqlx::query(
                r#"
                INSERT INTO presale_stages
                    (stage_number, start_time, end_time, target, raised, rate, listing_price, version)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(stage.stage_number as i64)
            .bind(stage.start_time)
            .bind(stage.end_time)
            .bind(stage.target)
            .bind(stage.raised)
            .bind(stage.rate)
            .bind(stage.listing_price)
            .bind(stage.version as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to insert stage", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit seed", e))?;

        info!("Seeded {} presale stage(s)", stages.len());
        Ok(())
    }
}

#[async_trait]
impl StageStore for SqliteStageStore {
    async fn load_stages(&self) -> PresaleResult<Vec<Stage>> {
        let rows = sqlx::query_as::<_, StageRow>(
            r#"
            SELECT stage_number, start_time, end_time, target, raised, rate, listing_price, version
            FROM presale_stages
            ORDER BY stage_number ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to load stages", e))?;

        Ok(rows.into_iter().map(Stage::from).collect())
    }

    async fn update_stage(&self, stage_number: u32, update: &StageUpdate) -> PresaleResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE presale_stages SET
                raised = COALESCE(?, raised),
                start_time = COALESCE(?, start_time),
                end_time = COALESCE(?, end_time),
                version = version + 1,
                updated_at = strftime('%s', 'now')
            WHERE stage_number = ?
            "#,
        )
        .bind(update.raised)
        .bind(update.start_time)
        .bind(update.end_time)
        .bind(stage_number as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to update stage", e))?;

        if result.rows_affected() == 0 {
            return Err(PresaleError::StageNotFound(stage_number));
        }
        Ok(())
    }

    async fn increment_raised(&self, stage_number: u32, delta: f64) -> PresaleResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE presale_stages SET
                raised = raised + ?,
                version = version + 1,
                updated_at = strftime('%s', 'now')
            WHERE stage_number = ?
            "#,
        )
        .bind(delta)
        .bind(stage_number as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| storage_error("Failed to increment raised", e))?;

        if result.rows_affected() == 0 {
            return Err(PresaleError::StageNotFound(stage_number));
        }
        Ok(())
    }

    async fn commit(&self, changes: &[StageChange]) -> PresaleResult<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| storage_error("Failed to begin transaction", e))?;

        for change in changes {
            let result = sqlx::query(
                r#"
                UPDATE presale_stages SET
                    raised = COALESCE(?, raised),
                    start_time = COALESCE(?, start_time),
                    end_time = COALESCE(?, end_time),
                    version = version + 1,
                    updated_at = strftime('%s', 'now')
                WHERE stage_number = ? AND version = ?
                "#,
            )
            .bind(change.update.raised)
            .bind(change.update.start_time)
            .bind(change.update.end_time)
            .bind(change.stage_number as i64)
            .bind(change.expected_version as i64)
            .execute(&mut *tx)
            .await
            .map_err(|e| storage_error("Failed to apply stage change", e))?;

            if result.rows_affected() == 0 {
                // Dropping the transaction rolls back every earlier change.
                let exists: Option<(i64,)> =
                    sqlx::query_as("SELECT version FROM presale_stages WHERE stage_number = ?")
                        .bind(change.stage_number as i64)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| storage_error("Failed to read stage version", e))?;

                return Err(match exists {
                    Some(_) => {
                        warn!(
                            "Version conflict on stage {} (expected {})",
                            change.stage_number, change.expected_version
                        );
                        PresaleError::ConcurrentModification {
                            stage_number: change.stage_number,
                        }
                    }
                    None => PresaleError::StageNotFound(change.stage_number),
                });
            }
        }

        tx.commit()
            .await
            .map_err(|e| storage_error("Failed to commit stage changes", e))?;

        debug!("Committed {} stage change(s)", changes.len());
        Ok(())
    }

    async fn stage_count(&self) -> PresaleResult<usize> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM presale_stages")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| storage_error("Failed to count stages", e))?;
        Ok(count as usize)
    }

    fn backend_type(&self) -> &'static str {
        "sqlite"
    }
}
