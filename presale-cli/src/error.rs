//! Structured error types for the presale CLI

use lib_presale::PresaleError;
use thiserror::Error;

/// Presale CLI error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Presale error: {0}")]
    Presale(#[from] PresaleError),

    #[error("Database {path} is not initialized; run `presale-cli init` first")]
    NotInitialized { path: String },

    #[error("Database {path} already holds {stages} stage(s); pass --force to replace them")]
    AlreadyInitialized { path: String, stages: usize },

    #[error("Failed to load config from {path}: {reason}")]
    ConfigLoadFailed { path: String, reason: String },

    #[error("Output format error: {0}")]
    FormatError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presale_error_is_wrapped() {
        let err: CliError = PresaleError::CapacityExceeded {
            requested: 50.0,
            available: 10.0,
        }
        .into();
        assert!(matches!(err, CliError::Presale(_)));
        assert!(err.to_string().contains("50"));
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_initialization_errors() {
        let err = CliError::AlreadyInitialized {
            path: "presale.db".to_string(),
            stages: 3,
        };
        assert_eq!(
            err.to_string(),
            "Database presale.db already holds 3 stage(s); pass --force to replace them"
        );

        let err = CliError::NotInitialized {
            path: "presale.db".to_string(),
        };
        assert!(err.to_string().contains("presale-cli init"));
    }

    #[test]
    fn test_config_and_format_errors() {
        let err = CliError::ConfigLoadFailed {
            path: "sale.toml".to_string(),
            reason: "total_supply must be positive, got 0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to load config from sale.toml: total_supply must be positive, got 0"
        );

        let err = CliError::FormatError("unsupported output format 'yaml'".to_string());
        assert!(err.to_string().starts_with("Output format error:"));
    }
}
