use std::path::PathBuf;
use thiserror::Error;

use crate::models::MonthKey;

/// All errors produced by the registry evolution pipeline.
#[derive(Error, Debug)]
pub enum EvolutionError {
    /// A file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A JSON document could not be parsed.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// No dump exists for the requested month. Expected and common.
    #[error("No snapshot for {month} at {path}")]
    MonthNotFound { month: MonthKey, path: PathBuf },

    /// A dump exists but one of its relations cannot be reconstructed.
    #[error("Malformed snapshot for {month}: {reason}")]
    SnapshotMalformed { month: MonthKey, reason: String },

    /// A month key string did not match `YYYY_MM`.
    #[error("Invalid month key: {0}")]
    InvalidMonthKey(String),

    /// A city identifier string did not match `City-CC`.
    #[error("Invalid city identifier: {0}")]
    InvalidCityId(String),

    /// A month was applied to a history after a later month.
    #[error("Month {got} applied after {last}")]
    OutOfOrderMonth { last: MonthKey, got: MonthKey },

    /// The hypergiant registry is unusable.
    #[error("Hypergiant registry error: {0}")]
    Registry(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EvolutionError {
    /// `true` for the expected "no dump this month" case.
    pub fn is_month_not_found(&self) -> bool {
        matches!(self, EvolutionError::MonthNotFound { .. })
    }
}

/// Convenience alias used throughout the evolution crates.
pub type Result<T> = std::result::Result<T, EvolutionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_file_read() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = EvolutionError::FileRead {
            path: PathBuf::from("/dumps/registry.json"),
            source: io_err,
        };
        let msg = err.to_string();
        assert!(msg.contains("Failed to read file"));
        assert!(msg.contains("/dumps/registry.json"));
        assert!(msg.contains("denied"));
    }

    #[test]
    fn test_error_display_month_not_found() {
        let err = EvolutionError::MonthNotFound {
            month: MonthKey::new(2023, 2).unwrap(),
            path: PathBuf::from("/dumps/x_2023_02_01.json"),
        };
        assert_eq!(
            err.to_string(),
            "No snapshot for 2023_02 at /dumps/x_2023_02_01.json"
        );
        assert!(err.is_month_not_found());
    }

    #[test]
    fn test_error_display_snapshot_malformed() {
        let err = EvolutionError::SnapshotMalformed {
            month: MonthKey::new(2021, 11).unwrap(),
            reason: "missing relation `fac`".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Malformed snapshot for 2021_11: missing relation `fac`"
        );
        assert!(!err.is_month_not_found());
    }

    #[test]
    fn test_error_display_out_of_order() {
        let err = EvolutionError::OutOfOrderMonth {
            last: MonthKey::new(2023, 5).unwrap(),
            got: MonthKey::new(2023, 4).unwrap(),
        };
        assert_eq!(err.to_string(), "Month 2023_04 applied after 2023_05");
    }

    #[test]
    fn test_error_display_config() {
        let err = EvolutionError::Config("start year after end year".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: start year after end year"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EvolutionError = io_err.into();
        assert!(err.to_string().contains("gone"));
    }

    #[test]
    fn test_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        let err: EvolutionError = json_err.into();
        assert!(err.to_string().contains("Failed to parse JSON"));
    }
}
