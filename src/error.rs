//! Unified error hierarchy for sleepsync
//!
//! Each pipeline stage has its own error enum; all of them fold into
//! [`SleepSyncError`] so callers can propagate with `?` and still inspect
//! what went wrong.

use chrono::{DateTime, Utc};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for all sleepsync operations
#[derive(Debug, Error)]
pub enum SleepSyncError {
    /// Recording and master-file loading errors
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Sleep-window detection errors
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    /// Pod/patch merge errors
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Result file and table export errors
    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors raised while discovering and parsing recordings
#[derive(Debug, Error)]
pub enum LoadError {
    /// Directory does not exist or is not a directory
    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// File extension has no reader
    #[error("Unsupported format for {path}")]
    UnsupportedFormat { path: PathBuf },

    /// File could not be parsed
    #[error("Parse error in {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    /// A required column is absent from a tabular file
    #[error("Missing column '{column}' in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// Timestamp string matched none of the accepted layouts
    #[error("Unable to parse timestamp: {value}")]
    Timestamp { value: String },

    /// Patch identifier absent from the master mapping
    #[error("Vital patch '{patch_id}' not listed in master file")]
    UnknownPatch { patch_id: String },
}

/// Errors raised by the sleep-window scan
#[derive(Debug, Error)]
pub enum DetectionError {
    /// No sample satisfied the start threshold
    #[error("No sleep start found for subject {user_id}")]
    NoSleepStart { user_id: String },

    /// End flag landed on or before the start flag
    #[error("Degenerate sleep window: start {start}, end {end}")]
    DegenerateWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Errors raised while joining pod and patch series
#[derive(Debug, Error)]
pub enum MergeError {
    /// Patch key not present in the loaded dataset
    #[error("Vital patch recording not loaded: {patch_id}")]
    PatchNotLoaded { patch_id: String },

    /// Subject has no pod recordings
    #[error("No pod recordings for subject {user_id}")]
    NoPodRecordings { user_id: String },
}

/// Errors raised while writing or reading result files
#[derive(Debug, Error)]
pub enum ExportError {
    /// Unknown output format name
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// JSON encoding/decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Bincode encoding/decoding failed
    #[error("Bincode error: {0}")]
    Bincode(#[from] bincode::Error),

    /// CSV writing failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Chart rendering failed
    #[error("Render error: {0}")]
    Render(String),
}

/// Result type alias for sleepsync operations
pub type Result<T> = std::result::Result<T, SleepSyncError>;

impl SleepSyncError {
    /// Whether the error only invalidates one night rather than the whole patch
    pub fn is_night_local(&self) -> bool {
        matches!(
            self,
            SleepSyncError::Detection(DetectionError::DegenerateWindow { .. })
        )
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SleepSyncError::Detection(DetectionError::DegenerateWindow { .. }) => {
                ErrorSeverity::Info
            }
            SleepSyncError::Detection(_) => ErrorSeverity::Warning,
            SleepSyncError::Load(LoadError::UnsupportedFormat { .. }) => ErrorSeverity::Warning,
            SleepSyncError::Internal(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Error,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            SleepSyncError::Load(LoadError::NotADirectory { path }) => {
                format!("Data directory not found: {}", path.display())
            }
            SleepSyncError::Load(LoadError::UnknownPatch { patch_id }) => {
                format!(
                    "Patch {} has no subject mapping. Check the master file.",
                    patch_id
                )
            }
            SleepSyncError::Detection(DetectionError::NoSleepStart { user_id }) => {
                format!(
                    "Subject {} never stayed in bed asleep long enough to start a sleep window.",
                    user_id
                )
            }
            SleepSyncError::Merge(MergeError::NoPodRecordings { user_id }) => {
                format!("No pod nights found for subject {}", user_id)
            }
            _ => self.to_string(),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Critical system error requiring immediate attention
    Critical,
    /// Error that prevents operation but system can continue
    Error,
    /// Warning that doesn't prevent operation
    Warning,
    /// Informational message
    Info,
}

impl ErrorSeverity {
    /// Convert to tracing level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            ErrorSeverity::Critical => tracing::Level::ERROR,
            ErrorSeverity::Error => tracing::Level::ERROR,
            ErrorSeverity::Warning => tracing::Level::WARN,
            ErrorSeverity::Info => tracing::Level::INFO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_severity() {
        let err = SleepSyncError::Detection(DetectionError::NoSleepStart {
            user_id: "U1".to_string(),
        });
        assert_eq!(err.severity(), ErrorSeverity::Warning);

        let err = SleepSyncError::Internal("test".to_string());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().to_tracing_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_night_local() {
        let ts = DateTime::from_timestamp(0, 0).unwrap();
        let err = SleepSyncError::Detection(DetectionError::DegenerateWindow { start: ts, end: ts });
        assert!(err.is_night_local());

        let err = SleepSyncError::Merge(MergeError::NoPodRecordings {
            user_id: "U1".to_string(),
        });
        assert!(!err.is_night_local());
    }

    #[test]
    fn test_user_messages() {
        let err = SleepSyncError::Load(LoadError::UnknownPatch {
            patch_id: "A01_U1".to_string(),
        });
        assert!(err.user_message().contains("master file"));
    }
}
