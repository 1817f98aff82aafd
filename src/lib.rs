// Library interface for sleepsync modules
// Integration tests and the CLI both go through these exports

pub mod config;
pub mod error;
pub mod export;
pub mod import;
pub mod logging;
pub mod merge;
pub mod models;
pub mod plot;
pub mod quality;
pub mod report;
pub mod resample;
pub mod sleep;

// Re-export commonly used types for convenience
pub use config::AppConfig;
pub use error::{Result, SleepSyncError};
pub use export::{read_night_result, write_night_result, ResultFormat};
pub use import::{Dataset, ImportManager, MasterIndex};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use merge::{MergeSummary, NightMerger, PatchMerge};
pub use models::*;
pub use quality::{remove_outliers, MissingDataReport, OutlierBounds};
pub use resample::{HrResampler, HrSeries, ResampleConfig};
pub use sleep::{DetectionConfig, PodSeries, ScanState, SleepDetector};
