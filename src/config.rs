use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::export::ResultFormat;
use crate::logging::LogConfig;
use crate::quality::OutlierBounds;
use crate::resample::{HrResampler, ResampleConfig};
use crate::sleep::{DetectionConfig, SleepDetector};

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Input and output locations
    pub paths: PathSettings,

    /// Sleep-window scan thresholds
    pub detection: DetectionConfig,

    /// Patch resampling resolutions
    pub resample: ResampleConfig,

    /// Heart-rate outlier bounds
    pub quality: OutlierBounds,

    /// Result file settings
    pub output: OutputSettings,

    /// Logging settings
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

/// Input and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory holding pod and patch recordings
    pub data_dir: PathBuf,

    /// Master CSV mapping patch keys to subjects; defaults to the first
    /// `M*.csv` in the data directory
    pub master_file: Option<PathBuf>,

    /// Directory receiving result files and charts
    pub output_dir: PathBuf,
}

/// Result file settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSettings {
    /// Encoding of per-night result files
    pub format: ResultFormat,

    /// Also write each merged night as CSV
    pub write_csv: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        let now = Utc::now();

        AppConfig {
            metadata: ConfigMetadata {
                version: "1.0".to_string(),
                created_at: now,
                updated_at: now,
            },
            paths: PathSettings::default(),
            detection: DetectionConfig::default(),
            resample: ResampleConfig::default(),
            quality: OutlierBounds::default(),
            output: OutputSettings::default(),
            logging: LogConfig::default(),
        }
    }
}

impl Default for PathSettings {
    fn default() -> Self {
        PathSettings {
            data_dir: PathBuf::from("./data"),
            master_file: None,
            output_dir: PathBuf::from("./results"),
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        OutputSettings {
            format: ResultFormat::Json,
            write_csv: false,
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Utc::now();

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sleepsync")
            .join("config.toml")
    }

    /// Load configuration with fallback to defaults.
    ///
    /// Runs before logging is set up, so a config file that exists but
    /// cannot be used is reported on stderr.
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(&Self::default_config_path())
    }

    /// Load `path`, falling back to defaults when it is absent or unusable
    pub fn load_or_default_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!(
                    "{}",
                    format!("⚠ Ignoring config file {}: {:#}", path.display(), e).yellow()
                );
                Self::default()
            }
        }
    }

    /// Reject threshold combinations the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let d = &self.detection;
        if d.start_threshold_minutes <= 0 || d.end_threshold_minutes <= 0 {
            anyhow::bail!("Detection thresholds must be positive");
        }
        if d.min_window_minutes > d.max_window_minutes {
            anyhow::bail!(
                "Minimum window ({} min) exceeds maximum window ({} min)",
                d.min_window_minutes,
                d.max_window_minutes
            );
        }
        if self.quality.lower >= self.quality.upper {
            anyhow::bail!(
                "Outlier lower bound {} must be below upper bound {}",
                self.quality.lower,
                self.quality.upper
            );
        }
        HrResampler::with_config(self.resample.clone())?;
        Ok(())
    }

    /// Detector built from the detection section
    pub fn detector(&self) -> SleepDetector {
        SleepDetector::with_config(self.detection.clone())
    }

    /// Resampler built from the resample section
    pub fn resampler(&self) -> Result<HrResampler> {
        Ok(HrResampler::with_config(self.resample.clone())?)
    }

    /// Master file: configured path, else the first `M*.csv` in the data directory
    pub fn resolve_master_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.paths.master_file {
            return Ok(path.clone());
        }

        let mut candidates: Vec<PathBuf> = fs::read_dir(&self.paths.data_dir)
            .with_context(|| {
                format!("Failed to read data directory: {}", self.paths.data_dir.display())
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
                name.starts_with('M') && crate::import::has_extension(p, "csv")
            })
            .collect();
        candidates.sort();

        candidates.into_iter().next().with_context(|| {
            format!(
                "No master file configured and no M*.csv found in {}",
                self.paths.data_dir.display()
            )
        })
    }
}
