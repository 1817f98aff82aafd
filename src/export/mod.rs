use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::ExportError;
use crate::models::NightResult;

pub mod csv;

/// Encoding of per-night result files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultFormat {
    Json,
    Bincode,
}

impl ResultFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ResultFormat::Json => "json",
            ResultFormat::Bincode => "bin",
        }
    }

    /// Format implied by a file extension
    pub fn from_path(path: &Path) -> Result<Self, ExportError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext.to_lowercase().as_str() {
            "json" => Ok(ResultFormat::Json),
            "bin" | "bincode" => Ok(ResultFormat::Bincode),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

impl std::str::FromStr for ResultFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ResultFormat::Json),
            "bincode" | "bin" => Ok(ResultFormat::Bincode),
            _ => Err(ExportError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Result file name: `{patch}_{subject}_{start}.{ext}`
pub fn result_file_name(result: &NightResult, format: ResultFormat) -> String {
    format!(
        "{}_{}_{}.{}",
        result.patch_id,
        result.user_id,
        result.sleep_start.format("%Y-%m-%d_%H-%M-%S"),
        format.extension()
    )
}

/// Write one night into `dir`, returning the path written
pub fn write_night_result(
    result: &NightResult,
    dir: &Path,
    format: ResultFormat,
) -> Result<PathBuf, ExportError> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(result_file_name(result, format));

    let mut writer = BufWriter::new(File::create(&path)?);
    match format {
        ResultFormat::Json => serde_json::to_writer_pretty(&mut writer, result)?,
        ResultFormat::Bincode => bincode::serialize_into(&mut writer, result)?,
    }
    writer.flush()?;

    info!(path = %path.display(), rows = result.merged.len(), "Night result written");
    Ok(path)
}

/// Read a night result, choosing the decoder from the extension
pub fn read_night_result(path: &Path) -> Result<NightResult, ExportError> {
    let format = ResultFormat::from_path(path)?;
    let reader = BufReader::new(File::open(path)?);

    let result = match format {
        ResultFormat::Json => serde_json::from_reader(reader)?,
        ResultFormat::Bincode => bincode::deserialize_from(reader)?,
    };
    Ok(result)
}
