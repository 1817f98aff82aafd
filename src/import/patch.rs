use csv::ReaderBuilder;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::import::{has_extension, parse_timestamp, patch_key_from_path, RecordingReader};
use crate::models::{PatchRecording, RrSample};

/// CSV reader for vital patch inter-beat intervals with flexible column names
pub struct CsvPatchReader {
    column_mapping: HashMap<String, String>,
}

impl CsvPatchReader {
    pub fn new() -> Self {
        let mut column_mapping = HashMap::new();

        Self::add_mapping(
            &mut column_mapping,
            "ts",
            &["ts", "datetime", "timestamp", "time", "date_time"],
        );
        Self::add_mapping(
            &mut column_mapping,
            "rr",
            &["rr", "rr_interval", "rr_intervals", "ibi", "interval"],
        );

        Self { column_mapping }
    }

    fn add_mapping(mapping: &mut HashMap<String, String>, standard: &str, variations: &[&str]) {
        for variation in variations {
            mapping.insert(variation.to_lowercase(), standard.to_string());
        }
    }

    fn normalize_column_name(&self, name: &str) -> String {
        let normalized = name.trim().to_lowercase().replace([' ', '-'], "_");

        self.column_mapping
            .get(&normalized)
            .cloned()
            .unwrap_or(normalized)
    }

    fn column_index(&self, headers: &csv::StringRecord, wanted: &str, path: &Path) -> Result<usize> {
        headers
            .iter()
            .position(|h| self.normalize_column_name(h) == wanted)
            .ok_or_else(|| {
                LoadError::MissingColumn {
                    path: path.to_path_buf(),
                    column: wanted.to_string(),
                }
                .into()
            })
    }
}

impl Default for CsvPatchReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingReader for CsvPatchReader {
    type Output = PatchRecording;

    fn can_read(&self, file_path: &Path) -> bool {
        has_extension(file_path, "csv")
    }

    fn read_file(&self, file_path: &Path) -> Result<PatchRecording> {
        let parse_err = |reason: String| LoadError::Parse {
            path: file_path.to_path_buf(),
            reason,
        };

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(file_path)
            .map_err(|e| parse_err(e.to_string()))?;

        let headers = reader.headers().map_err(|e| parse_err(e.to_string()))?.clone();
        let ts_idx = self.column_index(&headers, "ts", file_path)?;
        let rr_idx = self.column_index(&headers, "rr", file_path)?;

        let mut rr_intervals = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| parse_err(e.to_string()))?;

            let ts_raw = record.get(ts_idx).unwrap_or("").trim();
            if ts_raw.is_empty() {
                continue;
            }
            let ts = parse_timestamp(ts_raw)?;

            let rr = match record.get(rr_idx).map(str::trim) {
                None | Some("") => None,
                Some(v) if v.eq_ignore_ascii_case("nan") => None,
                Some(v) => Some(
                    v.parse::<f64>()
                        .map_err(|e| parse_err(format!("row {}: rr '{}': {}", line + 1, v, e)))?,
                ),
            };

            rr_intervals.push(RrSample { ts, rr });
        }

        rr_intervals.sort_by_key(|s| s.ts);

        Ok(PatchRecording {
            patch_id: patch_key_from_path(file_path),
            rr_intervals,
        })
    }

    fn format_name(&self) -> &'static str {
        "Patch CSV"
    }
}

#[derive(Deserialize)]
struct PatchDump {
    vp_rr_intervals: Vec<RrSample>,
}

/// JSON reader for patch dumps shaped as `{ "vp_rr_intervals": [ {"datetime", "rr"} ] }`
pub struct JsonPatchReader;

impl JsonPatchReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonPatchReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingReader for JsonPatchReader {
    type Output = PatchRecording;

    fn can_read(&self, file_path: &Path) -> bool {
        has_extension(file_path, "json")
    }

    fn read_file(&self, file_path: &Path) -> Result<PatchRecording> {
        let reader = BufReader::new(File::open(file_path)?);
        let dump: PatchDump = serde_json::from_reader(reader).map_err(|e| LoadError::Parse {
            path: file_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut rr_intervals = dump.vp_rr_intervals;
        rr_intervals.sort_by_key(|s| s.ts);

        Ok(PatchRecording {
            patch_id: patch_key_from_path(file_path),
            rr_intervals,
        })
    }

    fn format_name(&self) -> &'static str {
        "Patch JSON"
    }
}
