use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::error::{LoadError, Result};
use crate::import::{has_extension, serde_helpers, RecordingReader};
use crate::models::{PodMetricsRow, PodRecording, Side};

/// Pod export as written by the recorder, loosely typed
#[derive(Deserialize)]
struct PodDump {
    user_id: String,
    side: Side,
    #[serde(default)]
    metrics: Vec<MetricsDump>,
}

#[derive(Deserialize)]
struct MetricsDump {
    #[serde(deserialize_with = "serde_helpers::timestamp")]
    ts: DateTime<Utc>,

    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    left_hr: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    left_presence: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    left_sleep: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_label")]
    left_stage: Option<String>,

    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    right_hr: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    right_presence: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    right_sleep: Option<f64>,
    #[serde(default, deserialize_with = "serde_helpers::lenient_label")]
    right_stage: Option<String>,
}

impl From<MetricsDump> for PodMetricsRow {
    fn from(raw: MetricsDump) -> Self {
        PodMetricsRow {
            ts: raw.ts,
            left_hr: raw.left_hr,
            left_presence: raw.left_presence,
            left_sleep: raw.left_sleep,
            left_stage: raw.left_stage,
            right_hr: raw.right_hr,
            right_presence: raw.right_presence,
            right_sleep: raw.right_sleep,
            right_stage: raw.right_stage,
        }
    }
}

/// Reader for pod nights exported as JSON
///
/// ```json
/// { "user_id": "U07", "side": "left",
///   "metrics": [ { "ts": "2023-03-01 22:00:00", "left_hr": 61, "left_presence": 1,
///                  "left_sleep": 1, "left_stage": "light" } ] }
/// ```
pub struct JsonPodReader;

impl JsonPodReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for JsonPodReader {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingReader for JsonPodReader {
    type Output = PodRecording;

    fn can_read(&self, file_path: &Path) -> bool {
        has_extension(file_path, "json")
    }

    fn read_file(&self, file_path: &Path) -> Result<PodRecording> {
        let reader = BufReader::new(File::open(file_path)?);
        let dump: PodDump = serde_json::from_reader(reader).map_err(|e| LoadError::Parse {
            path: file_path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut metrics: Vec<PodMetricsRow> = dump.metrics.into_iter().map(Into::into).collect();
        metrics.sort_by_key(|row| row.ts);

        Ok(PodRecording {
            user_id: dump.user_id,
            side: dump.side,
            metrics,
        })
    }

    fn format_name(&self) -> &'static str {
        "Pod JSON"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_read_pod_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("night_01.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"{{
                "user_id": "U07",
                "side": "both",
                "metrics": [
                    {{"ts": "2023-03-01 22:05:00", "left_hr": "62", "left_presence": 1, "left_sleep": 0}},
                    {{"ts": "2023-03-01 22:00:00", "left_hr": null, "left_presence": 1, "left_sleep": 0,
                      "left_stage": 1, "right_hr": 70}}
                ]
            }}"#
        )
        .unwrap();

        let reader = JsonPodReader::new();
        assert!(reader.can_read(&path));

        let recording = reader.read_file(&path).unwrap();
        assert_eq!(recording.user_id, "U07");
        assert_eq!(recording.side, Side::Both);
        assert_eq!(recording.metrics.len(), 2);
        // Sorted by time on load
        assert!(recording.metrics[0].ts < recording.metrics[1].ts);
        assert_eq!(recording.metrics[0].left_hr, None);
        assert_eq!(recording.metrics[0].left_stage.as_deref(), Some("1"));
        assert_eq!(recording.metrics[1].left_hr, Some(62.0));
    }

    #[test]
    fn test_malformed_pod_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = JsonPodReader::new().read_file(&path).unwrap_err();
        assert!(err.to_string().contains("Parse error"));
    }
}
