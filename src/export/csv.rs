use serde::Serialize;
use std::path::Path;

use crate::error::ExportError;
use crate::models::MergedRow;

#[derive(Serialize)]
struct MergedCsvRow {
    ts: String,
    heart_rate: f64,
    presence: f64,
    sleep: f64,
    sleep_start: u8,
    sleep_end: u8,
    timedelta: Option<i64>,
    hr: Option<f64>,
}

/// Export a merged night as CSV (missing values left empty)
pub fn export_merged_series<P: AsRef<Path>>(
    rows: &[MergedRow],
    output_path: P,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_path(output_path)?;

    for row in rows {
        writer.serialize(MergedCsvRow {
            ts: row.ts.format("%Y-%m-%d %H:%M:%S").to_string(),
            heart_rate: row.heart_rate,
            presence: row.presence,
            sleep: row.sleep,
            sleep_start: u8::from(row.sleep_start),
            sleep_end: u8::from(row.sleep_end),
            timedelta: row.elapsed_minutes,
            hr: row.hr,
        })?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    #[test]
    fn test_export_merged_series() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 23, 0, 0).unwrap();
        let rows = vec![
            MergedRow {
                ts: start,
                heart_rate: 58.0,
                presence: 1.0,
                sleep: 1.0,
                sleep_start: true,
                sleep_end: false,
                elapsed_minutes: None,
                hr: Some(59.4),
            },
            MergedRow {
                ts: start + Duration::minutes(5),
                heart_rate: 57.0,
                presence: 1.0,
                sleep: 1.0,
                sleep_start: false,
                sleep_end: true,
                elapsed_minutes: Some(5),
                hr: None,
            },
        ];

        let dir = tempdir().unwrap();
        let path = dir.path().join("night.csv");
        export_merged_series(&rows, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "ts,heart_rate,presence,sleep,sleep_start,sleep_end,timedelta,hr"
        );
        assert_eq!(lines[1], "2023-03-01 23:00:00,58.0,1.0,1.0,1,0,,59.4");
        assert_eq!(lines[2], "2023-03-01 23:05:00,57.0,1.0,1.0,0,1,5,");
    }
}
