use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::json;
use std::fmt::Write as _;
use std::path::Path;
use tempfile::TempDir;

use sleepsync::export::csv::export_merged_series;
use sleepsync::plot::{load_stage_recording, StageHistogram};
use sleepsync::{
    read_night_result, write_night_result, AppConfig, HrResampler, ImportManager, MasterIndex,
    MissingDataReport, NightMerger, OutlierBounds, ResultFormat, Side, SleepDetector,
    SleepSyncError,
};

/// End-to-end tests over a data directory laid out like a study export

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    fn night_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 22, 0, 0).unwrap()
    }

    fn metric(ts: DateTime<Utc>, hr: f64) -> serde_json::Value {
        json!({
            "ts": ts.to_rfc3339(),
            "left_hr": hr,
            "left_presence": 1,
            "left_sleep": 1,
            "left_stage": "light",
            "right_hr": null,
            "right_presence": 0,
            "right_sleep": 0,
            "right_stage": null,
        })
    }

    /// Two five-minute samples open the window, then thirty-second samples
    /// keep the end counter idle until the last one, seven hours later.
    fn write_long_night(dir: &Path, user_id: &str) {
        let start = night_start();
        let mut metrics = vec![metric(start, 60.0), metric(start + Duration::minutes(5), 59.0)];
        for i in 1..=840 {
            metrics.push(metric(
                start + Duration::minutes(5) + Duration::seconds(30 * i),
                58.0,
            ));
        }
        let night = json!({ "user_id": user_id, "side": "both", "metrics": metrics });
        std::fs::write(
            dir.join(format!("pod_{}_night1.json", user_id)),
            serde_json::to_string(&night).unwrap(),
        )
        .unwrap();
    }

    /// Regular five-minute cadence for an hour: the window closes after ten minutes
    fn write_short_night(dir: &Path, user_id: &str) {
        let start = night_start() + Duration::days(1);
        let metrics: Vec<_> = (0..13)
            .map(|i| metric(start + Duration::minutes(5 * i), 61.0))
            .collect();
        let night = json!({ "user_id": user_id, "side": "left", "metrics": metrics });
        std::fs::write(
            dir.join(format!("pod_{}_night2.json", user_id)),
            serde_json::to_string(&night).unwrap(),
        )
        .unwrap();
    }

    /// One interval per second (60 bpm) over `[from, to)`, skipping `gap`
    fn write_patch(
        dir: &Path,
        key: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        gap: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) {
        let mut csv = String::from("datetime,rr\n");
        let mut ts = from;
        while ts < to {
            let in_gap = gap.map(|(a, b)| ts >= a && ts < b).unwrap_or(false);
            if !in_gap {
                writeln!(csv, "{},1.0", ts.format("%Y-%m-%d %H:%M:%S")).unwrap();
            }
            ts += Duration::seconds(1);
        }
        std::fs::write(dir.join(format!("{}_raw_results.csv", key)), csv).unwrap();
    }

    fn write_master(dir: &Path, pairs: &[(&str, &str)]) {
        let mut csv = String::from("Vital Patch ID,User ID\n");
        for (patch, user) in pairs {
            writeln!(csv, "{},{}", patch, user).unwrap();
        }
        std::fs::write(dir.join("Master_ids.csv"), csv).unwrap();
    }

    fn study_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        write_long_night(dir.path(), "U1");
        write_short_night(dir.path(), "U1");
        write_patch(
            dir.path(),
            "A01_U1",
            night_start(),
            night_start() + Duration::minutes(7 * 60 + 10),
            None,
        );
        write_master(dir.path(), &[("A01_U1", "U1")]);
        dir
    }

    #[test]
    fn test_dataset_layout() {
        let dir = study_dir();
        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();

        assert_eq!(dataset.pods.len(), 1);
        assert_eq!(dataset.pod_nights(), 2);
        assert_eq!(dataset.patches.len(), 1);
        assert!(dataset.patches.contains_key("A01_U1"));
    }

    #[test]
    fn test_merge_keeps_only_plausible_night() {
        let dir = study_dir();
        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();
        let master = MasterIndex::load(&dir.path().join("Master_ids.csv")).unwrap();

        let merger = NightMerger::new(SleepDetector::new(), HrResampler::new());
        let summary = merger.merge_all(&dataset, &master);

        assert!(summary.failures.is_empty());
        assert_eq!(summary.nights.len(), 1);

        let night = &summary.nights[0];
        assert_eq!(night.patch_id, "A01_U1");
        assert_eq!(night.user_id, "U1");
        assert_eq!(night.side, Side::Left);
        assert_eq!(night.sleep_start, night_start() + Duration::minutes(5));
        assert_eq!(night.sleep_end, night_start() + Duration::minutes(7 * 60 + 5));
        assert_eq!(night.total_duration_minutes, 420);

        // every kept sample lies inside the window and found its patch bucket
        assert_eq!(night.merged.len(), 841);
        assert!(night
            .merged
            .iter()
            .all(|r| r.ts >= night.sleep_start && r.ts <= night.sleep_end));
        assert!(night.merged.iter().all(|r| r.hr == Some(60.0)));
        assert!(night.merged[0].sleep_start);
        assert!(night.merged.iter().all(|r| !r.sleep_end));
    }

    #[test]
    fn test_sleepless_night_keeps_earlier_nights() {
        let dir = study_dir();
        let start = night_start() + Duration::days(2);
        let metrics: Vec<_> = (0..96)
            .map(|i| {
                let mut row = metric(start + Duration::minutes(5 * i), 64.0);
                row["left_sleep"] = json!(0);
                row
            })
            .collect();
        let night = json!({ "user_id": "U1", "side": "left", "metrics": metrics });
        std::fs::write(
            dir.path().join("pod_U1_night3.json"),
            serde_json::to_string(&night).unwrap(),
        )
        .unwrap();

        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();
        let master = MasterIndex::load(&dir.path().join("Master_ids.csv")).unwrap();
        let summary = NightMerger::new(SleepDetector::new(), HrResampler::new())
            .merge_all(&dataset, &master);

        assert_eq!(summary.nights.len(), 1);
        assert_eq!(summary.nights[0].total_duration_minutes, 420);
        assert_eq!(summary.failures.len(), 1);
        assert!(matches!(summary.failures[0].1, SleepSyncError::Detection(_)));
    }

    #[test]
    fn test_unmapped_patch_is_reported_not_fatal() {
        let dir = study_dir();
        write_patch(
            dir.path(),
            "A02_U9",
            night_start(),
            night_start() + Duration::minutes(30),
            None,
        );

        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();
        let master = MasterIndex::load(&dir.path().join("Master_ids.csv")).unwrap();
        let summary = NightMerger::new(SleepDetector::new(), HrResampler::new())
            .merge_all(&dataset, &master);

        assert_eq!(summary.nights.len(), 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].0, "A02_U9");
        assert!(matches!(summary.failures[0].1, SleepSyncError::Load(_)));
    }

    #[test]
    fn test_results_survive_both_encodings() {
        let dir = study_dir();
        let out = TempDir::new().unwrap();
        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();
        let master = MasterIndex::load(&dir.path().join("Master_ids.csv")).unwrap();
        let outcome = NightMerger::new(SleepDetector::new(), HrResampler::new())
            .merge_patch("A01_U1", &dataset, &master);
        assert!(outcome.error.is_none());
        let night = &outcome.nights[0];

        for format in [ResultFormat::Json, ResultFormat::Bincode] {
            let path = write_night_result(night, out.path(), format).unwrap();
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            assert_eq!(
                name,
                format!("A01_U1_U1_2023-03-01_22-05-00.{}", format.extension())
            );
            let loaded = read_night_result(&path).unwrap();
            assert_eq!(&loaded, night);

            // stages of the source night are recoverable from the result alone
            let stages = load_stage_recording(&path).unwrap();
            assert_eq!(stages.metrics.len(), 842);
            assert_eq!(
                StageHistogram::from_recording(&stages, 5).stages.keys().map(String::as_str).collect::<Vec<_>>(),
                vec!["light"]
            );
        }

        let csv_path = out.path().join("night.csv");
        export_merged_series(&night.merged, &csv_path).unwrap();
        let content = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(content.lines().count(), night.merged.len() + 1);
    }

    #[test]
    fn test_missing_data_report_over_gap() {
        let dir = TempDir::new().unwrap();
        let start = night_start();
        // 30 silent minutes inside two hours: 6 of 24 buckets drop to zero
        write_patch(
            dir.path(),
            "A01_U1",
            start,
            start + Duration::hours(2),
            Some((start + Duration::hours(1), start + Duration::minutes(90))),
        );
        write_patch(dir.path(), "A02_U2", start, start + Duration::hours(2), None);

        let dataset = ImportManager::new().load_dataset(dir.path()).unwrap();
        let report =
            MissingDataReport::build(&dataset, &HrResampler::new(), &OutlierBounds::default())
                .unwrap();

        assert_eq!(report.entries.len(), 2);
        let gapped = &report.entries[0];
        assert_eq!(gapped.subject_id, "U1");
        assert_eq!(gapped.total_buckets, 24);
        assert_eq!(gapped.missing_buckets, 6);
        assert!((gapped.missing_pct - 25.0).abs() < 1e-9);

        assert_eq!(report.highest.as_ref().unwrap().subject_id, "U1");
        assert_eq!(report.lowest.as_ref().unwrap().subject_id, "U2");
        assert!((report.average_pct().unwrap() - 12.5).abs() < 1e-9);
    }

    #[test]
    fn test_config_drives_pipeline() {
        let dir = study_dir();
        let mut config = AppConfig::default();
        config.paths.data_dir = dir.path().to_path_buf();
        // a six-hour ceiling rejects the seven-hour night
        config.detection.max_window_minutes = 6 * 60;

        let master = MasterIndex::load(&config.resolve_master_file().unwrap()).unwrap();
        let dataset = ImportManager::new().load_dataset(&config.paths.data_dir).unwrap();
        let merger = NightMerger::new(config.detector(), config.resampler().unwrap());

        let outcome = merger.merge_patch("A01_U1", &dataset, &master);
        assert!(outcome.error.is_none());
        assert!(outcome.nights.is_empty());
    }
}
