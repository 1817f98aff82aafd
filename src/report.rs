//! Terminal summaries rendered as tables.

use tabled::{settings::Style, Table, Tabled};

use crate::models::{NightResult, SleepWindow};
use crate::quality::MissingDataReport;

#[derive(Tabled)]
struct NightLine {
    #[tabled(rename = "Patch")]
    patch: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Side")]
    side: String,
    #[tabled(rename = "Sleep start")]
    start: String,
    #[tabled(rename = "Sleep end")]
    end: String,
    #[tabled(rename = "Hours")]
    hours: String,
    #[tabled(rename = "Rows")]
    rows: usize,
    #[tabled(rename = "Patch coverage")]
    coverage: String,
}

/// One row per merged night
pub fn nights_table(nights: &[NightResult]) -> String {
    let lines = nights.iter().map(|n| NightLine {
        patch: n.patch_id.clone(),
        subject: n.user_id.clone(),
        side: n.side.to_string(),
        start: n.sleep_start.format("%Y-%m-%d %H:%M").to_string(),
        end: n.sleep_end.format("%Y-%m-%d %H:%M").to_string(),
        hours: format!("{:.2}", n.duration_hours()),
        rows: n.merged.len(),
        coverage: format!("{:.1}%", n.patch_coverage()),
    });
    Table::new(lines).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct WindowLine {
    #[tabled(rename = "Night")]
    night: usize,
    #[tabled(rename = "Sleep start")]
    start: String,
    #[tabled(rename = "Sleep end")]
    end: String,
    #[tabled(rename = "Hours")]
    hours: String,
    #[tabled(rename = "Accepted")]
    accepted: String,
}

/// Detected window of each night, `None` where no window could be formed
pub fn windows_table(windows: &[(Option<SleepWindow>, bool)]) -> String {
    let lines = windows.iter().enumerate().map(|(i, (window, accepted))| match window {
        Some(w) => WindowLine {
            night: i + 1,
            start: w.start.format("%Y-%m-%d %H:%M").to_string(),
            end: w.end.format("%Y-%m-%d %H:%M").to_string(),
            hours: format!("{:.2}", w.duration().num_minutes() as f64 / 60.0),
            accepted: if *accepted { "yes" } else { "no" }.to_string(),
        },
        None => WindowLine {
            night: i + 1,
            start: "-".to_string(),
            end: "-".to_string(),
            hours: "-".to_string(),
            accepted: "no".to_string(),
        },
    });
    Table::new(lines).with(Style::rounded()).to_string()
}

#[derive(Tabled)]
struct MissingLine {
    #[tabled(rename = "Patch")]
    patch: String,
    #[tabled(rename = "Subject")]
    subject: String,
    #[tabled(rename = "Buckets")]
    total: usize,
    #[tabled(rename = "Missing")]
    missing: usize,
    #[tabled(rename = "% Missing")]
    pct: String,
}

/// Per-patch missing data followed by the cross-subject summary
pub fn missing_data_table(report: &MissingDataReport) -> String {
    let lines = report.entries.iter().map(|e| MissingLine {
        patch: e.patch_id.clone(),
        subject: e.subject_id.clone(),
        total: e.total_buckets,
        missing: e.missing_buckets,
        pct: format!("{:.2}%", e.missing_pct),
    });
    let mut out = Table::new(lines).with(Style::rounded()).to_string();

    if let (Some(avg), Some(min), Some(max)) = (report.average_pct(), report.min_pct(), report.max_pct()) {
        out.push_str(&format!("\nAverage % Missing Data: {:.2}%", avg));
        out.push_str(&format!("\nMinimum % Missing Data: {:.2}%", min));
        out.push_str(&format!("\nMaximum % Missing Data: {:.2}%", max));
    }
    if let Some(lowest) = &report.lowest {
        out.push_str(&format!(
            "\nLowest missing data: {} ({:.2}%)",
            lowest.subject_id, lowest.missing_pct
        ));
    }
    if let Some(highest) = &report.highest {
        out.push_str(&format!(
            "\nHighest missing data: {} ({:.2}%)",
            highest.subject_id, highest.missing_pct
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quality::SubjectMissing;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_missing_data_table() {
        let report = MissingDataReport::from_entries(vec![
            SubjectMissing {
                patch_id: "A01_U1".to_string(),
                subject_id: "U1".to_string(),
                total_buckets: 100,
                missing_buckets: 10,
                missing_pct: 10.0,
            },
            SubjectMissing {
                patch_id: "A02_U2".to_string(),
                subject_id: "U2".to_string(),
                total_buckets: 100,
                missing_buckets: 30,
                missing_pct: 30.0,
            },
        ]);

        let table = missing_data_table(&report);
        assert!(table.contains("A01_U1"));
        assert!(table.contains("Average % Missing Data: 20.00%"));
        assert!(table.contains("Lowest missing data: U1 (10.00%)"));
        assert!(table.contains("Highest missing data: U2 (30.00%)"));
    }

    #[test]
    fn test_windows_table() {
        let start = Utc.with_ymd_and_hms(2023, 3, 1, 23, 0, 0).unwrap();
        let window = SleepWindow {
            start,
            end: start + Duration::minutes(450),
        };
        let table = windows_table(&[(Some(window), true), (None, false)]);
        assert!(table.contains("7.50"));
        assert!(table.contains("yes"));
        assert!(table.contains("2023-03-01 23:00"));
    }
}
