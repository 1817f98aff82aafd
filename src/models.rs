use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::import::serde_helpers;

/// Bed side a pod recording was measured on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
    /// Subject slept in the middle of the bed
    Both,
}

impl Side {
    /// Side whose metric columns are read. A subject sleeping in the middle
    /// is read from the left side.
    pub fn measured(self) -> Side {
        match self {
            Side::Both => Side::Left,
            other => other,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
            Side::Both => write!(f, "both"),
        }
    }
}

/// Per-side columns of one pod metrics row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SideMetrics {
    /// Heart rate in beats per minute (populated every ~5 minutes)
    pub hr: Option<f64>,

    /// 1 when someone is on this side of the bed
    pub presence: Option<f64>,

    /// 1 when the occupant is asleep
    pub sleep: Option<f64>,

    /// Sleep stage label (awake, light, deep, rem, or a numeric code)
    pub stage: Option<String>,
}

/// One timestamped row of raw pod metrics, both sides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMetricsRow {
    pub ts: DateTime<Utc>,

    pub left_hr: Option<f64>,
    pub left_presence: Option<f64>,
    pub left_sleep: Option<f64>,
    pub left_stage: Option<String>,

    pub right_hr: Option<f64>,
    pub right_presence: Option<f64>,
    pub right_sleep: Option<f64>,
    pub right_stage: Option<String>,
}

impl PodMetricsRow {
    /// Project the columns of one side. `Side::Both` reads the left side.
    pub fn side(&self, side: Side) -> SideMetrics {
        match side.measured() {
            Side::Right => SideMetrics {
                hr: self.right_hr,
                presence: self.right_presence,
                sleep: self.right_sleep,
                stage: self.right_stage.clone(),
            },
            _ => SideMetrics {
                hr: self.left_hr,
                presence: self.left_presence,
                sleep: self.left_sleep,
                stage: self.left_stage.clone(),
            },
        }
    }
}

/// A single night recorded by the bed pod
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecording {
    /// Subject identifier
    pub user_id: String,

    /// Side the subject slept on
    pub side: Side,

    /// Raw metric rows
    pub metrics: Vec<PodMetricsRow>,
}

/// One inter-beat interval sample from the vital patch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RrSample {
    #[serde(alias = "datetime", deserialize_with = "serde_helpers::timestamp")]
    pub ts: DateTime<Utc>,

    /// Interval length; missing when the beat could not be resolved
    #[serde(default, deserialize_with = "serde_helpers::lenient_f64")]
    pub rr: Option<f64>,
}

/// A vital patch recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecording {
    /// Patch key, e.g. `A0012_U07`
    pub patch_id: String,

    /// Inter-beat interval samples
    pub rr_intervals: Vec<RrSample>,
}

/// Pod sample retained for sleep detection (on bed and asleep)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSample {
    pub ts: DateTime<Utc>,

    /// Heart rate in beats per minute
    pub heart_rate: f64,

    pub presence: f64,

    pub sleep: f64,

    /// Whole minutes since the previous retained sample
    pub elapsed_minutes: Option<i64>,

    /// Set on the sample where a sleep window opens
    pub sleep_start: bool,

    /// Set on the sample where a sleep window closes
    pub sleep_end: bool,
}

/// Five-minute heart rate bucket derived from the patch
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrBucket {
    /// Bucket start on the grid
    pub ts: DateTime<Utc>,

    /// Mean beats per minute, missing after outlier removal
    pub hr: Option<f64>,
}

/// Detected sleep interval of one night
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SleepWindow {
    /// Window length
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Inclusive containment on both ends
    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start && *ts <= self.end
    }

    /// Whether the window length lies in `[min, max]`
    pub fn is_plausible(&self, min: Duration, max: Duration) -> bool {
        let duration = self.duration();
        duration >= min && duration <= max
    }
}

/// One row of the joined pod/patch table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRow {
    pub ts: DateTime<Utc>,

    /// Pod heart rate
    pub heart_rate: f64,

    pub presence: f64,

    pub sleep: f64,

    pub sleep_start: bool,

    pub sleep_end: bool,

    pub elapsed_minutes: Option<i64>,

    /// Patch-derived heart rate of the matching 5-minute bucket
    pub hr: Option<f64>,
}

/// Merged series and metadata for one subject night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightResult {
    pub patch_id: String,

    pub user_id: String,

    /// Side the metrics were read from
    pub side: Side,

    pub sleep_start: DateTime<Utc>,

    pub sleep_end: DateTime<Utc>,

    /// Total window length in minutes
    pub total_duration_minutes: i64,

    pub merged: Vec<MergedRow>,

    /// Pod night the window was detected on, as loaded
    pub pod: PodRecording,
}

impl NightResult {
    /// Window length in fractional hours
    pub fn duration_hours(&self) -> f64 {
        self.total_duration_minutes as f64 / 60.0
    }

    /// Share of merged rows with a patch heart rate, in percent
    pub fn patch_coverage(&self) -> f64 {
        if self.merged.is_empty() {
            return 0.0;
        }
        let matched = self.merged.iter().filter(|row| row.hr.is_some()).count();
        matched as f64 / self.merged.len() as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_both_side_reads_left() {
        assert_eq!(Side::Both.measured(), Side::Left);
        assert_eq!(Side::Right.measured(), Side::Right);

        let row = PodMetricsRow {
            ts: at(0, 0),
            left_hr: Some(55.0),
            left_presence: Some(1.0),
            left_sleep: Some(1.0),
            left_stage: Some("deep".to_string()),
            right_hr: Some(70.0),
            right_presence: None,
            right_sleep: None,
            right_stage: None,
        };
        assert_eq!(row.side(Side::Both).hr, Some(55.0));
        assert_eq!(row.side(Side::Right).hr, Some(70.0));
    }

    #[test]
    fn test_window_contains_is_inclusive() {
        let window = SleepWindow { start: at(1, 0), end: at(6, 0) };
        assert!(window.contains(&at(1, 0)));
        assert!(window.contains(&at(6, 0)));
        assert!(!window.contains(&at(6, 5)));
        assert_eq!(window.duration(), Duration::hours(5));
    }

    #[test]
    fn test_patch_coverage() {
        let row = |hr| MergedRow {
            ts: at(1, 0),
            heart_rate: 60.0,
            presence: 1.0,
            sleep: 1.0,
            sleep_start: false,
            sleep_end: false,
            elapsed_minutes: Some(5),
            hr,
        };
        let night = NightResult {
            patch_id: "A1_U1".to_string(),
            user_id: "U1".to_string(),
            side: Side::Left,
            sleep_start: at(1, 0),
            sleep_end: at(7, 0),
            total_duration_minutes: 360,
            merged: vec![row(Some(60.0)), row(None), row(Some(61.0)), row(None)],
            pod: PodRecording {
                user_id: "U1".to_string(),
                side: Side::Left,
                metrics: Vec::new(),
            },
        };
        assert_eq!(night.patch_coverage(), 50.0);
        assert_eq!(night.duration_hours(), 6.0);
    }
}
