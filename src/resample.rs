//! Patch-side resampling onto the comparison grid.
//!
//! Beats are counted per fine bin (1 minute), which is beats per minute
//! directly; the fine counts are then averaged per grid bucket (5 minutes).

use chrono::{DateTime, DurationRound, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SleepSyncError};
use crate::models::{HrBucket, PatchRecording, RrSample, SleepWindow};

/// Resampling resolutions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResampleConfig {
    /// Fine bin in minutes used to count beats (default: 1)
    pub bin_minutes: i64,

    /// Comparison grid in minutes (default: 5)
    pub grid_minutes: i64,

    /// Decimal places kept in the bucket means (default: 2)
    pub decimals: u32,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        ResampleConfig {
            bin_minutes: 1,
            grid_minutes: 5,
            decimals: 2,
        }
    }
}

/// Patch-derived heart rate on the grid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HrSeries {
    pub buckets: Vec<HrBucket>,
}

impl HrSeries {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets inside the window, both ends included
    pub fn restrict(&self, window: &SleepWindow) -> HrSeries {
        HrSeries {
            buckets: self
                .buckets
                .iter()
                .filter(|b| window.contains(&b.ts))
                .copied()
                .collect(),
        }
    }

    /// Lookup table keyed by bucket start
    pub fn by_timestamp(&self) -> BTreeMap<DateTime<Utc>, Option<f64>> {
        self.buckets.iter().map(|b| (b.ts, b.hr)).collect()
    }
}

/// Truncate a timestamp onto a grid of `minutes`, aligned to the Unix epoch
pub fn floor_to_grid(ts: DateTime<Utc>, minutes: i64) -> Result<DateTime<Utc>> {
    ts.duration_trunc(Duration::minutes(minutes))
        .map_err(|e| SleepSyncError::Internal(format!("cannot align {} to {}m grid: {}", ts, minutes, e)))
}

/// Raw interval samples of a patch recording
pub fn load_patch_variables(recording: &PatchRecording) -> &[RrSample] {
    &recording.rr_intervals
}

/// Converts raw inter-beat intervals into grid heart rate
#[derive(Debug, Clone, Default)]
pub struct HrResampler {
    config: ResampleConfig,
}

impl HrResampler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ResampleConfig) -> Result<Self> {
        if config.bin_minutes <= 0 || config.grid_minutes <= 0 {
            return Err(SleepSyncError::Configuration(
                "resample bins must be positive".to_string(),
            ));
        }
        if config.grid_minutes % config.bin_minutes != 0 {
            return Err(SleepSyncError::Configuration(format!(
                "grid of {}m is not a multiple of the {}m bin",
                config.grid_minutes, config.bin_minutes
            )));
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &ResampleConfig {
        &self.config
    }

    /// Count non-missing intervals per fine bin.
    ///
    /// Bins run contiguously from the first to the last sample's bin; bins
    /// without samples count zero.
    pub fn bin_counts(&self, samples: &[RrSample]) -> Result<Vec<(DateTime<Utc>, u32)>> {
        let step = self.config.bin_minutes;

        let mut counts: BTreeMap<DateTime<Utc>, u32> = BTreeMap::new();
        for sample in samples {
            let bin = floor_to_grid(sample.ts, step)?;
            let count = counts.entry(bin).or_insert(0);
            if sample.rr.is_some() {
                *count += 1;
            }
        }

        let (Some(&first), Some(&last)) = (counts.keys().next(), counts.keys().next_back()) else {
            return Ok(Vec::new());
        };

        let mut filled = Vec::new();
        let mut bin = first;
        while bin <= last {
            filled.push((bin, counts.get(&bin).copied().unwrap_or(0)));
            bin += Duration::minutes(step);
        }
        Ok(filled)
    }

    /// Heart rate per grid bucket: the mean of the fine-bin counts it holds,
    /// rounded to the configured decimals.
    pub fn hr_per_grid(&self, samples: &[RrSample]) -> Result<HrSeries> {
        let bins = self.bin_counts(samples)?;

        let mut grouped: BTreeMap<DateTime<Utc>, (u32, u32)> = BTreeMap::new();
        for (bin, count) in bins {
            let bucket = floor_to_grid(bin, self.config.grid_minutes)?;
            let entry = grouped.entry(bucket).or_insert((0, 0));
            entry.0 += count;
            entry.1 += 1;
        }

        let factor = 10f64.powi(self.config.decimals as i32);
        let buckets = grouped
            .into_iter()
            .map(|(ts, (sum, n))| HrBucket {
                ts,
                hr: Some((sum as f64 / n as f64 * factor).round() / factor),
            })
            .collect();

        Ok(HrSeries { buckets })
    }

    /// Convenience over a whole patch recording
    pub fn patch_hr(&self, recording: &PatchRecording) -> Result<HrSeries> {
        self.hr_per_grid(load_patch_variables(recording))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 3, 1, 23, 0, 0).unwrap()
    }

    /// One beat per second from `offset_s` for `seconds` seconds
    fn steady_stream(offset_s: i64, seconds: i64) -> Vec<RrSample> {
        (0..seconds)
            .map(|s| RrSample {
                ts: base() + Duration::seconds(offset_s + s),
                rr: Some(1.0),
            })
            .collect()
    }

    #[test]
    fn test_constant_sixty_bpm() {
        let series = HrResampler::new().hr_per_grid(&steady_stream(0, 20 * 60)).unwrap();
        assert_eq!(series.len(), 4);
        for bucket in &series.buckets {
            assert_eq!(bucket.hr, Some(60.0));
        }
        assert_eq!(series.buckets[1].ts, base() + Duration::minutes(5));
    }

    #[test]
    fn test_gap_minutes_count_zero() {
        // Minute 0 full, minutes 1..=3 empty, minute 4 full
        let mut samples = steady_stream(0, 60);
        samples.extend(steady_stream(4 * 60, 60));

        let resampler = HrResampler::new();
        let bins = resampler.bin_counts(&samples).unwrap();
        assert_eq!(bins.iter().map(|b| b.1).collect::<Vec<_>>(), vec![60, 0, 0, 0, 60]);

        let series = resampler.hr_per_grid(&samples).unwrap();
        assert_eq!(series.buckets[0].hr, Some(24.0));
    }

    #[test]
    fn test_missing_intervals_not_counted() {
        let mut samples = steady_stream(0, 60);
        for sample in samples.iter_mut().take(15) {
            sample.rr = None;
        }
        let series = HrResampler::new().hr_per_grid(&samples).unwrap();
        assert_eq!(series.buckets[0].hr, Some(45.0));
    }

    #[test]
    fn test_partial_bucket_averages_present_minutes() {
        // Stream starts at minute 3: the first bucket only holds minutes 3 and 4
        let samples = steady_stream(3 * 60, 7 * 60);
        let series = HrResampler::new().hr_per_grid(&samples).unwrap();
        assert_eq!(series.buckets[0].ts, base());
        assert_eq!(series.buckets[0].hr, Some(60.0));
        assert_eq!(series.len(), 2);
    }

    #[test]
    fn test_rounding() {
        // 3 minutes with 61, 60, 60 beats → 60.333...
        let mut samples = steady_stream(0, 180);
        samples.push(RrSample {
            ts: base() + Duration::milliseconds(500),
            rr: Some(0.5),
        });
        samples.sort_by_key(|s| s.ts);
        let series = HrResampler::new().hr_per_grid(&samples).unwrap();
        assert_eq!(series.buckets[0].hr, Some(60.33));
    }

    #[test]
    fn test_empty_input() {
        let series = HrResampler::new().hr_per_grid(&[]).unwrap();
        assert!(series.is_empty());
    }

    #[test]
    fn test_restrict_inclusive() {
        let series = HrResampler::new().hr_per_grid(&steady_stream(0, 30 * 60)).unwrap();
        let window = SleepWindow {
            start: base() + Duration::minutes(5),
            end: base() + Duration::minutes(15),
        };
        let restricted = series.restrict(&window);
        assert_eq!(restricted.len(), 3);
    }

    #[test]
    fn test_invalid_config() {
        let config = ResampleConfig {
            bin_minutes: 2,
            grid_minutes: 5,
            decimals: 2,
        };
        assert!(HrResampler::with_config(config).is_err());
    }

    proptest! {
        #[test]
        fn steady_streams_resample_to_their_rate(minutes in 1i64..120, offset in 0i64..3600) {
            // Whole minutes starting on a grid boundary yield the beat rate everywhere
            let start = offset * 300;
            let series = HrResampler::new().hr_per_grid(&steady_stream(start, minutes * 60)).unwrap();
            for bucket in &series.buckets {
                prop_assert_eq!(bucket.hr, Some(60.0));
            }
        }
    }
}
