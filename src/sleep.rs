//! Pod metric extraction and sleep-window detection.
//!
//! The detector walks the on-bed-and-asleep samples of one night once,
//! accumulating the minutes between consecutive samples. Ten accumulated
//! minutes open a window; twenty more close it on the preceding sample.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{DetectionError, Result};
use crate::models::{PodRecording, PodSample, Side, SleepWindow};

/// Thresholds of the sleep-window scan and the validity policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Accumulated minutes needed to open a window (default: 10)
    pub start_threshold_minutes: i64,

    /// Accumulated minutes after the start that close a window (default: 20)
    pub end_threshold_minutes: i64,

    /// Step assumed for the first sample, which has no predecessor (default: 5)
    pub initial_step_minutes: i64,

    /// Shortest accepted window in minutes (default: 4h)
    pub min_window_minutes: i64,

    /// Longest accepted window in minutes (default: 11h)
    pub max_window_minutes: i64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        DetectionConfig {
            start_threshold_minutes: 10,
            end_threshold_minutes: 20,
            initial_step_minutes: 5,
            min_window_minutes: 4 * 60,
            max_window_minutes: 11 * 60,
        }
    }
}

/// Phase of the forward scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Accumulating toward the start threshold
    SearchingStart,
    /// Window opened at sample `since`; accumulating toward the end threshold
    SearchingEnd { since: usize },
}

/// Pod samples retained for one night, with start/end flags attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodSeries {
    pub samples: Vec<PodSample>,
}

impl PodSeries {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Samples inside the window, both ends included
    pub fn restrict(&self, window: &SleepWindow) -> Vec<PodSample> {
        self.samples
            .iter()
            .filter(|s| window.contains(&s.ts))
            .cloned()
            .collect()
    }
}

/// Sleep-window detector
#[derive(Debug, Clone, Default)]
pub struct SleepDetector {
    config: DetectionConfig,
}

impl SleepDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Project a pod night onto the measured side and run the scan.
    ///
    /// Returns the flagged series, the side actually read and the subject.
    pub fn extract_pod_metrics(&self, recording: &PodRecording) -> (PodSeries, Side, String) {
        let side = recording.side.measured();

        let mut samples: Vec<PodSample> = recording
            .metrics
            .iter()
            .filter_map(|row| {
                let metrics = row.side(side);
                match (metrics.hr, metrics.presence, metrics.sleep) {
                    (Some(heart_rate), Some(presence), Some(sleep)) => Some(PodSample {
                        ts: row.ts,
                        heart_rate,
                        presence,
                        sleep,
                        elapsed_minutes: None,
                        sleep_start: false,
                        sleep_end: false,
                    }),
                    _ => None,
                }
            })
            .filter(|s| s.sleep == 1.0 && s.presence == 1.0)
            .collect();

        samples.sort_by_key(|s| s.ts);
        for i in 1..samples.len() {
            samples[i].elapsed_minutes = Some((samples[i].ts - samples[i - 1].ts).num_minutes());
        }

        self.mark_window(&mut samples);

        debug!(
            user_id = %recording.user_id,
            side = %side,
            samples = samples.len(),
            "Pod metrics extracted"
        );

        (PodSeries { samples }, side, recording.user_id.clone())
    }

    /// Run the two-phase scan over `samples`, setting start and end flags.
    ///
    /// The sample that opens a window also contributes its step to the end
    /// counter. An end never lands before the start of its own cycle.
    pub fn mark_window(&self, samples: &mut [PodSample]) {
        let mut state = ScanState::SearchingStart;
        let mut accumulated = 0i64;

        for i in 0..samples.len() {
            let step = samples[i]
                .elapsed_minutes
                .unwrap_or(self.config.initial_step_minutes);

            if state == ScanState::SearchingStart {
                accumulated += step;
                if accumulated >= self.config.start_threshold_minutes {
                    accumulated = 0;
                    samples[i].sleep_start = true;
                    state = ScanState::SearchingEnd { since: i };
                }
            }

            if let ScanState::SearchingEnd { since } = state {
                accumulated += step;
                if accumulated >= self.config.end_threshold_minutes {
                    let end = i.saturating_sub(1).max(since);
                    samples[end].sleep_end = true;
                    accumulated = 0;
                    state = ScanState::SearchingStart;
                }
            }
        }
    }

    /// First start flag to first end flag, or to the last sample when no end
    /// flag was set.
    pub fn window(&self, series: &PodSeries, user_id: &str) -> Result<SleepWindow> {
        let start = series
            .samples
            .iter()
            .find(|s| s.sleep_start)
            .map(|s| s.ts)
            .ok_or_else(|| DetectionError::NoSleepStart {
                user_id: user_id.to_string(),
            })?;

        let end = series
            .samples
            .iter()
            .find(|s| s.sleep_end)
            .or_else(|| series.samples.last())
            .map(|s| s.ts)
            .unwrap_or(start);

        if end <= start {
            return Err(DetectionError::DegenerateWindow { start, end }.into());
        }

        Ok(SleepWindow { start, end })
    }

    /// Whether the window duration lies in the accepted range (both bounds inclusive)
    pub fn is_valid(&self, window: &SleepWindow) -> bool {
        window.is_plausible(
            Duration::minutes(self.config.min_window_minutes),
            Duration::minutes(self.config.max_window_minutes),
        )
    }
}
