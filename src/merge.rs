//! Joining pod nights with patch heart rate.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{error, info, instrument, warn, Level};

use crate::error::{MergeError, Result, SleepSyncError};
use crate::import::{Dataset, MasterIndex};
use crate::models::{MergedRow, NightResult, PodSample, SleepWindow};
use crate::resample::{floor_to_grid, HrResampler, HrSeries};
use crate::sleep::SleepDetector;

/// Left join of pod samples onto patch buckets.
///
/// Each pod sample is matched to the bucket its timestamp falls in on the
/// `grid_minutes` grid; samples without a bucket keep `hr = None`.
pub fn left_join(pod: &[PodSample], patch: &HrSeries, grid_minutes: i64) -> Result<Vec<MergedRow>> {
    let lookup: BTreeMap<DateTime<Utc>, Option<f64>> = patch.by_timestamp();

    pod.iter()
        .map(|sample| {
            let key = floor_to_grid(sample.ts, grid_minutes)?;
            Ok(MergedRow {
                ts: sample.ts,
                heart_rate: sample.heart_rate,
                presence: sample.presence,
                sleep: sample.sleep,
                sleep_start: sample.sleep_start,
                sleep_end: sample.sleep_end,
                elapsed_minutes: sample.elapsed_minutes,
                hr: lookup.get(&key).copied().flatten(),
            })
        })
        .collect()
}

/// Outcome of merging one patch
#[derive(Debug)]
pub struct PatchMerge {
    pub patch_id: String,

    /// Nights merged before any failure
    pub nights: Vec<NightResult>,

    /// Failure that stopped the patch
    pub error: Option<SleepSyncError>,
}

/// Outcome of merging every patch in a dataset
#[derive(Debug, Default)]
pub struct MergeSummary {
    /// Nights merged successfully
    pub nights: Vec<NightResult>,

    /// Patches that failed, with the error
    pub failures: Vec<(String, SleepSyncError)>,
}

/// Drives detection, resampling and joining for patch recordings
#[derive(Debug, Clone, Default)]
pub struct NightMerger {
    detector: SleepDetector,
    resampler: HrResampler,
}

impl NightMerger {
    pub fn new(detector: SleepDetector, resampler: HrResampler) -> Self {
        Self { detector, resampler }
    }

    pub fn detector(&self) -> &SleepDetector {
        &self.detector
    }

    pub fn resampler(&self) -> &HrResampler {
        &self.resampler
    }

    /// Merge one patch with every pod night of the subject wearing it.
    ///
    /// Nights whose window is degenerate or outside the accepted duration are
    /// skipped. A night without any sleep start stops the patch; nights
    /// merged before it are kept in the outcome.
    #[instrument(skip(self, dataset, master))]
    pub fn merge_patch(&self, patch_id: &str, dataset: &Dataset, master: &MasterIndex) -> PatchMerge {
        let mut nights = Vec::new();
        let error = self
            .merge_nights(patch_id, dataset, master, &mut nights)
            .err();

        PatchMerge {
            patch_id: patch_id.to_string(),
            nights,
            error,
        }
    }

    fn merge_nights(
        &self,
        patch_id: &str,
        dataset: &Dataset,
        master: &MasterIndex,
        results: &mut Vec<NightResult>,
    ) -> Result<()> {
        let user_id = master.subject_for(patch_id)?;

        let patch = dataset
            .patches
            .get(patch_id)
            .ok_or_else(|| MergeError::PatchNotLoaded {
                patch_id: patch_id.to_string(),
            })?;

        let nights = dataset
            .pods
            .get(user_id)
            .ok_or_else(|| MergeError::NoPodRecordings {
                user_id: user_id.to_string(),
            })?;

        let patch_hr = self.resampler.patch_hr(patch)?;
        let grid = self.resampler.config().grid_minutes;

        for recording in nights {
            let (series, side, night_user) = self.detector.extract_pod_metrics(recording);

            let window = match self.detector.window(&series, &night_user) {
                Ok(window) => window,
                Err(e) if e.is_night_local() => {
                    info!(user_id = %night_user, error = %e, "Skipping night");
                    continue;
                }
                Err(e) => return Err(e),
            };

            if !self.detector.is_valid(&window) {
                info!(
                    user_id = %night_user,
                    start = %window.start,
                    end = %window.end,
                    minutes = window.duration().num_minutes(),
                    "Sleep window outside accepted duration, skipping night"
                );
                continue;
            }

            let merged = self.merge_window(&series.restrict(&window), &patch_hr, &window, grid)?;
            info!(
                patch_id,
                user_id = %night_user,
                start = %window.start,
                rows = merged.len(),
                "Night merged"
            );

            results.push(NightResult {
                patch_id: patch_id.to_string(),
                user_id: night_user,
                side,
                sleep_start: window.start,
                sleep_end: window.end,
                total_duration_minutes: window.duration().num_minutes(),
                merged,
                pod: recording.clone(),
            });
        }

        Ok(())
    }

    fn merge_window(
        &self,
        pod: &[PodSample],
        patch_hr: &HrSeries,
        window: &SleepWindow,
        grid_minutes: i64,
    ) -> Result<Vec<MergedRow>> {
        left_join(pod, &patch_hr.restrict(window), grid_minutes)
    }

    /// Merge the given patches in order. Each outcome is handed to `observe`
    /// before its nights and failure are folded into the summary.
    pub fn merge_patches<'a, I, F>(
        &self,
        patch_ids: I,
        dataset: &Dataset,
        master: &MasterIndex,
        mut observe: F,
    ) -> MergeSummary
    where
        I: IntoIterator<Item = &'a str>,
        F: FnMut(&PatchMerge),
    {
        let mut summary = MergeSummary::default();

        for patch_id in patch_ids {
            let outcome = self.merge_patch(patch_id, dataset, master);
            observe(&outcome);

            let PatchMerge {
                patch_id,
                mut nights,
                error,
            } = outcome;
            if let Some(e) = error {
                log_failure(&patch_id, nights.len(), &e);
                summary.failures.push((patch_id, e));
            }
            summary.nights.append(&mut nights);
        }

        summary
    }

    /// Merge every loaded patch. Failures are logged and collected.
    pub fn merge_all(&self, dataset: &Dataset, master: &MasterIndex) -> MergeSummary {
        self.merge_patches(dataset.patches.keys().map(String::as_str), dataset, master, |_| {})
    }
}

fn log_failure(patch_id: &str, kept_nights: usize, e: &SleepSyncError) {
    let level = e.severity().to_tracing_level();
    if level == Level::ERROR {
        error!(patch_id, kept_nights, error = %e, "Patch merge failed");
    } else if level == Level::WARN {
        warn!(patch_id, kept_nights, error = %e, "Patch merge stopped");
    } else {
        info!(patch_id, kept_nights, error = %e, "Patch merge stopped");
    }
}
