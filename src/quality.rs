//! Outlier removal and missing-data statistics over patch heart rate.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::error::Result;
use crate::import::{subject_from_patch_id, Dataset};
use crate::models::HrBucket;
use crate::resample::{HrResampler, HrSeries};

/// Plausible heart-rate range; values on or beyond either bound are outliers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlierBounds {
    /// Lower bound in bpm (default: 35)
    pub lower: f64,

    /// Upper bound in bpm (default: 110)
    pub upper: f64,
}

impl Default for OutlierBounds {
    fn default() -> Self {
        OutlierBounds {
            lower: 35.0,
            upper: 110.0,
        }
    }
}

impl OutlierBounds {
    /// Strictly between the bounds
    pub fn accepts(&self, hr: f64) -> bool {
        hr > self.lower && hr < self.upper
    }
}

/// Replace heart rates outside `bounds` with a missing marker
pub fn remove_outliers(series: &HrSeries, bounds: &OutlierBounds) -> HrSeries {
    HrSeries {
        buckets: series
            .buckets
            .iter()
            .map(|b| HrBucket {
                ts: b.ts,
                hr: b.hr.filter(|&hr| bounds.accepts(hr)),
            })
            .collect(),
    }
}

/// Share of buckets without a heart rate, in percent (0 for an empty series)
pub fn missing_percentage(series: &HrSeries) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let missing = series.buckets.iter().filter(|b| b.hr.is_none()).count();
    missing as f64 / series.len() as f64 * 100.0
}

/// Missing-data figures of one patch recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectMissing {
    pub patch_id: String,

    /// Subject token of the patch key
    pub subject_id: String,

    pub total_buckets: usize,

    pub missing_buckets: usize,

    pub missing_pct: f64,
}

/// Subject holding an extreme missing percentage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Extreme {
    pub subject_id: String,
    pub missing_pct: f64,
}

/// Missing-data statistics across all patch recordings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MissingDataReport {
    pub entries: Vec<SubjectMissing>,

    /// Subject with the lowest missing percentage
    pub lowest: Option<Extreme>,

    /// Subject with the highest missing percentage
    pub highest: Option<Extreme>,
}

impl MissingDataReport {
    /// Resample every patch, drop outliers and measure what is missing
    pub fn build(
        dataset: &Dataset,
        resampler: &HrResampler,
        bounds: &OutlierBounds,
    ) -> Result<Self> {
        let mut entries = Vec::new();

        for (patch_id, recording) in &dataset.patches {
            let subject_id = subject_from_patch_id(patch_id)
                .unwrap_or(patch_id.as_str())
                .to_string();

            let filtered = remove_outliers(&resampler.patch_hr(recording)?, bounds);
            let missing_buckets = filtered.buckets.iter().filter(|b| b.hr.is_none()).count();
            let missing_pct = missing_percentage(&filtered);

            debug!(patch_id = %patch_id, subject = %subject_id, missing_pct, "Missing data measured");

            entries.push(SubjectMissing {
                patch_id: patch_id.clone(),
                subject_id,
                total_buckets: filtered.len(),
                missing_buckets,
                missing_pct,
            });
        }

        let report = Self::from_entries(entries);
        info!(
            patches = report.entries.len(),
            lowest = ?report.lowest.as_ref().map(|e| &e.subject_id),
            highest = ?report.highest.as_ref().map(|e| &e.subject_id),
            "Missing-data report built"
        );
        Ok(report)
    }

    /// Derive the extremes from per-patch entries.
    ///
    /// Lowest and highest are tracked independently; on ties the later
    /// entry wins on both sides.
    pub fn from_entries(entries: Vec<SubjectMissing>) -> Self {
        let mut lowest: Option<Extreme> = None;
        let mut highest: Option<Extreme> = None;

        for entry in &entries {
            if lowest.as_ref().map_or(true, |l| entry.missing_pct <= l.missing_pct) {
                lowest = Some(Extreme {
                    subject_id: entry.subject_id.clone(),
                    missing_pct: entry.missing_pct,
                });
            }
            if highest.as_ref().map_or(true, |h| entry.missing_pct >= h.missing_pct) {
                highest = Some(Extreme {
                    subject_id: entry.subject_id.clone(),
                    missing_pct: entry.missing_pct,
                });
            }
        }

        Self {
            entries,
            lowest,
            highest,
        }
    }

    fn percentages(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.missing_pct).collect()
    }

    /// Mean missing percentage across patches
    pub fn average_pct(&self) -> Option<f64> {
        (!self.entries.is_empty()).then(|| self.percentages().mean())
    }

    pub fn min_pct(&self) -> Option<f64> {
        (!self.entries.is_empty()).then(|| self.percentages().min())
    }

    pub fn max_pct(&self) -> Option<f64> {
        (!self.entries.is_empty()).then(|| self.percentages().max())
    }
}
