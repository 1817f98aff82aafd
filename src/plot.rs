//! Visual inspection of merged nights and pod heart rate.
//!
//! Data preparation is always available; drawing needs the `charts` feature.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::Result;
use crate::export::{read_night_result, ResultFormat};
use crate::import::{subject_from_patch_id, FileKind, ImportManager};
use crate::models::{MergedRow, NightResult, PodRecording};

/// Paired patch (x) and pod (y) heart rates of one night
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationData {
    pub subject: String,

    /// `(patch hr, pod heart_rate)` for rows where both are present
    pub pairs: Vec<(f64, f64)>,
}

impl CorrelationData {
    pub fn from_rows(subject: impl Into<String>, rows: &[MergedRow]) -> Self {
        Self {
            subject: subject.into(),
            pairs: rows
                .iter()
                .filter_map(|row| row.hr.map(|hr| (hr, row.heart_rate)))
                .collect(),
        }
    }

    /// Pearson correlation coefficient; `None` with fewer than two pairs or
    /// when either side is constant
    pub fn pearson_r(&self) -> Option<f64> {
        if self.pairs.len() < 2 {
            return None;
        }
        let xs: Vec<f64> = self.pairs.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = self.pairs.iter().map(|p| p.1).collect();

        let sx = xs.iter().std_dev();
        let sy = ys.iter().std_dev();
        if sx == 0.0 || sy == 0.0 {
            return None;
        }

        let r = xs.iter().covariance(ys.iter()) / (sx * sy);
        r.is_finite().then_some(r)
    }

    /// Shared axis range covering both coordinates
    pub fn axis_range(&self) -> (f64, f64) {
        let values = self.pairs.iter().flat_map(|&(x, y)| [x, y]);
        let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if lo.is_finite() && hi.is_finite() && hi > lo {
            (lo.floor() - 1.0, hi.ceil() + 1.0)
        } else {
            (30.0, 120.0)
        }
    }
}

/// Merged result files in `dir` whose names start with the patch prefix,
/// paired with the subject token of each file name
pub fn load_result_files(dir: &Path) -> Result<Vec<(String, NightResult)>> {
    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if path.is_file()
            && FileKind::classify(&name) == FileKind::Patch
            && ResultFormat::from_path(&path).is_ok()
        {
            paths.push(path);
        }
    }
    paths.sort();

    let mut results = Vec::new();
    for path in paths {
        let result = read_night_result(&path)?;
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let subject = subject_from_patch_id(&stem)
            .map(str::to_string)
            .unwrap_or_else(|| result.user_id.clone());
        debug!(path = %path.display(), subject = %subject, "Loaded result file");
        results.push((subject, result));
    }
    Ok(results)
}

/// Pod night behind a stage chart: the recording embedded in a result file
/// (`A*` names or any `.bin`), otherwise a raw pod file
pub fn load_stage_recording(path: &Path) -> Result<PodRecording> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let is_result = match ResultFormat::from_path(path) {
        Ok(ResultFormat::Bincode) => true,
        Ok(ResultFormat::Json) => FileKind::classify(&name) == FileKind::Patch,
        Err(_) => false,
    };

    if is_result {
        debug!(path = %path.display(), "Reading pod night from result file");
        Ok(read_night_result(path)?.pod)
    } else {
        ImportManager::new().read_pod(path)
    }
}

/// One histogram bin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u32,
}

/// Heart-rate histograms of one pod night, one per sleep stage, over shared bins
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageHistogram {
    pub stages: BTreeMap<String, Vec<HistogramBin>>,
}

impl StageHistogram {
    /// Group the measured side's heart rate by sleep stage. Rows missing
    /// either value are dropped.
    pub fn from_recording(recording: &PodRecording, bins: usize) -> Self {
        let side = recording.side.measured();
        let mut grouped: BTreeMap<String, Vec<f64>> = BTreeMap::new();
        for row in &recording.metrics {
            let metrics = row.side(side);
            if let (Some(hr), Some(stage)) = (metrics.hr, metrics.stage) {
                grouped.entry(stage).or_default().push(hr);
            }
        }
        Self::from_groups(&grouped, bins)
    }

    fn from_groups(grouped: &BTreeMap<String, Vec<f64>>, bins: usize) -> Self {
        let bins = bins.max(1);
        let all = grouped.values().flatten().copied();
        let (lo, hi) = all.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if !lo.is_finite() {
            return Self { stages: BTreeMap::new() };
        }
        // A single distinct value still gets a unit-wide range
        let (lo, hi) = if hi > lo { (lo, hi) } else { (lo - 0.5, hi + 0.5) };
        let width = (hi - lo) / bins as f64;

        let stages = grouped
            .iter()
            .map(|(stage, values)| {
                let mut counts = vec![0u32; bins];
                for &v in values {
                    // The last bin is closed on the right
                    let idx = (((v - lo) / width) as usize).min(bins - 1);
                    counts[idx] += 1;
                }
                let histogram = counts
                    .into_iter()
                    .enumerate()
                    .map(|(i, count)| HistogramBin {
                        lower: lo + width * i as f64,
                        upper: lo + width * (i + 1) as f64,
                        count,
                    })
                    .collect();
                (stage.clone(), histogram)
            })
            .collect();

        Self { stages }
    }

    pub fn max_count(&self) -> u32 {
        self.stages
            .values()
            .flatten()
            .map(|b| b.count)
            .max()
            .unwrap_or(0)
    }
}

#[cfg(feature = "charts")]
use crate::error::ExportError;

#[cfg(feature = "charts")]
fn render_err<E: std::fmt::Display>(e: E) -> ExportError {
    ExportError::Render(e.to_string())
}

/// Scatter of patch vs. pod heart rate with the identity line and r value
#[cfg(feature = "charts")]
pub fn render_correlation(data: &CorrelationData, path: &Path) -> std::result::Result<(), ExportError> {
    use plotters::prelude::*;

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let (lo, hi) = data.axis_range();
    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Correlation between Ground Truth ECG and Pod HR for {}", data.subject),
            ("sans-serif", 20).into_font(),
        )
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(lo..hi, lo..hi)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("hr")
        .y_desc("heart_rate")
        .draw()
        .map_err(render_err)?;

    chart
        .draw_series(
            data.pairs
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 3, BLUE.mix(0.7).filled())),
        )
        .map_err(render_err)?;

    chart
        .draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], &RED))
        .map_err(render_err)?;

    if let Some(r) = data.pearson_r() {
        root.draw(&Text::new(
            format!("r value = {:.2}", r),
            (80, 60),
            ("sans-serif", 16).into_font(),
        ))
        .map_err(render_err)?;
    }

    root.present().map_err(render_err)?;
    Ok(())
}

/// Overlaid per-stage heart-rate histograms
#[cfg(feature = "charts")]
pub fn render_stage_histogram(
    histogram: &StageHistogram,
    title: &str,
    path: &Path,
) -> std::result::Result<(), ExportError> {
    use plotters::prelude::*;

    let root = SVGBackend::new(path, (800, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(render_err)?;

    let bins: Vec<&HistogramBin> = histogram.stages.values().flatten().collect();
    let x_lo = bins.iter().map(|b| b.lower).fold(f64::INFINITY, f64::min);
    let x_hi = bins.iter().map(|b| b.upper).fold(f64::NEG_INFINITY, f64::max);
    let (x_lo, x_hi) = if x_lo.is_finite() && x_hi > x_lo {
        (x_lo, x_hi)
    } else {
        (30.0, 120.0)
    };
    let y_hi = (histogram.max_count() as f64 * 1.1).max(1.0);

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20).into_font())
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_lo..x_hi, 0f64..y_hi)
        .map_err(render_err)?;

    chart
        .configure_mesh()
        .x_desc("heart rate")
        .y_desc("Frequency")
        .draw()
        .map_err(render_err)?;

    for (i, (stage, stage_bins)) in histogram.stages.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(stage_bins.iter().map(move |b| {
                Rectangle::new([(b.lower, 0.0), (b.upper, b.count as f64)], color.mix(0.7).filled())
            }))
            .map_err(render_err)?
            .label(stage.as_str())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .border_style(BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(render_err)?;

    root.present().map_err(render_err)?;
    Ok(())
}
