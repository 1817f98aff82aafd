use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{LoadError, Result};
use crate::models::{PatchRecording, PodRecording};

pub mod master;
pub mod patch;
pub mod pod;
pub mod serde_helpers;

pub use master::MasterIndex;

/// Suffix carried by vital patch filenames, stripped to form the patch key
pub const PATCH_SUFFIX: &str = "_raw_results";

/// Trait for reading one kind of recording from different file encodings
pub trait RecordingReader {
    type Output;

    /// Check if this reader can handle the given file
    fn can_read(&self, file_path: &Path) -> bool;

    /// Read the recording from the file
    fn read_file(&self, file_path: &Path) -> Result<Self::Output>;

    /// Get the format name for this reader
    fn format_name(&self) -> &'static str;
}

/// Role of a file in the data directory, decided by its name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Master/metadata files (prefix `M`)
    Excluded,
    /// Vital patch recordings (prefix `A`)
    Patch,
    /// Everything else is a pod night
    Pod,
}

impl FileKind {
    pub fn classify(file_name: &str) -> Self {
        if file_name.starts_with('M') {
            FileKind::Excluded
        } else if file_name.starts_with('A') {
            FileKind::Patch
        } else {
            FileKind::Pod
        }
    }
}

/// Patch key of a file: the name with extension and `_raw_results` suffix removed
pub fn patch_key_from_path(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    match stem.find(PATCH_SUFFIX) {
        Some(pos) => stem[..pos].to_string(),
        None => stem,
    }
}

/// Subject token of a patch key (`A0012_U07` → `U07`)
pub fn subject_from_patch_id(patch_id: &str) -> Option<&str> {
    patch_id.split('_').nth(1).filter(|s| !s.is_empty())
}

/// Parse a timestamp in any of the layouts the recorders emit
pub fn parse_timestamp(value: &str) -> std::result::Result<DateTime<Utc>, LoadError> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
    ];

    for format in &formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(DateTime::from_naive_utc_and_offset(naive_dt, Utc));
        }
    }

    // Unix seconds
    if let Ok(seconds) = value.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(seconds, 0) {
            return Ok(dt);
        }
    }

    Err(LoadError::Timestamp {
        value: value.to_string(),
    })
}

/// All recordings found in a data directory
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    /// Pod nights grouped by subject, in discovery order
    pub pods: BTreeMap<String, Vec<PodRecording>>,

    /// Patch recordings keyed by patch key
    pub patches: BTreeMap<String, PatchRecording>,
}

impl Dataset {
    pub fn pod_nights(&self) -> usize {
        self.pods.values().map(Vec::len).sum()
    }

    fn add_pod(&mut self, recording: PodRecording) {
        self.pods
            .entry(recording.user_id.clone())
            .or_default()
            .push(recording);
    }
}

/// Manager coordinating the pod and patch readers
pub struct ImportManager {
    pod_readers: Vec<Box<dyn RecordingReader<Output = PodRecording>>>,
    patch_readers: Vec<Box<dyn RecordingReader<Output = PatchRecording>>>,
}

impl ImportManager {
    /// Create a manager with all available readers
    pub fn new() -> Self {
        Self {
            pod_readers: vec![Box::new(pod::JsonPodReader::new())],
            patch_readers: vec![
                Box::new(patch::CsvPatchReader::new()),
                Box::new(patch::JsonPatchReader::new()),
            ],
        }
    }

    /// Read a single pod night, auto-detecting the encoding
    pub fn read_pod(&self, file_path: &Path) -> Result<PodRecording> {
        for reader in &self.pod_readers {
            if reader.can_read(file_path) {
                debug!(file = %file_path.display(), format = reader.format_name(), "Reading pod night");
                return reader.read_file(file_path);
            }
        }
        Err(LoadError::UnsupportedFormat {
            path: file_path.to_path_buf(),
        }
        .into())
    }

    /// Read a single patch recording, auto-detecting the encoding
    pub fn read_patch(&self, file_path: &Path) -> Result<PatchRecording> {
        for reader in &self.patch_readers {
            if reader.can_read(file_path) {
                debug!(file = %file_path.display(), format = reader.format_name(), "Reading vital patch");
                return reader.read_file(file_path);
            }
        }
        Err(LoadError::UnsupportedFormat {
            path: file_path.to_path_buf(),
        }
        .into())
    }

    /// Load every pod and patch recording in a directory.
    ///
    /// Files are visited in name order. `M*` files are skipped, `A*` files
    /// are patches and everything else is read as a pod night and grouped
    /// under the subject named inside it.
    pub fn load_dataset(&self, dir_path: &Path) -> Result<Dataset> {
        let mut dataset = Dataset::default();

        for path in Self::collect_files(dir_path)? {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            match FileKind::classify(&file_name) {
                FileKind::Excluded => {
                    debug!(file = %file_name, "Skipping excluded file");
                }
                FileKind::Patch => {
                    if !self.patch_readers.iter().any(|r| r.can_read(&path)) {
                        debug!(file = %file_name, "No patch reader for file");
                        continue;
                    }
                    let recording = self.read_patch(&path)?;
                    dataset.patches.insert(recording.patch_id.clone(), recording);
                }
                FileKind::Pod => {
                    if !self.pod_readers.iter().any(|r| r.can_read(&path)) {
                        debug!(file = %file_name, "No pod reader for file");
                        continue;
                    }
                    dataset.add_pod(self.read_pod(&path)?);
                }
            }
        }

        info!(
            dir = %dir_path.display(),
            subjects = dataset.pods.len(),
            nights = dataset.pod_nights(),
            patches = dataset.patches.len(),
            "Dataset loaded"
        );

        Ok(dataset)
    }

    /// Regular, non-hidden files of a directory sorted by name
    fn collect_files(dir_path: &Path) -> Result<Vec<PathBuf>> {
        if !dir_path.is_dir() {
            return Err(LoadError::NotADirectory {
                path: dir_path.to_path_buf(),
            }
            .into());
        }

        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir_path)? {
            let path = entry?.path();
            let hidden = path
                .file_name()
                .map(|n| n.to_string_lossy().starts_with('.'))
                .unwrap_or(true);
            if path.is_file() && !hidden {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl Default for ImportManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a path carries the given extension, case-insensitively
pub(crate) fn has_extension(path: &Path, wanted: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(wanted))
        .unwrap_or(false)
}
