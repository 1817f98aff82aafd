use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::error::{LoadError, Result};

#[derive(Debug, Deserialize)]
struct MasterRow {
    #[serde(rename = "Vital Patch ID")]
    patch_id: String,
    #[serde(rename = "User ID")]
    user_id: String,
}

/// Mapping of vital patch keys to subject identifiers, read from the master CSV
#[derive(Debug, Clone, Default)]
pub struct MasterIndex {
    subjects: HashMap<String, String>,
}

impl MasterIndex {
    /// Load the master CSV (`Vital Patch ID`, `User ID` columns; others ignored)
    pub fn load(path: &Path) -> Result<Self> {
        let parse_err = |reason: String| LoadError::Parse {
            path: path.to_path_buf(),
            reason,
        };

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_path(path)
            .map_err(|e| parse_err(e.to_string()))?;

        let mut subjects = HashMap::new();
        for row in reader.deserialize::<MasterRow>() {
            let row = row.map_err(|e| parse_err(e.to_string()))?;
            // First mapping wins, like a first-match lookup on the table
            subjects.entry(row.patch_id).or_insert(row.user_id);
        }

        Ok(Self { subjects })
    }

    /// Build an index from in-memory pairs
    pub fn from_pairs<I, P, U>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        let mut subjects = HashMap::new();
        for (patch, user) in pairs {
            subjects.entry(patch.into()).or_insert_with(|| user.into());
        }
        Self { subjects }
    }

    /// Subject wearing the given patch
    pub fn subject_for(&self, patch_id: &str) -> Result<&str> {
        self.subjects
            .get(patch_id)
            .map(String::as_str)
            .ok_or_else(|| {
                LoadError::UnknownPatch {
                    patch_id: patch_id.to_string(),
                }
                .into()
            })
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }
}
