use log::{debug, info};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::entry::RawTimeEntry;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid entry file {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A JSON array of time entries on disk.
///
/// Records are kept raw so that malformed or unknown fields survive a
/// rewrite untouched.
pub struct EntryStore {
    path: PathBuf,
    records: Vec<RawTimeEntry>,
}

impl EntryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let content = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;

        let records = if content.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&content).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?
        };
        debug!("Loaded {} record(s) from {}", records.len(), path.display());

        Ok(Self { path, records })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[RawTimeEntry] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops the first record carrying each id in `ids`, returning how many
    /// went. Later records that reuse an id are never scanned, so they are
    /// left alone.
    pub fn remove_entries(&mut self, ids: &[String]) -> usize {
        let ids: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let before = self.records.len();
        let mut seen: HashSet<String> = HashSet::new();
        self.records.retain(|record| match record.id.as_deref() {
            Some(id) if seen.insert(id.to_string()) => !ids.contains(id),
            _ => true,
        });
        before - self.records.len()
    }

    /// Writes the records back, replacing the file in one rename.
    pub fn save(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(&self.records).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, json + "\n").map_err(|source| StoreError::Io {
            path: tmp_path.clone(),
            source,
        })?;
        fs::rename(&tmp_path, &self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;

        info!("Saved {} record(s) to {}", self.records.len(), self.path.display());
        Ok(())
    }
}
