//! Recently opened directories.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::write_atomically;

use super::error::{StoreError, StoreResult};

pub const HISTORY_FILE_NAME: &str = "directory_history.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub path: PathBuf,
    pub display_name: String,
    pub last_used: DateTime<Utc>,
    pub usage_count: u32,
}

/// Bounded, most-recent-first list of directories.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
    limit: usize,
}

impl HistoryLog {
    pub fn new(state_dir: impl AsRef<Path>, limit: usize) -> Self {
        Self {
            path: state_dir.as_ref().join(HISTORY_FILE_NAME),
            limit,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Existing directories, most recently used first.
    pub fn list(&self) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .read_all()
            .into_iter()
            .filter(|entry| entry.path.is_dir())
            .collect();
        sort_and_cap(&mut entries, self.limit);
        entries
    }

    /// Records a use of `dir`, inserting or bumping its entry.
    pub fn touch(&self, dir: &Path) -> StoreResult<HistoryEntry> {
        if dir.as_os_str().is_empty() {
            return Err(StoreError::EmptyDirectory);
        }

        let path = std::path::absolute(dir).unwrap_or_else(|_| dir.to_path_buf());
        let display_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let now = Utc::now();

        let mut entries = self.list();
        let touched = match entries.iter_mut().find(|entry| entry.path == path) {
            Some(entry) => {
                entry.last_used = now;
                entry.usage_count += 1;
                entry.display_name = display_name;
                entry.clone()
            }
            None => {
                let entry = HistoryEntry {
                    path,
                    display_name,
                    last_used: now,
                    usage_count: 1,
                };
                entries.insert(0, entry.clone());
                entry
            }
        };

        sort_and_cap(&mut entries, self.limit);
        let json = serde_json::to_vec_pretty(&entries)?;
        write_atomically(&self.path, &json)?;
        Ok(touched)
    }

    /// Forgets every entry.
    pub fn clear(&self) -> StoreResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn read_all(&self) -> Vec<HistoryEntry> {
        let Ok(json) = std::fs::read(&self.path) else {
            return Vec::new();
        };
        serde_json::from_slice(&json).unwrap_or_else(|e| {
            tracing::debug!("[store] ignoring unreadable history: {e}");
            Vec::new()
        })
    }
}

fn sort_and_cap(entries: &mut Vec<HistoryEntry>, limit: usize) {
    entries.sort_by(|a, b| b.last_used.cmp(&a.last_used));
    entries.truncate(limit);
}
