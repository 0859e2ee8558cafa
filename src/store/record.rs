//! Per-directory JSON records with expiry and load-time validation.

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::fingerprint::{directory_hash, lightweight_fingerprint};
use crate::utils::{canonical_path, months_from, write_atomically};

use super::error::{StoreError, StoreResult};

/// Identity and lifetime fields shared by every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHeader {
    pub directory_path: PathBuf,
    pub directory_hash: String,
    pub last_updated: DateTime<Utc>,
    pub expiry_time: DateTime<Utc>,
}

/// A record kept by a [`RecordStore`].
pub trait PersistedRecord: Serialize + DeserializeOwned + Default {
    /// File name prefix, `<prefix>_<directory hash>.json`.
    const FILE_PREFIX: &'static str;

    fn header(&self) -> &RecordHeader;

    fn set_header(&mut self, header: RecordHeader);

    /// Recomputes the per-file lightweight fingerprints before a save.
    fn refresh_fingerprints(&mut self);

    /// Drops entries that no longer match the filesystem after a load.
    fn validate(&mut self);
}

/// Stores one record of type `R` per directory inside a state directory.
#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    dir: PathBuf,
    expiry_months: u32,
    _record: PhantomData<fn() -> R>,
}

impl<R: PersistedRecord> RecordStore<R> {
    pub fn new(dir: impl Into<PathBuf>, expiry_months: u32) -> Self {
        Self {
            dir: dir.into(),
            expiry_months,
            _record: PhantomData,
        }
    }

    pub fn record_path(&self, directory: &Path) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.json",
            R::FILE_PREFIX,
            directory_hash(directory)
        ))
    }

    /// Overwrites the record for `directory`, stamping identity and expiry.
    pub fn save(&self, directory: &Path, mut record: R) -> StoreResult<PathBuf> {
        if directory.as_os_str().is_empty() {
            return Err(StoreError::EmptyDirectory);
        }

        let directory = canonical_path(directory);
        let now = Utc::now();
        record.set_header(RecordHeader {
            directory_hash: directory_hash(&directory),
            directory_path: directory.clone(),
            last_updated: now,
            expiry_time: months_from(now, self.expiry_months),
        });
        record.refresh_fingerprints();

        let path = self.record_path(&directory);
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomically(&path, &json)?;
        tracing::debug!("[store] saved {}", path.display());
        Ok(path)
    }

    /// Record for `directory` with stale entries removed.
    ///
    /// Missing, unreadable, corrupt or expired records load as the default;
    /// corrupt and expired files are deleted.
    pub fn load(&self, directory: &Path) -> StoreResult<R> {
        if directory.as_os_str().is_empty() {
            return Err(StoreError::EmptyDirectory);
        }

        let path = self.record_path(directory);
        let json = match std::fs::read(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(R::default()),
            Err(e) => {
                tracing::debug!("[store] unreadable {}: {e}", path.display());
                return Ok(R::default());
            }
        };

        let mut record: R = match serde_json::from_slice(&json) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!("[store] discarding corrupt {}: {e}", path.display());
                remove_record_file(&path);
                return Ok(R::default());
            }
        };

        if Utc::now() > record.header().expiry_time {
            tracing::debug!("[store] expired {}", path.display());
            remove_record_file(&path);
            return Ok(R::default());
        }

        record.validate();
        Ok(record)
    }

    /// Deletes records whose file is older than `max_age` or whose embedded
    /// expiry has passed. Returns the number of files removed.
    pub fn sweep(&self, max_age: Duration) -> StoreResult<usize> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let prefix = format!("{}_", R::FILE_PREFIX);
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let now = Utc::now();
        let mut removed = 0;

        for entry in entries.filter_map(Result::ok) {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(&prefix) || !name.ends_with(".json") {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }

            let path = entry.path();
            let too_old = metadata.modified().is_ok_and(|m| m < cutoff);
            let expired = || {
                std::fs::read(&path)
                    .ok()
                    .and_then(|json| serde_json::from_slice::<R>(&json).ok())
                    .is_some_and(|record| now > record.header().expiry_time)
            };

            if too_old || expired() {
                match std::fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(e) => tracing::warn!("[store] failed to remove {}: {e}", path.display()),
                }
            }
        }

        if removed > 0 {
            crate::log_event!("store", "swept", "{removed} {} records", R::FILE_PREFIX);
        }
        Ok(removed)
    }
}

/// Best-effort removal of a record that is being discarded.
fn remove_record_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::debug!("[store] failed to remove {}: {e}", path.display());
    }
}

/// Lightweight fingerprints of every file in `paths` that can be stat'ed.
pub(crate) fn fingerprints_of<'a>(
    paths: impl IntoIterator<Item = &'a PathBuf>,
) -> BTreeMap<PathBuf, String> {
    paths
        .into_iter()
        .filter_map(|path| lightweight_fingerprint(path).map(|fp| (path.clone(), fp)))
        .collect()
}

/// Whether `path` still exists and matches its stored fingerprint.
///
/// Without a stored fingerprint the answer is `unknown_is_valid`.
pub(crate) fn still_valid(
    path: &Path,
    hashes: &BTreeMap<PathBuf, String>,
    unknown_is_valid: bool,
) -> bool {
    if !path.exists() {
        return false;
    }
    match hashes.get(path) {
        Some(expected) => lightweight_fingerprint(path).as_ref() == Some(expected),
        None => unknown_is_valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_record_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session_state_0.json");
        std::fs::write(&path, b"{}").unwrap();

        remove_record_file(&path);
        assert!(!path.exists());
        // Already gone: logged, not an error
        remove_record_file(&path);
        remove_record_file(dir.path());
        assert!(dir.path().is_dir());
    }
}
