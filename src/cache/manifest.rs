//! Persisted index of rendered artifacts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fingerprint::Fingerprint;
use crate::utils::write_atomically;

pub const MANIFEST_FILE_NAME: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

/// One rendered artifact and the source state it was rendered from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactEntry {
    /// File name inside the artifact directory
    pub file_name: String,

    /// Canonical source path
    pub source: PathBuf,

    /// Source modification time observed before rendering
    pub source_mtime: SystemTime,

    pub rendered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub entries: BTreeMap<Fingerprint, ArtifactEntry>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            version: MANIFEST_VERSION,
            entries: BTreeMap::new(),
        }
    }
}

impl Manifest {
    /// Loads the manifest from `dir`. Missing, unreadable or foreign-version
    /// manifests yield an empty one; the artifacts are then simply re-rendered.
    pub fn load(dir: &Path) -> Self {
        let path = dir.join(MANIFEST_FILE_NAME);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                tracing::warn!("[cache] failed to read {}: {e}", path.display());
                return Self::default();
            }
        };

        match serde_json::from_str::<Manifest>(&json) {
            Ok(manifest) if manifest.version == MANIFEST_VERSION => manifest,
            Ok(manifest) => {
                tracing::debug!(
                    "[cache] discarding manifest version {} (expected {MANIFEST_VERSION})",
                    manifest.version
                );
                Self::default()
            }
            Err(e) => {
                tracing::warn!("[cache] discarding corrupt manifest: {e}");
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> std::io::Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
        write_atomically(&dir.join(MANIFEST_FILE_NAME), &json)
    }
}
