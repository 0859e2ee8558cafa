//! Cache keys for generated artifacts and cheap change proxies for source files.
//!
//! A [`Fingerprint`] identifies one rendering request: the canonical source
//! path plus the ordered sub-selection (e.g. workbook sheets) the caller asked
//! for. Label order is kept as given, so callers that consider `[A, B]` and
//! `[B, A]` equivalent must sort before calling. Commas and backslashes inside
//! labels are escaped so distinct label lists never join to the same text.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::utils::canonical_path;

/// Stable SHA-256 key, stored as 64 lowercase hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Key for rendering `source` restricted to `selection`.
    ///
    /// The path is hashed exactly as given; use [`Fingerprint::for_source`]
    /// to canonicalize first.
    pub fn compute(source: &Path, selection: &[String]) -> Self {
        let mut input = source.to_string_lossy().into_owned();
        if !selection.is_empty() {
            input.push('|');
            let escaped: Vec<String> = selection.iter().map(|l| escape_label(l)).collect();
            input.push_str(&escaped.join(","));
        }
        Self(sha256_hex(input.as_bytes()))
    }

    /// Canonicalizes `source` and computes its key.
    pub fn for_source(source: &Path, selection: &[String]) -> Self {
        Self::compute(&canonical_path(source), selection)
    }

    /// Key for an ordered combination of other keys (merged artifacts).
    pub fn combine(parts: &[Fingerprint]) -> Self {
        let joined = parts
            .iter()
            .map(Fingerprint::as_str)
            .collect::<Vec<_>>()
            .join("+");
        Self(sha256_hex(joined.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the artifact stored under this key.
    pub fn artifact_file_name(&self) -> String {
        format!("{}.pdf", self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn escape_label(label: &str) -> String {
    label.replace('\\', "\\\\").replace(',', "\\,")
}

/// Hex-encoded SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Size + mtime proxy for file content, without reading the file.
///
/// Returns `None` when the file cannot be stat'ed.
pub fn lightweight_fingerprint(path: &Path) -> Option<String> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    let since_epoch = modified
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let input = format!(
        "{}_{}_{}",
        metadata.len(),
        since_epoch.as_secs(),
        since_epoch.subsec_nanos()
    );
    Some(sha256_hex(input.as_bytes()))
}

/// Identity of a directory for naming per-directory records.
pub fn directory_hash(dir: &Path) -> String {
    sha256_hex(canonical_path(dir).to_string_lossy().as_bytes())
}
