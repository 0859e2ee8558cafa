//! Artifact cache: rendered PDFs keyed by [`Fingerprint`](crate::fingerprint::Fingerprint).
//!
//! Layout inside the artifact directory:
//! - `<fingerprint>.pdf`: one rendered source (or a merged set)
//! - `manifest.json`: fingerprint -> file name + source mtime at render time
//! - `.livepdf-*.tmp`: in-progress writes, removed on failure or by `sweep`

mod artifact;
mod error;
mod manifest;

pub use artifact::{ArtifactCache, SweepStats};
pub use error::{CacheError, CacheResult};
pub use manifest::{ArtifactEntry, MANIFEST_FILE_NAME};
