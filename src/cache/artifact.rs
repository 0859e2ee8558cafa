//! Content-addressed store of rendered PDFs.

use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::Utc;
use parking_lot::Mutex;
use walkdir::WalkDir;

use crate::fingerprint::Fingerprint;
use crate::render::Renderer;
use crate::utils::{canonical_path, modified_time, write_atomically};

use super::error::{CacheError, CacheResult};
use super::manifest::{ArtifactEntry, Manifest};

/// Result of an artifact sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Artifact and stale temporary files deleted
    pub removed: usize,
    pub bytes_freed: u64,
    /// Manifest entries dropped because their file is gone
    pub forgotten: usize,
}

/// Maps fingerprints to rendered PDFs inside one directory.
///
/// An entry is served only while the source's modification time is exactly
/// the one recorded at render time and the artifact file still exists.
pub struct ArtifactCache {
    dir: PathBuf,
    renderer: Arc<dyn Renderer>,
    manifest: Mutex<Manifest>,
}

impl ArtifactCache {
    /// Opens (creating if needed) the artifact directory and loads its manifest.
    pub fn open(dir: impl Into<PathBuf>, renderer: Arc<dyn Renderer>) -> CacheResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let manifest = Manifest::load(&dir);
        tracing::debug!(
            "[cache] opened {} with {} entries",
            dir.display(),
            manifest.entries.len()
        );
        Ok(Self {
            dir,
            renderer,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.manifest.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Valid cached artifact for `source` + `selection`, if any.
    pub fn lookup(&self, source: &Path, selection: &[String]) -> Option<PathBuf> {
        let source = canonical_path(source);
        let mtime = modified_time(&source)?;
        let fingerprint = Fingerprint::compute(&source, selection);
        self.valid_entry(&fingerprint, mtime)
    }

    /// Returns the artifact for `source` restricted to `selection`, rendering
    /// it when there is no valid entry.
    ///
    /// A non-empty selection always renders, as does `force`.
    pub fn lookup_or_render(
        &self,
        source: &Path,
        selection: &[String],
        force: bool,
    ) -> CacheResult<PathBuf> {
        let source = canonical_path(source);
        let force = force || !selection.is_empty();
        let fingerprint = Fingerprint::compute(&source, selection);

        // Captured before rendering: an edit landing mid-render leaves the
        // entry stale instead of masking the edit.
        let mtime = modified_time(&source).ok_or_else(|| CacheError::SourceMissing {
            path: source.clone(),
        })?;

        if !force {
            if let Some(path) = self.valid_entry(&fingerprint, mtime) {
                tracing::debug!("[cache] hit {}", source.display());
                return Ok(path);
            }
        }

        let bytes = self
            .renderer
            .render(&source, selection)
            .map_err(|e| CacheError::Render {
                path: source.clone(),
                source: e,
            })?;

        let file_name = fingerprint.artifact_file_name();
        let path = self.write_artifact(&file_name, &bytes)?;
        crate::log_event!("cache", "rendered", "{} -> {file_name}", source.display());

        let mut manifest = self.manifest.lock();
        manifest.entries.insert(
            fingerprint,
            ArtifactEntry {
                file_name,
                source,
                source_mtime: mtime,
                rendered_at: Utc::now(),
            },
        );
        if let Err(e) = manifest.save(&self.dir) {
            tracing::warn!("[cache] failed to persist manifest: {e}");
        }

        Ok(path)
    }

    fn valid_entry(&self, fingerprint: &Fingerprint, mtime: SystemTime) -> Option<PathBuf> {
        let manifest = self.manifest.lock();
        let entry = manifest.entries.get(fingerprint)?;
        if entry.source_mtime != mtime {
            return None;
        }
        let path = self.dir.join(&entry.file_name);
        path.is_file().then_some(path)
    }

    /// Atomically stores `bytes` as `file_name` inside the artifact directory.
    pub fn write_artifact(&self, file_name: &str, bytes: &[u8]) -> CacheResult<PathBuf> {
        if !is_plain_file_name(file_name) {
            return Err(CacheError::InvalidName(file_name.to_string()));
        }
        let path = self.dir.join(file_name);
        write_atomically(&path, bytes)?;
        Ok(path)
    }

    /// Path of a served artifact. Only plain `.pdf` file names inside the
    /// artifact directory resolve.
    pub fn resolve(&self, file_name: &str) -> Option<PathBuf> {
        if !is_plain_file_name(file_name) {
            return None;
        }
        let path = self.dir.join(file_name);
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        (is_pdf && path.is_file()).then_some(path)
    }

    /// Up to `len` bytes of an artifact starting at `offset`.
    pub fn read_range(&self, file_name: &str, offset: u64, len: usize) -> CacheResult<Vec<u8>> {
        let path = self
            .resolve(file_name)
            .ok_or_else(|| CacheError::NotFound(file_name.to_string()))?;

        let mut file = std::fs::File::open(path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = Vec::with_capacity(len.min(1 << 20));
        file.take(len as u64).read_to_end(&mut buffer)?;
        Ok(buffer)
    }

    /// Deletes artifacts (and leftover temporary files) whose own modification
    /// time is older than `max_age`, then forgets entries whose file is gone.
    pub fn sweep(&self, max_age: Duration) -> CacheResult<SweepStats> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut stats = SweepStats::default();

        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let sweepable = path
                .extension()
                .is_some_and(|ext| ext == "pdf" || ext == "tmp");
            if !sweepable {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if modified >= cutoff {
                continue;
            }

            match std::fs::remove_file(path) {
                Ok(()) => {
                    stats.removed += 1;
                    stats.bytes_freed += metadata.len();
                    tracing::debug!("[cache] swept {}", path.display());
                }
                Err(e) => tracing::warn!("[cache] failed to remove {}: {e}", path.display()),
            }
        }

        let mut manifest = self.manifest.lock();
        let before = manifest.entries.len();
        manifest
            .entries
            .retain(|_, entry| self.dir.join(&entry.file_name).is_file());
        stats.forgotten = before - manifest.entries.len();
        if stats.forgotten > 0 {
            if let Err(e) = manifest.save(&self.dir) {
                tracing::warn!("[cache] failed to persist manifest: {e}");
            }
        }

        crate::log_event!(
            "cache",
            "swept",
            "{} files, {} bytes, {} entries forgotten",
            stats.removed,
            stats.bytes_freed,
            stats.forgotten
        );
        Ok(stats)
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().is_some_and(|n| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::RenderError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Renders the source bytes prefixed with the selection.
    #[derive(Default)]
    struct EchoRenderer {
        calls: AtomicUsize,
    }

    impl Renderer for EchoRenderer {
        fn name(&self) -> &str {
            "echo"
        }

        fn render(&self, source: &Path, selection: &[String]) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out = selection.join(",").into_bytes();
            out.extend(std::fs::read(source)?);
            Ok(out)
        }
    }

    struct FailingRenderer;

    impl Renderer for FailingRenderer {
        fn name(&self) -> &str {
            "failing"
        }

        fn render(&self, _: &Path, _: &[String]) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Failed {
                reason: "boom".to_string(),
            })
        }
    }

    fn setup() -> (TempDir, Arc<EchoRenderer>, ArtifactCache) {
        let dir = TempDir::new().unwrap();
        let renderer = Arc::new(EchoRenderer::default());
        let cache = ArtifactCache::open(dir.path().join("artifacts"), renderer.clone()).unwrap();
        (dir, renderer, cache)
    }

    #[test]
    fn test_second_lookup_is_a_hit() {
        let (dir, renderer, cache) = setup();
        let source = dir.path().join("report.docx");
        std::fs::write(&source, b"content").unwrap();

        let first = cache.lookup_or_render(&source, &[], false).unwrap();
        let second = cache.lookup_or_render(&source, &[], false).unwrap();

        assert_eq!(first, second);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.lookup(&source, &[]), Some(first));
    }

    #[test]
    fn test_force_and_selection_render_again() {
        let (dir, renderer, cache) = setup();
        let source = dir.path().join("book.xlsx");
        std::fs::write(&source, b"cells").unwrap();

        cache.lookup_or_render(&source, &[], false).unwrap();
        cache.lookup_or_render(&source, &[], true).unwrap();
        let selected = vec!["Sheet2".to_string()];
        let with_selection = cache.lookup_or_render(&source, &selected, false).unwrap();
        cache.lookup_or_render(&source, &selected, false).unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 4);
        assert_eq!(std::fs::read(with_selection).unwrap(), b"Sheet2cells");
    }

    #[test]
    fn test_artifact_removed_behind_our_back_is_rerendered() {
        let (dir, renderer, cache) = setup();
        let source = dir.path().join("report.docx");
        std::fs::write(&source, b"content").unwrap();

        let path = cache.lookup_or_render(&source, &[], false).unwrap();
        std::fs::remove_file(&path).unwrap();
        cache.lookup_or_render(&source, &[], false).unwrap();

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
        assert!(path.exists());
    }

    #[test]
    fn test_missing_source() {
        let (dir, _, cache) = setup();
        let err = cache
            .lookup_or_render(&dir.path().join("nope.docx"), &[], false)
            .unwrap_err();
        assert!(matches!(err, CacheError::SourceMissing { .. }));
    }

    #[test]
    fn test_render_failure_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let artifacts = dir.path().join("artifacts");
        let cache = ArtifactCache::open(&artifacts, Arc::new(FailingRenderer)).unwrap();
        let source = dir.path().join("report.docx");
        std::fs::write(&source, b"content").unwrap();

        let err = cache.lookup_or_render(&source, &[], false).unwrap_err();
        assert!(matches!(err, CacheError::Render { .. }));
        assert!(cache.is_empty());
        assert_eq!(std::fs::read_dir(&artifacts).unwrap().count(), 0);
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let (dir, _, cache) = setup();
        std::fs::write(dir.path().join("secret.pdf"), b"x").unwrap();
        cache.write_artifact("ok.pdf", b"%PDF").unwrap();

        assert!(cache.resolve("ok.pdf").is_some());
        assert!(cache.resolve("../secret.pdf").is_none());
        assert!(cache.resolve("..").is_none());
        assert!(cache.resolve("").is_none());
        assert!(cache.resolve("manifest.json").is_none());
        assert!(cache.write_artifact("../escape.pdf", b"x").is_err());
    }

    #[test]
    fn test_read_range() {
        let (_dir, _, cache) = setup();
        cache.write_artifact("range.pdf", b"0123456789").unwrap();

        assert_eq!(cache.read_range("range.pdf", 2, 3).unwrap(), b"234");
        assert_eq!(cache.read_range("range.pdf", 8, 100).unwrap(), b"89");
        assert!(matches!(
            cache.read_range("missing.pdf", 0, 1),
            Err(CacheError::NotFound(_))
        ));
    }

    #[test]
    fn test_sweep_only_removes_old_files() {
        let (dir, _, cache) = setup();
        let source = dir.path().join("report.docx");
        std::fs::write(&source, b"content").unwrap();
        let fresh = cache.lookup_or_render(&source, &[], false).unwrap();

        let old = cache.write_artifact("old.pdf", b"stale").unwrap();
        let leftover = cache.dir().join(".livepdf-crash.tmp");
        std::fs::write(&leftover, b"partial").unwrap();
        let unrelated = cache.dir().join("notes.txt");
        std::fs::write(&unrelated, b"keep").unwrap();

        let long_ago = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        for path in [&old, &leftover, &unrelated] {
            filetime::set_file_mtime(path, long_ago).unwrap();
        }

        let stats = cache.sweep(Duration::from_secs(24 * 60 * 60)).unwrap();
        assert_eq!(stats.removed, 2);
        assert_eq!(stats.bytes_freed, 12);
        assert!(fresh.exists());
        assert!(!old.exists());
        assert!(!leftover.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn test_sweep_forgets_entries_of_deleted_files() {
        let (dir, _, cache) = setup();
        let source = dir.path().join("report.docx");
        std::fs::write(&source, b"content").unwrap();
        let path = cache.lookup_or_render(&source, &[], false).unwrap();
        std::fs::remove_file(path).unwrap();

        let stats = cache.sweep(Duration::from_secs(60)).unwrap();
        assert_eq!(stats.forgotten, 1);
        assert!(cache.is_empty());
    }
}
