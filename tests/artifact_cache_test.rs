//! Artifact cache validity across instances and mtime changes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use filetime::{FileTime, set_file_mtime};
use livepdf::cache::{ArtifactCache, MANIFEST_FILE_NAME};
use livepdf::{Fingerprint, RenderError, Renderer};
use tempfile::TempDir;

#[derive(Default)]
struct CountingRenderer {
    calls: AtomicUsize,
}

impl Renderer for CountingRenderer {
    fn name(&self) -> &str {
        "counting"
    }

    fn render(&self, source: &Path, _selection: &[String]) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(std::fs::read(source)?)
    }
}

#[test]
fn test_manifest_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let artifacts = temp.path().join("artifacts");
    let source = temp.path().join("report.pdf");
    std::fs::write(&source, b"%PDF-report").unwrap();

    let first_renderer = Arc::new(CountingRenderer::default());
    let first = ArtifactCache::open(&artifacts, first_renderer.clone()).unwrap();
    let path = first.lookup_or_render(&source, &[], false).unwrap();
    assert_eq!(first_renderer.calls.load(Ordering::SeqCst), 1);
    assert!(artifacts.join(MANIFEST_FILE_NAME).is_file());
    drop(first);

    let second_renderer = Arc::new(CountingRenderer::default());
    let second = ArtifactCache::open(&artifacts, second_renderer.clone()).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second.lookup_or_render(&source, &[], false).unwrap(), path);
    assert_eq!(second_renderer.calls.load(Ordering::SeqCst), 0);

    let expected_name = Fingerprint::for_source(&source, &[]).artifact_file_name();
    assert_eq!(second.resolve(&expected_name), Some(path));
}

#[test]
fn test_any_mtime_difference_invalidates() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("report.pdf");
    std::fs::write(&source, b"%PDF-report").unwrap();
    set_file_mtime(&source, FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let renderer = Arc::new(CountingRenderer::default());
    let cache = ArtifactCache::open(temp.path().join("artifacts"), renderer.clone()).unwrap();
    cache.lookup_or_render(&source, &[], false).unwrap();
    assert!(cache.lookup(&source, &[]).is_some());

    // Restored backups carry older timestamps; those are changes too
    set_file_mtime(&source, FileTime::from_unix_time(1_600_000_000, 0)).unwrap();
    assert!(cache.lookup(&source, &[]).is_none());
    cache.lookup_or_render(&source, &[], false).unwrap();
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

    set_file_mtime(&source, FileTime::from_unix_time(1_600_000_000, 1)).unwrap();
    assert!(cache.lookup(&source, &[]).is_none());
}

#[test]
fn test_range_reads_for_transport() {
    let temp = TempDir::new().unwrap();
    let source = temp.path().join("report.pdf");
    std::fs::write(&source, b"%PDF-0123456789").unwrap();

    let cache = ArtifactCache::open(
        temp.path().join("artifacts"),
        Arc::new(CountingRenderer::default()),
    )
    .unwrap();
    let artifact = cache.lookup_or_render(&source, &[], false).unwrap();
    let name = artifact.file_name().unwrap().to_string_lossy().into_owned();

    assert_eq!(cache.read_range(&name, 5, 4).unwrap(), b"0123");
    assert!(cache.resolve("../report.pdf").is_none());
    assert!(cache.read_range("../report.pdf", 0, 4).is_err());
}
