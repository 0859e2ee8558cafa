//! End-to-end behavior of the regeneration coordinator.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use filetime::{FileTime, set_file_mtime};
use livepdf::config::RendererConfig;
use livepdf::watcher::SignalOrigin;
use livepdf::{
    ArtifactCache, ChangeSignal, ChangeWatcher, CommandRenderer, ConvertError, EventBroadcaster,
    PollingFallback, PreviewEvent, RegenerationCoordinator, RenderError, Renderer,
};
use lopdf::{Document, Object, dictionary};
use tempfile::TempDir;
use tokio::sync::mpsc;

fn one_page_pdf(label: &str) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Label" => Object::Name(label.as_bytes().to_vec()),
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).unwrap();
    bytes
}

fn page_labels(path: &Path) -> Vec<String> {
    let doc = Document::load(path).unwrap();
    doc.get_pages()
        .into_values()
        .map(|id| {
            let page = doc.get_dictionary(id).unwrap();
            String::from_utf8(page.get(b"Label").unwrap().as_name().unwrap().to_vec()).unwrap()
        })
        .collect()
}

/// Passes PDFs through while tracking how many renders overlap.
#[derive(Default)]
struct SlowRenderer {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl Renderer for SlowRenderer {
    fn name(&self) -> &str {
        "slow"
    }

    fn render(&self, source: &Path, selection: &[String]) -> Result<Vec<u8>, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(150));
        self.active.fetch_sub(1, Ordering::SeqCst);

        let mut bytes = std::fs::read(source)?;
        if !selection.is_empty() {
            bytes.extend_from_slice(selection.join(",").as_bytes());
        }
        Ok(bytes)
    }
}

fn coordinator_with(
    dir: &Path,
    renderer: Arc<dyn Renderer>,
) -> (RegenerationCoordinator, Arc<ArtifactCache>) {
    let cache = Arc::new(ArtifactCache::open(dir.join("artifacts"), renderer).unwrap());
    let coordinator = RegenerationCoordinator::new(
        cache.clone(),
        ChangeWatcher::detached(),
        EventBroadcaster::new(64),
        true,
    );
    (coordinator, cache)
}

fn write_inputs(dir: &Path, labels: &[&str]) -> Vec<PathBuf> {
    labels
        .iter()
        .map(|label| {
            let path = dir.join(format!("{label}.pdf"));
            std::fs::write(&path, one_page_pdf(label)).unwrap();
            path
        })
        .collect()
}

#[tokio::test]
async fn test_merge_follows_request_order() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(CommandRenderer::new(&RendererConfig::default()));
    let (coordinator, _) = coordinator_with(dir.path(), renderer);
    let inputs = write_inputs(dir.path(), &["A", "B", "C"]);

    let outcome = coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    assert!(outcome.file_name.starts_with("merged_"));
    assert_eq!(page_labels(&outcome.artifact), vec!["A", "B", "C"]);

    let reversed: Vec<PathBuf> = inputs.iter().rev().cloned().collect();
    let outcome = coordinator.convert(&reversed, &HashMap::new()).await.unwrap();
    assert_eq!(page_labels(&outcome.artifact), vec!["C", "B", "A"]);
}

#[tokio::test]
async fn test_partial_failure_still_produces_preview() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(CommandRenderer::new(&RendererConfig::default()));
    let (coordinator, _) = coordinator_with(dir.path(), renderer);
    let mut inputs = write_inputs(dir.path(), &["A", "C"]);
    inputs.insert(1, dir.path().join("missing.docx"));

    let outcome = coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    assert_eq!(outcome.failures.len(), 1);
    assert!(outcome.failures[0].path.ends_with("missing.docx"));
    assert_eq!(page_labels(&outcome.artifact), vec!["A", "C"]);
}

#[tokio::test]
async fn test_unsupported_only_input_fails() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(CommandRenderer::new(&RendererConfig::default()));
    let (coordinator, _) = coordinator_with(dir.path(), renderer);
    let notes = dir.path().join("notes.txt");
    std::fs::write(&notes, b"plain").unwrap();

    let err = coordinator.convert(&[notes], &HashMap::new()).await.unwrap_err();
    assert!(matches!(err, ConvertError::NoFilesConverted { .. }));
    assert!(err.to_string().contains("notes.txt"));
}

#[tokio::test]
async fn test_selection_yields_distinct_artifact() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(SlowRenderer::default());
    let (coordinator, _) = coordinator_with(dir.path(), renderer.clone());
    let inputs = write_inputs(dir.path(), &["Book"]);

    let whole = coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    let selections = HashMap::from([(inputs[0].clone(), vec!["Q1".to_string()])]);
    let partial = coordinator.convert(&inputs, &selections).await.unwrap();

    assert_ne!(whole.artifact, partial.artifact);
    assert!(partial.version > whole.version);
    assert!(std::fs::read(&partial.artifact).unwrap().ends_with(b"Q1"));

    // The recorded selection is replayed by regenerate
    let again = coordinator.regenerate().await.unwrap().unwrap();
    assert_eq!(again.artifact, partial.artifact);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unchanged_source_is_served_from_cache() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(SlowRenderer::default());
    let (coordinator, _) = coordinator_with(dir.path(), renderer.clone());
    let inputs = write_inputs(dir.path(), &["A"]);

    let first = coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    let second = coordinator.regenerate().await.unwrap().unwrap();
    assert_eq!(first.artifact, second.artifact);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);

    set_file_mtime(&inputs[0], FileTime::from_unix_time(1_800_000_000, 0)).unwrap();
    coordinator.regenerate().await.unwrap().unwrap();
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_signals_during_a_run_are_coalesced() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(SlowRenderer::default());
    let (coordinator, _) = coordinator_with(dir.path(), renderer.clone());
    let inputs = write_inputs(dir.path(), &["A", "B"]);
    coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

    // Force re-renders so the next run is slow
    for (i, input) in inputs.iter().enumerate() {
        set_file_mtime(input, FileTime::from_unix_time(1_800_000_000 + i as i64, 0)).unwrap();
    }

    let running = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.regenerate().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut handled = Vec::new();
    for origin in [SignalOrigin::Watcher, SignalOrigin::Poller] {
        handled.push(
            coordinator
                .handle_signal(ChangeSignal {
                    origin,
                    paths: inputs.clone(),
                })
                .await,
        );
    }

    running.await.unwrap().unwrap().unwrap();
    assert_eq!(handled, vec![false, false]);
    assert_eq!(renderer.max_active.load(Ordering::SeqCst), 1);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_poller_drives_regeneration() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(SlowRenderer::default());
    let (coordinator, _) = coordinator_with(dir.path(), renderer.clone());
    let inputs = write_inputs(dir.path(), &["A"]);
    set_file_mtime(&inputs[0], FileTime::from_unix_time(1_700_000_000, 0)).unwrap();

    let mut events = coordinator.subscribe();
    coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    assert!(matches!(
        events.recv().await.unwrap(),
        PreviewEvent::Regenerated { .. }
    ));

    let (signals_tx, signals_rx) = mpsc::channel(4);
    tokio::spawn(
        PollingFallback::new(
            coordinator.watch_snapshot(),
            signals_tx,
            Duration::from_millis(25),
        )
        .run(),
    );
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run_signals(signals_rx).await });
    }

    set_file_mtime(&inputs[0], FileTime::from_unix_time(1_700_000_100, 0)).unwrap();

    let regenerated = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let PreviewEvent::Regenerated { version, .. } = events.recv().await.unwrap() {
                return version;
            }
        }
    })
    .await
    .unwrap();
    assert!(regenerated > 0);
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_save_after_conversion() {
    let dir = TempDir::new().unwrap();
    let renderer = Arc::new(CommandRenderer::new(&RendererConfig::default()));
    let (coordinator, _) = coordinator_with(dir.path(), renderer);
    let inputs = write_inputs(dir.path(), &["A"]);

    let outcome = coordinator.convert(&inputs, &HashMap::new()).await.unwrap();
    assert!(coordinator.has_unsaved_changes().await);

    let dest = dir.path().join("exports").join("a.pdf");
    coordinator.save_as(&dest).await.unwrap();
    assert!(!coordinator.has_unsaved_changes().await);
    assert_eq!(coordinator.last_save_location().await, Some(dest.clone()));
    assert_eq!(
        std::fs::read(dest).unwrap(),
        std::fs::read(outcome.artifact).unwrap()
    );
}
