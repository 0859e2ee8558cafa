//! Single-flight regeneration of the preview.
//!
//! The coordinator is the only writer of the watched set and the save state.
//! User requests wait for the lock; change signals from the watcher and the
//! poller try the lock and are dropped while a run is in flight. A dropped
//! signal is not lost: mtimes are captured before rendering, so an edit that
//! lands mid-run is still newer than the poller's baseline afterwards.

mod save_state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, watch};

use crate::cache::ArtifactCache;
use crate::events::{EventBroadcaster, PreviewEvent};
use crate::fingerprint::Fingerprint;
use crate::render::{MergeError, merge_pdfs};
use crate::utils::{canonical_path, common_parent, modified_time};
use crate::watcher::{ChangeSignal, ChangeWatcher, WatchSnapshot};

pub use save_state::{SaveError, SaveState, default_save_path};

/// One input that could not be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFailure {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("No files to convert")]
    NoInputs,

    #[error("Empty file path at position {index}")]
    EmptyPath { index: usize },

    #[error("No files converted successfully: {}", describe_failures(failures))]
    NoFilesConverted { failures: Vec<InputFailure> },

    #[error("Failed to merge PDFs: {0}")]
    MergeFailed(#[from] MergeError),

    #[error("Conversion task failed: {0}")]
    Task(String),
}

fn describe_failures(failures: &[InputFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.path.display(), f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub artifact: PathBuf,
    pub file_name: String,
    /// Increases with every conversion; appended to preview URLs to defeat caching
    pub version: u64,
    /// Inputs that failed while others succeeded
    pub failures: Vec<InputFailure>,
}

/// Files behind the current preview and the state they were rendered from.
#[derive(Debug, Clone, Default)]
pub struct WatchedSet {
    pub files: Vec<PathBuf>,
    pub selections: HashMap<PathBuf, Vec<String>>,
    pub mtimes: HashMap<PathBuf, SystemTime>,
    pub directory: Option<PathBuf>,
    pub generation: u64,
}

struct CoordinatorState {
    watched: WatchedSet,
    save: SaveState,
    watcher: ChangeWatcher,
    version: u64,
}

struct Inner {
    cache: Arc<ArtifactCache>,
    state: Mutex<CoordinatorState>,
    snapshot: watch::Sender<WatchSnapshot>,
    broadcaster: EventBroadcaster,
    auto_update: AtomicBool,
}

/// Cloneable handle; every clone drives the same coordinator.
#[derive(Clone)]
pub struct RegenerationCoordinator {
    inner: Arc<Inner>,
}

impl RegenerationCoordinator {
    pub fn new(
        cache: Arc<ArtifactCache>,
        watcher: ChangeWatcher,
        broadcaster: EventBroadcaster,
        auto_update: bool,
    ) -> Self {
        let (snapshot, _) = watch::channel(WatchSnapshot {
            auto_update,
            ..WatchSnapshot::default()
        });

        Self {
            inner: Arc::new(Inner {
                cache,
                state: Mutex::new(CoordinatorState {
                    watched: WatchedSet::default(),
                    save: SaveState::new(),
                    watcher,
                    version: 0,
                }),
                snapshot,
                broadcaster,
                auto_update: AtomicBool::new(auto_update),
            }),
        }
    }

    /// Snapshot feed for the watch loop and the poller.
    pub fn watch_snapshot(&self) -> watch::Receiver<WatchSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PreviewEvent> {
        self.inner.broadcaster.subscribe()
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.inner.cache
    }

    /// Converts `paths` (in order) into one preview, waiting for any run in
    /// flight. `selections` maps a path to the sub-documents to include.
    pub async fn convert(
        &self,
        paths: &[PathBuf],
        selections: &HashMap<PathBuf, Vec<String>>,
    ) -> Result<ConversionOutcome, ConvertError> {
        if paths.is_empty() {
            return Err(ConvertError::NoInputs);
        }
        if let Some(index) = paths.iter().position(|p| p.as_os_str().is_empty()) {
            return Err(ConvertError::EmptyPath { index });
        }

        let mut state = self.inner.state.lock().await;
        self.convert_locked(&mut state, paths, selections).await
    }

    /// Re-runs the last conversion with the recorded inputs.
    ///
    /// Returns `Ok(None)` when nothing was converted yet or none of the
    /// watched files exists anymore; the last good preview stays in place.
    pub async fn regenerate(&self) -> Result<Option<ConversionOutcome>, ConvertError> {
        let mut state = self.inner.state.lock().await;
        self.regenerate_locked(&mut state).await
    }

    /// Handles one change signal. Returns whether a regeneration ran.
    ///
    /// The signal is dropped when auto-update is off, a run is in flight, or
    /// no watched file differs from the mtime it was last rendered from.
    pub async fn handle_signal(&self, signal: ChangeSignal) -> bool {
        self.inner.broadcaster.send(PreviewEvent::FileChanged {
            paths: signal.paths.clone(),
            origin: signal.origin,
        });

        if !self.auto_update() {
            crate::debug_event!("coordinator", "auto-update off, ignoring signal");
            return false;
        }

        let Ok(mut state) = self.inner.state.try_lock() else {
            crate::debug_event!(
                "coordinator",
                "coalesced",
                "{:?} signal while a run is in flight",
                signal.origin
            );
            return false;
        };

        if !watched_files_changed(&state.watched) {
            crate::debug_event!(
                "coordinator",
                "unchanged",
                "{:?} signal without a newer mtime",
                signal.origin
            );
            return false;
        }

        match self.regenerate_locked(&mut state).await {
            Ok(outcome) => outcome.is_some(),
            Err(e) => {
                tracing::warn!("[coordinator] regeneration failed: {e}");
                false
            }
        }
    }

    /// Consumes signals until every sender is gone. Each signal is handled
    /// on its own task so signals arriving mid-run find the lock taken.
    pub async fn run_signals(&self, mut signals: mpsc::Receiver<ChangeSignal>) {
        while let Some(signal) = signals.recv().await {
            let coordinator = self.clone();
            tokio::spawn(async move {
                coordinator.handle_signal(signal).await;
            });
        }
        crate::debug_event!("coordinator", "signal channel closed");
    }

    pub fn auto_update(&self) -> bool {
        self.inner.auto_update.load(Ordering::SeqCst)
    }

    pub fn set_auto_update(&self, enabled: bool) {
        self.inner.auto_update.store(enabled, Ordering::SeqCst);
        self.inner
            .snapshot
            .send_modify(|snapshot| snapshot.auto_update = enabled);
        crate::log_event!(
            "coordinator",
            "auto-update",
            "{}",
            if enabled { "enabled" } else { "disabled" }
        );
    }

    pub async fn watched_set(&self) -> WatchedSet {
        self.inner.state.lock().await.watched.clone()
    }

    pub async fn watched_dir(&self) -> Option<PathBuf> {
        let state = self.inner.state.lock().await;
        state.watcher.watched_dir().map(Path::to_path_buf)
    }

    pub async fn current_artifact(&self) -> Option<PathBuf> {
        let state = self.inner.state.lock().await;
        state.save.current_artifact().map(Path::to_path_buf)
    }

    pub async fn has_unsaved_changes(&self) -> bool {
        self.inner.state.lock().await.save.has_unsaved_changes()
    }

    pub async fn mark_modified(&self) {
        self.inner.state.lock().await.save.mark_modified();
    }

    pub async fn last_save_location(&self) -> Option<PathBuf> {
        let state = self.inner.state.lock().await;
        state.save.last_save_location().map(Path::to_path_buf)
    }

    /// Copies the current preview to `dest`.
    pub async fn save_as(&self, dest: &Path) -> Result<PathBuf, SaveError> {
        self.inner.state.lock().await.save.save_as(dest)
    }

    async fn regenerate_locked(
        &self,
        state: &mut CoordinatorState,
    ) -> Result<Option<ConversionOutcome>, ConvertError> {
        if !state.watched.files.iter().any(|f| f.exists()) {
            crate::debug_event!("coordinator", "no watched file exists, skipping");
            return Ok(None);
        }

        let files = state.watched.files.clone();
        let selections = state.watched.selections.clone();
        self.convert_locked(state, &files, &selections)
            .await
            .map(Some)
    }

    async fn convert_locked(
        &self,
        state: &mut CoordinatorState,
        paths: &[PathBuf],
        selections: &HashMap<PathBuf, Vec<String>>,
    ) -> Result<ConversionOutcome, ConvertError> {
        let sources: Vec<PathBuf> = paths.iter().map(|p| canonical_path(p)).collect();
        let jobs: Vec<(PathBuf, Vec<String>)> = paths
            .iter()
            .zip(&sources)
            .map(|(original, source)| {
                let selection = selections
                    .get(original)
                    .or_else(|| selections.get(source))
                    .cloned()
                    .unwrap_or_default();
                (source.clone(), selection)
            })
            .collect();

        // Before rendering, so edits during the run stay detectable.
        let mtimes: HashMap<PathBuf, SystemTime> = sources
            .iter()
            .filter_map(|source| modified_time(source).map(|m| (source.clone(), m)))
            .collect();

        let cache = self.inner.cache.clone();
        let task_jobs = jobs.clone();
        let result = tokio::task::spawn_blocking(move || render_all(&cache, &task_jobs))
            .await
            .map_err(|e| ConvertError::Task(e.to_string()))
            .and_then(|rendered| rendered);

        let (artifact, failures) = match result {
            Ok(rendered) => rendered,
            Err(e) => {
                self.inner.broadcaster.send(PreviewEvent::RegenerationFailed {
                    message: e.to_string(),
                });
                return Err(e);
            }
        };

        self.record_watched_set(state, jobs, mtimes);

        state.save.mark_dirty(artifact.clone());
        state.version = next_version(state.version);

        let file_name = artifact
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        crate::log_event!(
            "coordinator",
            "converted",
            "{} inputs -> {file_name} (v{}, {} failed)",
            sources.len(),
            state.version,
            failures.len()
        );
        self.inner.broadcaster.send(PreviewEvent::Regenerated {
            artifact: artifact.clone(),
            version: state.version,
        });

        Ok(ConversionOutcome {
            artifact,
            file_name,
            version: state.version,
            failures,
        })
    }

    /// Stores the new watched set, re-arms the watcher on the inputs' common
    /// directory and publishes a new snapshot generation.
    fn record_watched_set(
        &self,
        state: &mut CoordinatorState,
        jobs: Vec<(PathBuf, Vec<String>)>,
        mtimes: HashMap<PathBuf, SystemTime>,
    ) {
        let files: Vec<PathBuf> = jobs.iter().map(|(source, _)| source.clone()).collect();
        let selections: HashMap<PathBuf, Vec<String>> = jobs
            .into_iter()
            .filter(|(_, selection)| !selection.is_empty())
            .collect();

        let directory = common_parent(&files);
        if let Some(dir) = &directory {
            let recursive = files.iter().any(|f| f.parent() != Some(dir.as_path()));
            if let Err(e) = state.watcher.start_watching(dir, recursive) {
                tracing::warn!("[coordinator] watcher not armed: {e}");
                self.inner.broadcaster.send(PreviewEvent::WatcherDegraded {
                    reason: e.to_string(),
                });
            }
        }

        let generation = state.watched.generation + 1;
        state.watched = WatchedSet {
            files: files.clone(),
            selections,
            mtimes: mtimes.clone(),
            directory,
            generation,
        };

        self.inner.snapshot.send_replace(WatchSnapshot {
            generation,
            files,
            mtimes,
            auto_update: self.auto_update(),
        });
    }
}

/// Renders every job through the cache, then merges when several inputs
/// were requested.
fn render_all(
    cache: &ArtifactCache,
    jobs: &[(PathBuf, Vec<String>)],
) -> Result<(PathBuf, Vec<InputFailure>), ConvertError> {
    let mut artifacts = Vec::with_capacity(jobs.len());
    let mut fingerprints = Vec::with_capacity(jobs.len());
    let mut failures = Vec::new();

    for (source, selection) in jobs {
        match cache.lookup_or_render(source, selection, false) {
            Ok(artifact) => {
                artifacts.push(artifact);
                fingerprints.push(Fingerprint::compute(source, selection));
            }
            Err(e) => {
                tracing::warn!("[coordinator] {e}");
                failures.push(InputFailure {
                    path: source.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    if artifacts.is_empty() {
        return Err(ConvertError::NoFilesConverted { failures });
    }
    if jobs.len() == 1 {
        return Ok((artifacts.remove(0), failures));
    }

    let output = cache
        .dir()
        .join(format!("merged_{}.pdf", Fingerprint::combine(&fingerprints)));
    merge_pdfs(&artifacts, &output)?;
    Ok((output, failures))
}

/// Millisecond timestamp, strictly greater than `previous`.
/// Whether any watched file's mtime differs from the one recorded at its
/// last render. A vanished file counts as a difference.
fn watched_files_changed(watched: &WatchedSet) -> bool {
    watched
        .files
        .iter()
        .any(|file| modified_time(file) != watched.mtimes.get(file).copied())
}

fn next_version(previous: u64) -> u64 {
    let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or(0);
    now.max(previous + 1)
}
