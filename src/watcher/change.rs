//! Event-driven change detection on top of `notify`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};

use crate::events::{EventBroadcaster, PreviewEvent};

use super::debouncer::Debouncer;
use super::error::WatchError;
use super::filter::{WatchedPaths, normalize_event_path};
use super::{ChangeSignal, SignalOrigin, WatchSnapshot};

/// Raw events delivered by the OS watcher.
pub type EventReceiver = mpsc::Receiver<notify::Result<Event>>;

/// Owns the OS watcher. At most one directory is registered at a time.
pub struct ChangeWatcher {
    watcher: Option<notify::RecommendedWatcher>,
    watched: Option<(PathBuf, RecursiveMode)>,
}

impl ChangeWatcher {
    /// Creates the OS watcher and the channel its events arrive on.
    pub fn new() -> Result<(Self, EventReceiver), WatchError> {
        let (tx, rx) = mpsc::channel(256);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok((
            Self {
                watcher: Some(watcher),
                watched: None,
            },
            rx,
        ))
    }

    /// A watcher without OS backend. It only remembers what it was asked to
    /// watch; changes are then found by polling alone.
    pub fn detached() -> Self {
        Self {
            watcher: None,
            watched: None,
        }
    }

    /// Registers `dir`, unregistering the previously watched directory first.
    pub fn start_watching(&mut self, dir: &Path, recursive: bool) -> Result<(), WatchError> {
        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        if let Some((current, current_mode)) = &self.watched {
            if current == dir && *current_mode == mode {
                return Ok(());
            }
        }

        self.stop();

        if let Some(watcher) = self.watcher.as_mut() {
            watcher
                .watch(dir, mode)
                .map_err(|e| WatchError::PathWatchFailed {
                    path: dir.to_path_buf(),
                    reason: e.to_string(),
                })?;
        }
        crate::debug_event!("watcher", "watching", "{} ({mode:?})", dir.display());
        self.watched = Some((dir.to_path_buf(), mode));
        Ok(())
    }

    /// Unregisters the watched directory, if any.
    pub fn stop(&mut self) {
        let Some((dir, _)) = self.watched.take() else {
            return;
        };
        if let Some(watcher) = self.watcher.as_mut() {
            if let Err(e) = watcher.unwatch(&dir) {
                crate::debug_event!("watcher", "unwatch failed", "{}: {e}", dir.display());
            }
        }
    }

    pub fn watched_dir(&self) -> Option<&Path> {
        self.watched.as_ref().map(|(dir, _)| dir.as_path())
    }

}

/// Turns raw notify events into debounced [`ChangeSignal`]s.
///
/// Runs until either the event channel or the signal channel closes.
pub struct WatchLoop {
    events: EventReceiver,
    snapshot: watch::Receiver<WatchSnapshot>,
    signals: mpsc::Sender<ChangeSignal>,
    broadcaster: EventBroadcaster,
    debouncer: Debouncer,
    tick: Duration,
    error_threshold: u32,
    consecutive_errors: u32,
    paths: WatchedPaths,
    generation: Option<u64>,
}

impl WatchLoop {
    pub fn new(
        events: EventReceiver,
        snapshot: watch::Receiver<WatchSnapshot>,
        signals: mpsc::Sender<ChangeSignal>,
        broadcaster: EventBroadcaster,
        quiet: Duration,
        error_threshold: u32,
    ) -> Self {
        Self {
            events,
            snapshot,
            signals,
            broadcaster,
            debouncer: Debouncer::new(quiet),
            tick: (quiet / 5).clamp(Duration::from_millis(10), Duration::from_millis(100)),
            error_threshold: error_threshold.max(1),
            consecutive_errors: 0,
            paths: WatchedPaths::default(),
            generation: None,
        }
    }

    pub async fn run(mut self) {
        let mut ticker = interval(self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        crate::debug_event!("watcher", "started");

        loop {
            tokio::select! {
                received = self.events.recv() => match received {
                    Some(Ok(event)) => {
                        self.consecutive_errors = 0;
                        self.handle_event(event);
                    }
                    Some(Err(e)) => self.handle_error(e),
                    None => break,
                },

                _ = ticker.tick() => {
                    if !self.flush_settled().await {
                        break;
                    }
                }
            }
        }

        crate::debug_event!("watcher", "stopped");
    }

    /// Rebuilds the path index when a new watched set was published.
    /// Returns whether automatic updates are enabled.
    fn refresh_paths(&mut self) -> bool {
        let snapshot = self.snapshot.borrow();
        if self.generation != Some(snapshot.generation) {
            self.paths = WatchedPaths::new(snapshot.files.iter().cloned());
            self.generation = Some(snapshot.generation);
        }
        snapshot.auto_update
    }

    fn handle_event(&mut self, event: Event) {
        let auto_update = self.refresh_paths();

        let removal = match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) => false,
            EventKind::Remove(_) => true,
            _ => return,
        };

        for raw in &event.paths {
            let path = normalize_event_path(raw);
            let matches = self.paths.targets_for(&path);
            if matches.is_empty() {
                crate::debug_event!(
                    "watcher",
                    "unmatched",
                    "{:?} {}",
                    event.kind,
                    path.display()
                );
                continue;
            }
            if !auto_update {
                crate::debug_event!("watcher", "auto-update off", "{}", path.display());
                continue;
            }

            for found in matches {
                if removal && found.lock_file {
                    crate::debug_event!("watcher", "lock file removed", "{}", path.display());
                    continue;
                }
                self.debouncer.record(found.target);
            }
        }
    }

    fn handle_error(&mut self, error: notify::Error) {
        self.consecutive_errors += 1;
        tracing::warn!("[watcher] file watch error: {error}");

        if self.consecutive_errors == self.error_threshold {
            self.broadcaster.send(PreviewEvent::WatcherDegraded {
                reason: error.to_string(),
            });
        }
    }

    /// Signals the settled burst, if any. Returns `false` once nobody listens.
    async fn flush_settled(&mut self) -> bool {
        if !self.debouncer.has_pending() {
            return true;
        }
        let settled = self.debouncer.take_settled();
        if settled.is_empty() {
            return true;
        }

        let auto_update = self.refresh_paths();
        let existing: Vec<PathBuf> = settled
            .into_iter()
            .filter(|target| self.paths.contains(target) && target.exists())
            .collect();

        if existing.is_empty() {
            crate::debug_event!("watcher", "burst settled without surviving targets");
            return true;
        }
        if !auto_update {
            return true;
        }

        crate::log_event!(
            "watcher",
            "changed",
            "{}",
            existing
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        self.signals
            .send(ChangeSignal {
                origin: SignalOrigin::Watcher,
                paths: existing,
            })
            .await
            .is_ok()
    }
}
