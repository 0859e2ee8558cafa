//! Burst debouncing for file change events.
//!
//! Office applications save through a flurry of temp-file creates, renames
//! and deletes. Targets touched during a burst are collected and released
//! together once nothing interesting has happened for the quiet period.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// Watched files touched during the current burst.
    pending: BTreeSet<PathBuf>,
    /// Time of the most recent interesting event.
    last_event: Option<Instant>,
    /// How long the burst must stay quiet before it is released.
    quiet: Duration,
}

impl Debouncer {
    pub fn new(quiet: Duration) -> Self {
        Self {
            pending: BTreeSet::new(),
            last_event: None,
            quiet,
        }
    }

    /// Records a change to `target`, restarting the quiet period.
    pub fn record(&mut self, target: PathBuf) {
        self.record_at(target, Instant::now());
    }

    fn record_at(&mut self, target: PathBuf, at: Instant) {
        self.pending.insert(target);
        self.last_event = Some(at);
    }

    /// Takes every target of the burst once it has been quiet long enough.
    ///
    /// Returns an empty list while the burst is still active.
    pub fn take_settled(&mut self) -> Vec<PathBuf> {
        self.take_settled_at(Instant::now())
    }

    fn take_settled_at(&mut self, now: Instant) -> Vec<PathBuf> {
        match self.last_event {
            Some(last) if now.duration_since(last) >= self.quiet => {
                self.last_event = None;
                std::mem::take(&mut self.pending).into_iter().collect()
            }
            _ => Vec::new(),
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
