//! Polling fallback for changes the event watcher missed.
//!
//! Network shares, some editors and overflowing event queues lose
//! notifications. Comparing modification times on a fixed interval catches
//! those, at the cost of latency.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};

use crate::utils::modified_time;

use super::{ChangeSignal, SignalOrigin, WatchSnapshot};

/// Compares watched files' mtimes against the last values it has seen.
///
/// The baseline is reseeded from the snapshot whenever the coordinator
/// publishes a new generation, i.e. after every successful conversion.
pub struct PollingFallback {
    snapshot: watch::Receiver<WatchSnapshot>,
    signals: mpsc::Sender<ChangeSignal>,
    check_interval: Duration,
    generation: Option<u64>,
    last_known: HashMap<PathBuf, SystemTime>,
}

impl PollingFallback {
    pub fn new(
        snapshot: watch::Receiver<WatchSnapshot>,
        signals: mpsc::Sender<ChangeSignal>,
        check_interval: Duration,
    ) -> Self {
        Self {
            snapshot,
            signals,
            check_interval,
            generation: None,
            last_known: HashMap::new(),
        }
    }

    /// Polls until the coordinator stops listening.
    pub async fn run(mut self) {
        let mut ticker = interval(self.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if self.signals.is_closed() {
                break;
            }
            if let Some(signal) = self.check() {
                if self.signals.send(signal).await.is_err() {
                    break;
                }
            }
        }

        crate::debug_event!("poller", "stopped");
    }

    /// One comparison pass. Reports at most one changed file.
    pub fn check(&mut self) -> Option<ChangeSignal> {
        let snapshot = self.snapshot.borrow_and_update().clone();

        if self.generation != Some(snapshot.generation) {
            self.last_known = snapshot.mtimes.clone();
            self.generation = Some(snapshot.generation);
            tracing::trace!(
                "[poller] reseeded with {} files (generation {})",
                self.last_known.len(),
                snapshot.generation
            );
        }

        if !snapshot.auto_update {
            return None;
        }

        for file in &snapshot.files {
            let Some(last) = self.last_known.get(file).copied() else {
                continue;
            };
            let Some(current) = modified_time(file) else {
                continue;
            };
            if current > last {
                self.last_known.insert(file.clone(), current);
                crate::log_event!("poller", "changed", "{}", file.display());
                return Some(ChangeSignal {
                    origin: SignalOrigin::Poller,
                    paths: vec![file.clone()],
                });
            }
        }

        None
    }
}
