//! Change detection for the files behind the current preview.
//!
//! Two independent detectors feed the coordinator:
//!
//! ```text
//! notify events --> WatchLoop (filter + burst debounce) --+
//!                                                         +--> ChangeSignal --> coordinator
//! mtime ticks   --> PollingFallback --------------------+
//!                          ^
//!            WatchSnapshot (tokio::sync::watch, published by the coordinator)
//! ```
//!
//! Detectors only read the snapshot and send signals. Every mutation of the
//! watched set goes through the coordinator.

mod change;
mod debouncer;
mod error;
mod filter;
mod polling;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::SystemTime;

pub use change::{ChangeWatcher, WatchLoop};
pub use debouncer::Debouncer;
pub use error::WatchError;
pub use filter::{TargetMatch, WatchedPaths, is_lock_file_for, normalize_event_path};
pub use polling::PollingFallback;

/// Which detector noticed a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOrigin {
    Watcher,
    Poller,
}

/// Request to regenerate because watched files changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSignal {
    pub origin: SignalOrigin,
    pub paths: Vec<PathBuf>,
}

/// Read-only view of the watched set shared with the detectors.
#[derive(Debug, Clone, Default)]
pub struct WatchSnapshot {
    /// Bumped whenever a conversion records a new watched set
    pub generation: u64,
    pub files: Vec<PathBuf>,
    /// Source mtimes captured right before the last successful conversion
    pub mtimes: HashMap<PathBuf, SystemTime>,
    pub auto_update: bool,
}
