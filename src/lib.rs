//! Live PDF previews of office documents.
//!
//! Sources are rendered through a content-addressed [`cache::ArtifactCache`],
//! merged when several are requested, and regenerated by the
//! [`coordinator::RegenerationCoordinator`] whenever the watcher or the
//! polling fallback notices that a watched file changed.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod events;
pub mod fingerprint;
pub mod logging;
pub mod render;
pub mod store;
pub mod utils;
pub mod watcher;

pub use cache::{ArtifactCache, CacheError, SweepStats};
pub use config::Settings;
pub use coordinator::{
    ConversionOutcome, ConvertError, RegenerationCoordinator, SaveError, SaveState,
    default_save_path,
};
pub use events::{EventBroadcaster, PreviewEvent};
pub use fingerprint::Fingerprint;
pub use render::{CommandRenderer, RenderError, Renderer, SheetInfo, list_sheets};
pub use store::{HistoryLog, SelectionStore, SessionStore, StoreError};
pub use watcher::{ChangeSignal, ChangeWatcher, PollingFallback, SignalOrigin, WatchLoop};
