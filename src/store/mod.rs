//! Persisted per-directory state: sheet selections, UI sessions and the
//! directory history.
//!
//! All files live in the state directory. Stores are their only writers and
//! treat anything unreadable as absent.

mod error;
mod history;
mod record;
mod selection;
mod session;

pub use error::{StoreError, StoreResult};
pub use history::{HISTORY_FILE_NAME, HistoryEntry, HistoryLog};
pub use record::{PersistedRecord, RecordHeader, RecordStore};
pub use selection::{SelectionRecord, SelectionStore};
pub use session::{SessionRecord, SessionStore};
