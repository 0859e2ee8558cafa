use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::record::{PersistedRecord, RecordHeader, RecordStore, fingerprints_of, still_valid};

/// What the user had open in a directory: selected files, expanded folders,
/// the active file and per-file selections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    #[serde(flatten)]
    pub header: RecordHeader,

    #[serde(default)]
    pub selected_files: Vec<PathBuf>,

    #[serde(default)]
    pub expanded_folders: Vec<PathBuf>,

    #[serde(default)]
    pub current_file: Option<PathBuf>,

    #[serde(default)]
    pub sheet_selections: BTreeMap<PathBuf, Vec<String>>,

    #[serde(default)]
    pub file_hashes: BTreeMap<PathBuf, String>,
}

pub type SessionStore = RecordStore<SessionRecord>;

impl PersistedRecord for SessionRecord {
    const FILE_PREFIX: &'static str = "session";

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn set_header(&mut self, header: RecordHeader) {
        self.header = header;
    }

    fn refresh_fingerprints(&mut self) {
        self.file_hashes =
            fingerprints_of(self.selected_files.iter().chain(self.sheet_selections.keys()));
    }

    fn validate(&mut self) {
        let hashes = &self.file_hashes;
        self.selected_files
            .retain(|path| still_valid(path, hashes, true));
        self.sheet_selections
            .retain(|path, _| still_valid(path, hashes, true));
        self.expanded_folders.retain(|path| path.is_dir());
        if self.current_file.as_ref().is_some_and(|f| !f.exists()) {
            self.current_file = None;
        }
    }
}
