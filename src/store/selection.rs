use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::record::{PersistedRecord, RecordHeader, RecordStore, fingerprints_of, still_valid};

/// Sub-document selections (e.g. workbook sheets) remembered per directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRecord {
    #[serde(flatten)]
    pub header: RecordHeader,

    /// File -> selected labels, in the order the user picked them
    #[serde(default)]
    pub selections: BTreeMap<PathBuf, Vec<String>>,

    #[serde(default)]
    pub file_hashes: BTreeMap<PathBuf, String>,
}

pub type SelectionStore = RecordStore<SelectionRecord>;

impl SelectionRecord {
    pub fn new(selections: BTreeMap<PathBuf, Vec<String>>) -> Self {
        Self {
            selections,
            ..Self::default()
        }
    }

    /// Labels selected for `file`, empty when nothing was recorded.
    pub fn selection_for(&self, file: &Path) -> &[String] {
        self.selections.get(file).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl PersistedRecord for SelectionRecord {
    const FILE_PREFIX: &'static str = "sheet_selections";

    fn header(&self) -> &RecordHeader {
        &self.header
    }

    fn set_header(&mut self, header: RecordHeader) {
        self.header = header;
    }

    fn refresh_fingerprints(&mut self) {
        self.file_hashes = fingerprints_of(self.selections.keys());
    }

    fn validate(&mut self) {
        let hashes = &self.file_hashes;
        // A selection is only trusted for the exact file version it was made on.
        self.selections
            .retain(|path, _| still_valid(path, hashes, false));
    }
}
