//! Tracks whether the current preview has been saved somewhere.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SaveError {
    #[error("No PDF to save")]
    NothingToSave,

    #[error("Save path cannot be empty")]
    EmptyDestination,

    #[error("Preview file is gone: {}", path.display())]
    ArtifactMissing { path: PathBuf },

    #[error("Failed to save to {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Current artifact, last save location and the dirty flag.
#[derive(Debug, Default, Clone)]
pub struct SaveState {
    current: Option<PathBuf>,
    last_saved: Option<PathBuf>,
    dirty: bool,
}

impl SaveState {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new artifact replaced the preview; it has not been saved yet.
    pub fn mark_dirty(&mut self, artifact: PathBuf) {
        self.current = Some(artifact);
        self.dirty = true;
    }

    /// The user changed something that affects the next save.
    pub fn mark_modified(&mut self) {
        self.dirty = true;
    }

    /// Copies the current artifact to `dest` and clears the dirty flag.
    pub fn save_as(&mut self, dest: &Path) -> Result<PathBuf, SaveError> {
        if dest.as_os_str().is_empty() {
            return Err(SaveError::EmptyDestination);
        }
        let current = self.current.as_ref().ok_or(SaveError::NothingToSave)?;
        if !current.is_file() {
            return Err(SaveError::ArtifactMissing {
                path: current.clone(),
            });
        }

        let io_error = |source| SaveError::Io {
            path: dest.to_path_buf(),
            source,
        };
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        std::fs::copy(current, dest).map_err(io_error)?;

        self.last_saved = Some(dest.to_path_buf());
        self.dirty = false;
        crate::log_event!("save", "saved", "{}", dest.display());
        Ok(dest.to_path_buf())
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    pub fn current_artifact(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn last_save_location(&self) -> Option<&Path> {
        self.last_saved.as_deref()
    }
}

/// Suggested save location for a preview opened from `initial`.
///
/// A directory `/a/reports` suggests `/a/reports.pdf`; a file
/// `/a/book.xlsx` suggests `/a/book.pdf`. Paths that do not exist are
/// treated as directories.
pub fn default_save_path(initial: &Path) -> PathBuf {
    let absolute = std::path::absolute(initial).unwrap_or_else(|_| initial.to_path_buf());
    let parent = absolute
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| absolute.clone());

    let name = if absolute.is_file() {
        absolute.file_stem()
    } else {
        absolute.file_name()
    };
    let name = name
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "preview".to_string());

    parent.join(format!("{name}.pdf"))
}
