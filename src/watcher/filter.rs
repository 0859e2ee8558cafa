//! Maps raw event paths onto the files being watched.
//!
//! Besides the watched files themselves, editors touch companion files in the
//! same directory while saving: Office lock files (`~$report.xlsx`),
//! LibreOffice lock files (`.~lock.report.xlsx#`) and temp copies whose name
//! embeds the original one. Events on those count as changes to the target.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// A watched file an event refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetMatch {
    pub target: PathBuf,
    /// The event path is an editor companion file, not the target itself.
    pub lock_file: bool,
}

/// Watched files indexed by their parent directory.
#[derive(Debug, Default, Clone)]
pub struct WatchedPaths {
    files: HashSet<PathBuf>,
    by_dir: HashMap<PathBuf, Vec<PathBuf>>,
}

impl WatchedPaths {
    pub fn new(files: impl IntoIterator<Item = PathBuf>) -> Self {
        let mut watched = Self::default();
        for file in files {
            if !watched.files.insert(file.clone()) {
                continue;
            }
            let dir = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            watched.by_dir.entry(dir).or_default().push(file);
        }
        watched
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains(path)
    }

    /// Watched files an event at `path` concerns; empty when uninteresting.
    pub fn targets_for(&self, path: &Path) -> Vec<TargetMatch> {
        if self.files.contains(path) {
            return vec![TargetMatch {
                target: path.to_path_buf(),
                lock_file: false,
            }];
        }

        let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
            return Vec::new();
        };
        let name = name.to_string_lossy();

        self.by_dir
            .get(dir)
            .into_iter()
            .flatten()
            .filter(|target| is_lock_file_for(&name, target))
            .map(|target| TargetMatch {
                target: target.clone(),
                lock_file: true,
            })
            .collect()
    }
}

/// Whether a file named `candidate` in the target's directory is an editor
/// companion of `target`.
pub fn is_lock_file_for(candidate: &str, target: &Path) -> bool {
    let Some(base) = target.file_name() else {
        return false;
    };
    candidate.starts_with("~$")
        || candidate.starts_with(".~")
        || candidate.contains(base.to_string_lossy().as_ref())
}

/// Event path with its directory resolved the way watched files are, so
/// symlinked temp dirs (`/var` vs `/private/var`) still compare equal.
/// Works for paths that no longer exist.
pub fn normalize_event_path(path: &Path) -> PathBuf {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => parent
            .canonicalize()
            .map(|parent| parent.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
