//! Common utilities shared across modules.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Months, Utc};

/// Get current UTC timestamp in seconds since UNIX_EPOCH.
pub fn get_utc_timestamp() -> u64 {
    Utc::now().timestamp() as u64
}

/// Absolute, symlink-resolved form of `path`.
///
/// Falls back to the lexically absolute path when the file does not exist
/// (yet), so identities stay stable for paths that come and go.
pub fn canonical_path(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Modification time of `path`, `None` when the file is missing or the
/// platform does not report one.
pub fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// `now` shifted by whole calendar months, saturating at the far future.
pub fn months_from(now: DateTime<Utc>, months: u32) -> DateTime<Utc> {
    now.checked_add_months(Months::new(months))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Writes `bytes` to a `.tmp` sibling of `path`, then renames it into place.
///
/// Parent directories are created. The temporary file is removed when any
/// step fails, so `path` is either the old content or the complete new one.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".livepdf-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Lowest directory containing every path's parent.
///
/// Returns `None` for an empty slice or paths without a shared root
/// (different drives on Windows).
pub fn common_parent(paths: &[PathBuf]) -> Option<PathBuf> {
    let mut parents = paths.iter().map(|p| match p.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    });

    let mut common = parents.next()?;
    for parent in parents {
        while !parent.starts_with(&common) {
            common = common.parent()?.to_path_buf();
        }
    }
    Some(common)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_utc_timestamp() {
        let ts = get_utc_timestamp();
        assert!(ts > 1577836800, "Timestamp should be after 2020-01-01");
    }

    #[test]
    fn test_common_parent_same_dir() {
        let paths = vec![PathBuf::from("/a/b/x.xlsx"), PathBuf::from("/a/b/y.docx")];
        assert_eq!(common_parent(&paths), Some(PathBuf::from("/a/b")));
    }

    #[test]
    fn test_common_parent_nested() {
        let paths = vec![
            PathBuf::from("/a/b/x.xlsx"),
            PathBuf::from("/a/c/d/y.docx"),
            PathBuf::from("/a/b/e/z.doc"),
        ];
        assert_eq!(common_parent(&paths), Some(PathBuf::from("/a")));
    }

    #[test]
    fn test_common_parent_relative_root() {
        let paths = vec![PathBuf::from("report.xlsx")];
        assert_eq!(common_parent(&paths), Some(PathBuf::from(".")));
        assert_eq!(common_parent(&[]), None);
    }

    #[test]
    fn test_write_atomically_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("record.json");

        write_atomically(&path, b"first").unwrap();
        write_atomically(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        let leftovers = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter(|e| {
                e.as_ref()
                    .map(|e| e.path().extension().is_some_and(|x| x == "tmp"))
                    .unwrap_or(false)
            })
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_months_from_calendar_month() {
        let start = DateTime::parse_from_rfc3339("2026-01-31T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let expiry = months_from(start, 1);
        // chrono clamps to the last day of the shorter month
        assert_eq!(expiry.to_rfc3339(), "2026-02-28T10:00:00+00:00");
    }
}
