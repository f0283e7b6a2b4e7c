use crate::errors::ReplayError;
use std::fs;
use std::path::{Path, PathBuf};

/// Whether `path` is one of the run log's own files: the active log or a
/// sibling named `<stem>.<suffix>.<ext>` / `<stem>-<suffix>.<ext>`.
pub fn belongs_to_log(active: &Path, path: &Path) -> bool {
    if path == active {
        return true;
    }
    let (Some(stem), Some(name)) = (
        active.file_stem().and_then(|s| s.to_str()),
        path.file_name().and_then(|s| s.to_str()),
    ) else {
        return false;
    };
    if path.extension() != active.extension() {
        return false;
    }
    let Some(rest) = name.strip_prefix(stem) else {
        return false;
    };
    rest.starts_with('.') || rest.starts_with('-')
}

/// Deletes the oldest files of the run log in `dir` until they fit in
/// `budget_bytes`. Other files in `dir` are neither counted nor touched,
/// and the log currently being written is never removed.
pub fn enforce_total_budget(
    dir: &Path,
    active: &Path,
    budget_bytes: u64,
) -> Result<Vec<PathBuf>, ReplayError> {
    let mut files = fs::read_dir(dir)
        .map_err(|e| ReplayError::Io(e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && belongs_to_log(active, path))
        .collect::<Vec<_>>();

    files.sort_by(|a, b| {
        let ma = fs::metadata(a).ok().and_then(|m| m.modified().ok());
        let mb = fs::metadata(b).ok().and_then(|m| m.modified().ok());
        ma.cmp(&mb)
    });

    let mut total = files
        .iter()
        .filter_map(|path| fs::metadata(path).ok().map(|meta| meta.len()))
        .sum::<u64>();

    let mut deleted = Vec::new();
    for path in files {
        if total <= budget_bytes {
            break;
        }
        if path == active {
            continue;
        }
        let len = fs::metadata(&path)
            .map_err(|e| ReplayError::Io(e.to_string()))?
            .len();
        fs::remove_file(&path).map_err(|e| ReplayError::Io(e.to_string()))?;
        total = total.saturating_sub(len);
        deleted.push(path);
    }

    Ok(deleted)
}
