// ── Local filesystem helpers ─────────────────────────────────────────────────

use crate::error::{CoreError, CoreResult};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Create `path` and all missing parents. No-op when it already exists.
pub fn ensure_dir(path: impl AsRef<Path>) -> CoreResult<()> {
    let path = path.as_ref();
    if path.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(path).map_err(|e| CoreError::io(path, e))
}

/// Walk `root` depth-first and return every file and directory below it.
///
/// Within each directory, files come before sub-directories and both groups
/// are sorted by name; a directory always precedes its own contents. The
/// root itself is not included. Symbolic links are never followed: links to
/// files are listed like files, links to directories and dangling links are
/// skipped.
pub fn scan_dir_recursively(root: impl AsRef<Path>) -> CoreResult<Vec<PathBuf>> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(CoreError::MissingDirectory(root.to_path_buf()));
    }

    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by(|a, b| {
            a.file_type()
                .is_dir()
                .cmp(&b.file_type().is_dir())
                .then_with(|| a.file_name().cmp(b.file_name()))
        });

    let mut out = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            CoreError::io(path, e.into())
        })?;
        if entry.path_is_symlink() && !entry.path().is_file() {
            log::debug!("Skipping link {}", entry.path().display());
            continue;
        }
        out.push(entry.into_path());
    }
    Ok(out)
}
