use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;

use crate::error::MigrateError;

/// Lists the files of `dir` in directory-listing order.
///
/// With `extension`, only files whose name ends with it (case-sensitive) are
/// kept. With `recursive`, subdirectories are descended depth-first where they
/// appear in the listing, and the same extension filter applies there.
/// Symlinked directories are not followed and non-UTF-8 names are skipped.
pub fn list_files(
    dir: &Path,
    extension: Option<&str>,
    recursive: bool,
) -> Result<Vec<Utf8PathBuf>, MigrateError> {
    if !dir.is_dir() {
        return Err(MigrateError::InputNotFound(dir.display().to_string()));
    }
    let mut files = Vec::new();
    collect_files(dir, extension, recursive, &mut files)?;
    Ok(files)
}

/// Same as [`list_files`] but accepting any of several extensions.
pub fn list_files_any(
    dir: &Path,
    extensions: &[&str],
    recursive: bool,
) -> Result<Vec<Utf8PathBuf>, MigrateError> {
    let all = list_files(dir, None, recursive)?;
    Ok(all
        .into_iter()
        .filter(|path| extensions.iter().any(|ext| path.as_str().ends_with(ext)))
        .collect())
}

fn collect_files(
    dir: &Path,
    extension: Option<&str>,
    recursive: bool,
    files: &mut Vec<Utf8PathBuf>,
) -> Result<(), MigrateError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| MigrateError::Filesystem(format!("read dir {}: {err}", dir.display())))?;
    for entry in entries {
        let entry = entry.map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let file_type = entry
            .file_type()
            .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        let path = entry.path();
        if file_type.is_dir() {
            if recursive {
                collect_files(&path, extension, recursive, files)?;
            }
            continue;
        }
        // symlinked directories are never descended
        if file_type.is_symlink() && path.is_dir() {
            tracing::debug!(path = %path.display(), "skipping symlinked directory");
            continue;
        }
        let path = match Utf8PathBuf::from_path_buf(path) {
            Ok(path) => path,
            Err(path) => {
                tracing::warn!(path = %path.display(), "skipping non-utf8 file name");
                continue;
            }
        };
        let matches = extension
            .map(|ext| path.file_name().is_some_and(|name| name.ends_with(ext)))
            .unwrap_or(true);
        if matches {
            files.push(path);
        }
    }
    Ok(())
}
