//! Directory listing, sorting and search for source files.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use thiserror::Error;

use crate::models::config::has_extension;
use crate::models::{FileListEntry, SortKey, SourceFile};

/// Errors that can occur while listing the working directory
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(Utf8PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// List regular files in `dir` whose extension matches `extension`.
///
/// The match ignores ASCII case. Entries whose metadata cannot be read, or
/// whose names are not valid UTF-8, are skipped with a warning. The result is
/// in filesystem enumeration order.
pub fn scan_directory(dir: &Utf8Path, extension: &str) -> Result<Vec<SourceFile>, ListingError> {
    if !dir.is_dir() {
        return Err(ListingError::DirectoryNotFound(dir.to_path_buf()));
    }

    let read_dir = fs::read_dir(dir).map_err(|source| ListingError::ReadDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();

    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Skipping unreadable entry in {}: {}", dir, e);
                continue;
            }
        };

        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                tracing::warn!("Skipping non UTF-8 file name: {:?}", raw);
                continue;
            }
        };

        if !has_extension(&name, extension) {
            continue;
        }

        // Follows symlinks, unlike DirEntry::metadata
        let metadata = match fs::metadata(entry.path()) {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!("Skipping {}: failed to read metadata: {}", name, e);
                continue;
            }
        };

        if !metadata.is_file() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!("Skipping {}: no modification time: {}", name, e);
                continue;
            }
        };

        files.push(SourceFile {
            name,
            modified,
            size: metadata.len(),
        });
    }

    tracing::debug!("Found {} .{} files in {}", files.len(), extension, dir);
    Ok(files)
}

/// Sort files in place by `key`.
///
/// The sort is stable, so ties keep their previous (enumeration) order and
/// re-applying the same key is a no-op.
pub fn sort_files(files: &mut [SourceFile], key: SortKey) {
    match key {
        SortKey::Name => files.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        SortKey::Date => files.sort_by(|a, b| b.modified.cmp(&a.modified)),
        SortKey::Size => files.sort_by(|a, b| b.size.cmp(&a.size)),
    }
}

/// Build the displayed rows for a search term.
///
/// Matching is a case-insensitive substring test on the file name. An empty
/// term shows everything. A non-empty term with no matches yields the single
/// [`FileListEntry::NoResults`] sentinel.
pub fn filter_files(files: &[SourceFile], term: &str) -> Vec<FileListEntry> {
    let needle = term.to_lowercase();

    let entries: Vec<FileListEntry> = files
        .iter()
        .filter(|f| f.name.to_lowercase().contains(&needle))
        .cloned()
        .map(FileListEntry::File)
        .collect();

    if entries.is_empty() && !term.is_empty() {
        vec![FileListEntry::NoResults]
    } else {
        entries
    }
}
