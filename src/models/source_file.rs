use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Label shown in place of the file list when a search matches nothing
pub const NO_RESULTS_LABEL: &str = "No results found";

/// A source file found in the working directory.
///
/// Entries are ephemeral: they are rebuilt from the filesystem on every
/// refresh and carry no identity beyond the file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub modified: SystemTime,
    pub size: u64,
}

/// Keys the file list can be sorted by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Case-insensitive, ascending
    Name,
    /// Newest first
    #[default]
    Date,
    /// Largest first
    Size,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortKey::Name => write!(f, "name"),
            SortKey::Date => write!(f, "date"),
            SortKey::Size => write!(f, "size"),
        }
    }
}

/// One row of the displayed file list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileListEntry {
    File(SourceFile),
    /// Sentinel row for an empty search result. Never selectable.
    NoResults,
}

impl FileListEntry {
    /// Text shown for this row
    pub fn label(&self) -> &str {
        match self {
            FileListEntry::File(file) => &file.name,
            FileListEntry::NoResults => NO_RESULTS_LABEL,
        }
    }

    /// The underlying file, or `None` for the sentinel
    pub fn as_file(&self) -> Option<&SourceFile> {
        match self {
            FileListEntry::File(file) => Some(file),
            FileListEntry::NoResults => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_not_a_file() {
        let entry = FileListEntry::NoResults;
        assert!(entry.as_file().is_none());
        assert_eq!(entry.label(), NO_RESULTS_LABEL);
    }

    #[test]
    fn test_sort_key_round_trips_lowercase() {
        assert_eq!(serde_yaml_ng::to_string(&SortKey::Name).unwrap().trim(), "name");
        let key: SortKey = serde_yaml_ng::from_str("date").unwrap();
        assert_eq!(key, SortKey::Date);
    }
}
