use camino::Utf8PathBuf;

use super::config::CompilerSettings;
use super::job::JobStatus;
use super::source_file::{FileListEntry, SortKey, SourceFile};
use crate::services::listing::{filter_files, sort_files};

/// Compile worker state machine.
///
/// Transitions are `Idle -> Running -> Idle` only. Moving to `Running` goes
/// through [`StateManager::try_begin_compile`](crate::state::StateManager::try_begin_compile),
/// which rejects the request while another job is active.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running {
        source: String,
    },
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }
}

/// Single source of truth for all application state.
///
/// Wrapped in `Arc<RwLock<AppState>>` by [`crate::state::StateManager`].
/// Mutate it only through the manager so change events are emitted.
#[derive(Clone, Debug, Default)]
pub struct AppState {
    // Configuration
    pub working_directory: Option<Utf8PathBuf>,
    pub settings: CompilerSettings,

    // File list
    pub files: Vec<SourceFile>,
    pub sort_key: SortKey,
    pub search_term: String,
    pub visible: Vec<FileListEntry>,

    // Compile job
    pub job: JobState,
    pub last_status: Option<JobStatus>,
    pub last_source: Option<String>,
}

impl AppState {
    pub fn is_compiling(&self) -> bool {
        self.job.is_running()
    }

    /// Sort `files` by the current key and rebuild the visible rows
    pub fn apply_sort(&mut self) {
        sort_files(&mut self.files, self.sort_key);
        self.recompute_visible();
    }

    /// Rebuild the visible rows from `files` and the search term
    pub fn recompute_visible(&mut self) {
        self.visible = filter_files(&self.files, &self.search_term);
    }

    /// Resolve a row index from the list view to a file.
    ///
    /// `label` is the row text the user saw. If the visible rows have changed
    /// since, the index may point at another file, so a label mismatch
    /// resolves to `None`. So do the "no results" sentinel and out-of-range
    /// (or negative, from the UI's `-1`) indices.
    pub fn selected_file(&self, index: i32, label: &str) -> Option<&SourceFile> {
        let index = usize::try_from(index).ok()?;
        self.visible
            .get(index)?
            .as_file()
            .filter(|file| file.name == label)
    }

    /// Directory compiled artifacts are written to
    pub fn compiled_directory(&self) -> Option<Utf8PathBuf> {
        self.working_directory
            .as_ref()
            .map(|dir| dir.join(&self.settings.compiled_subdir))
    }

    /// Number of real files shown (the sentinel is not counted)
    pub fn visible_file_count(&self) -> usize {
        self.visible.iter().filter(|e| e.as_file().is_some()).count()
    }
}
