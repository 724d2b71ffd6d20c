// State management module
//
// This module provides the StateManager which wraps AppState with thread-safe access
// using Arc<RwLock<T>> and emits change events for GUI updates.

use crate::models::{AppState, CompilerSettings, JobState, JobStatus, SortKey, SourceFile};
use crate::services::compiler::CompileError;
use crate::services::listing::{ListingError, scan_directory};
use camino::Utf8PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// These events notify the GUI about state changes without requiring it to
/// poll the state.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// The working directory was set or changed
    DirectoryChanged { directory: Option<Utf8PathBuf> },

    /// The file list, its order, or the visible subset changed
    FileListChanged {
        visible: usize,
        total: usize,
        sort_key: SortKey,
    },

    /// A compile job moved from idle to running
    CompileStarted { source: String },

    /// A compile job moved from running back to idle
    CompileFinished { source: String, status: JobStatus },

    /// Compiler settings were replaced
    SettingsChanged,
}

/// Thread-safe state manager with event emission
///
/// This is the central state management component. It:
/// - Provides thread-safe access to [`AppState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Owns the idle/running compile state machine
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// # Related Types
///
/// - [`crate::models::AppState`]: The underlying state structure
/// - [`CompileGuard`]: Proof that a compile job is running
/// - [`crate::ui::controller::GuiController`]: Primary consumer of state events
pub struct StateManager {
    /// The application state protected by RwLock for thread-safe access
    state: Arc<RwLock<AppState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// The broadcast channel buffers 100 events.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(AppState::default())),
            state_tx,
        }
    }

    fn read_lock(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_lock(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a cloned snapshot of the current state
    pub fn snapshot(&self) -> AppState {
        self.read_lock().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_compiling());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&AppState) -> R,
    {
        let state = self.read_lock();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Applies `update_fn` under the write lock, diffs old against new, and
    /// broadcasts one event per detected change.
    ///
    /// # Returns
    /// The StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut AppState),
    {
        self.update_with(update_fn).1
    }

    /// Like [`update`](Self::update), but also returns the closure's result
    pub fn update_with<F, R>(&self, update_fn: F) -> (R, Vec<StateChange>)
    where
        F: FnOnce(&mut AppState) -> R,
    {
        let mut state = self.write_lock();
        let old_state = state.clone();

        let result = update_fn(&mut state);

        let changes = Self::detect_changes(&old_state, &state);
        drop(state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        (result, changes)
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Work out which events an update produced
    fn detect_changes(old: &AppState, new: &AppState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.working_directory != new.working_directory {
            changes.push(StateChange::DirectoryChanged {
                directory: new.working_directory.clone(),
            });
        }

        if old.settings != new.settings {
            changes.push(StateChange::SettingsChanged);
        }

        if old.files != new.files || old.visible != new.visible || old.sort_key != new.sort_key {
            changes.push(StateChange::FileListChanged {
                visible: new.visible_file_count(),
                total: new.files.len(),
                sort_key: new.sort_key,
            });
        }

        match (&old.job, &new.job) {
            (JobState::Idle, JobState::Running { source }) => {
                changes.push(StateChange::CompileStarted {
                    source: source.clone(),
                });
            }
            (JobState::Running { source }, JobState::Idle) => {
                changes.push(StateChange::CompileFinished {
                    source: source.clone(),
                    status: new.last_status.clone().unwrap_or(JobStatus::Errored {
                        message: "Job finished without a status".to_string(),
                    }),
                });
            }
            _ => {}
        }

        changes
    }

    // Convenience methods for common state updates

    /// Load settings and the saved working directory at startup
    pub fn load_from_settings(
        &self,
        settings: &CompilerSettings,
        directory: Option<Utf8PathBuf>,
    ) -> Vec<StateChange> {
        self.update(|state| {
            state.settings = settings.clone();
            state.sort_key = settings.default_sort;
            state.working_directory = directory;

            tracing::info!(
                "Loaded settings: compiler={}, source=.{}, artifact=.{}, sort={}, directory={:?}",
                settings.compiler_executable,
                settings.source_extension,
                settings.artifact_extension,
                settings.default_sort,
                state.working_directory
            );
        })
    }

    /// Replace the compiler settings
    pub fn set_settings(&self, settings: CompilerSettings) -> Vec<StateChange> {
        self.update(|state| {
            state.settings = settings;
        })
    }

    /// Switch to a new working directory.
    ///
    /// The file list is cleared; call [`refresh_files`](Self::refresh_files)
    /// afterwards to list the new directory.
    pub fn set_working_directory(&self, directory: Utf8PathBuf) -> Vec<StateChange> {
        self.update(|state| {
            state.working_directory = Some(directory);
            state.files.clear();
            state.recompute_visible();
        })
    }

    /// Re-read the working directory and apply the current sort and search.
    ///
    /// The directory is scanned outside the lock.
    ///
    /// # Returns
    /// The number of source files found
    pub fn refresh_files(&self) -> Result<usize, ListingError> {
        let (directory, extension) = self.read(|s| {
            (
                s.working_directory.clone(),
                s.settings.source_extension.clone(),
            )
        });

        let files = match directory {
            Some(dir) => scan_directory(&dir, &extension)?,
            None => Vec::new(),
        };

        Ok(self.set_files(files))
    }

    /// Replace the file list, then sort and filter it
    pub fn set_files(&self, files: Vec<SourceFile>) -> usize {
        let (count, _) = self.update_with(|state| {
            state.files = files;
            state.apply_sort();
            state.files.len()
        });
        count
    }

    /// Sort the list by a new key
    pub fn set_sort_key(&self, key: SortKey) -> Vec<StateChange> {
        self.update(|state| {
            state.sort_key = key;
            state.apply_sort();
        })
    }

    /// Filter the list by a new search term
    pub fn set_search_term(&self, term: impl Into<String>) -> Vec<StateChange> {
        let term = term.into();
        self.update(|state| {
            state.search_term = term;
            state.recompute_visible();
        })
    }

    /// Resolve a list row and its shown label to a file. See
    /// [`AppState::selected_file`].
    pub fn selected_file(&self, index: i32, label: &str) -> Option<SourceFile> {
        self.read(|s| s.selected_file(index, label).cloned())
    }

    pub fn is_compiling(&self) -> bool {
        self.read(|s| s.is_compiling())
    }

    /// Move the job state machine from idle to running.
    ///
    /// The check and the transition happen under one write lock. If a job is
    /// already running, nothing changes and `CompileError::Busy` is returned.
    /// The running job's output and status are left alone.
    ///
    /// The returned guard must be [`finish`](CompileGuard::finish)ed. If it is
    /// dropped instead, the job is recorded as errored and the state returns
    /// to idle, so the compile control can never stay disabled.
    pub fn try_begin_compile(&self, source: &str) -> Result<CompileGuard, CompileError> {
        let (result, _) = self.update_with(|state| match &state.job {
            JobState::Running { source: active } => Err(CompileError::Busy(active.clone())),
            JobState::Idle => {
                state.job = JobState::Running {
                    source: source.to_string(),
                };
                Ok(())
            }
        });

        match result {
            Ok(()) => {
                tracing::info!("Compile job started for {}", source);
                Ok(CompileGuard {
                    manager: self.clone(),
                    source: source.to_string(),
                    finished: false,
                })
            }
            Err(e) => {
                tracing::warn!("Rejected compile of {}: {}", source, e);
                Err(e)
            }
        }
    }

    fn finish_compile(&self, source: &str, status: JobStatus) -> Vec<StateChange> {
        tracing::info!("Compile job for {} finished: {}", source, status.as_str());
        self.update(|state| {
            state.job = JobState::Idle;
            state.last_source = Some(source.to_string());
            state.last_status = Some(status);
        })
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across threads
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

/// Held for the duration of one compile job
#[must_use = "dropping the guard immediately ends the compile job"]
pub struct CompileGuard {
    manager: StateManager,
    source: String,
    finished: bool,
}

impl CompileGuard {
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Record the final status and return the state machine to idle
    pub fn finish(mut self, status: JobStatus) -> Vec<StateChange> {
        self.finished = true;
        self.manager.finish_compile(&self.source, status)
    }
}

impl Drop for CompileGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::error!("Compile job for {} ended without a status", self.source);
            self.manager.finish_compile(
                &self.source,
                JobStatus::Errored {
                    message: "Compile job ended unexpectedly".to_string(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureReason, FileListEntry};
    use std::time::{Duration, SystemTime};

    fn file(name: &str, modified_secs: u64, size: u64) -> SourceFile {
        SourceFile {
            name: name.to_string(),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(modified_secs),
            size,
        }
    }

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_compiling());
        assert!(state.working_directory.is_none());
        assert!(state.files.is_empty());
    }

    #[test]
    fn test_set_working_directory_emits_event() {
        let manager = StateManager::new();
        let changes = manager.set_working_directory(Utf8PathBuf::from("/scripts"));

        assert_eq!(
            changes,
            vec![StateChange::DirectoryChanged {
                directory: Some(Utf8PathBuf::from("/scripts"))
            }]
        );
    }

    #[test]
    fn test_set_files_sorts_by_current_key() {
        let manager = StateManager::new();
        manager.set_files(vec![file("old.sp", 1, 10), file("new.sp", 5, 1)]);

        let names: Vec<String> =
            manager.read(|s| s.files.iter().map(|f| f.name.clone()).collect());
        assert_eq!(names, vec!["new.sp", "old.sp"]);
    }

    #[test]
    fn test_sort_key_change_detection() {
        let manager = StateManager::new();
        manager.set_files(vec![file("b.sp", 1, 10), file("a.sp", 5, 1)]);

        let changes = manager.set_sort_key(SortKey::Size);
        assert!(matches!(
            changes[0],
            StateChange::FileListChanged {
                visible: 2,
                total: 2,
                sort_key: SortKey::Size
            }
        ));

        // Re-applying the same key changes nothing
        let changes = manager.set_sort_key(SortKey::Size);
        assert!(changes.is_empty());
    }

    #[test]
    fn test_search_term_filters_visible() {
        let manager = StateManager::new();
        manager.set_files(vec![file("admin.sp", 1, 1), file("votes.sp", 2, 1)]);

        let changes = manager.set_search_term("ADM");
        assert!(matches!(
            changes[0],
            StateChange::FileListChanged { visible: 1, total: 2, .. }
        ));

        manager.set_search_term("zzz");
        let visible = manager.read(|s| s.visible.clone());
        assert_eq!(visible, vec![FileListEntry::NoResults]);
        assert!(manager.selected_file(0, "No results found").is_none());
    }

    #[test]
    fn test_compile_lifecycle() {
        let manager = StateManager::new();

        let guard = manager.try_begin_compile("admin.sp").unwrap();
        assert!(manager.is_compiling());
        assert_eq!(guard.source(), "admin.sp");

        let changes = guard.finish(JobStatus::Succeeded);
        assert_eq!(
            changes,
            vec![StateChange::CompileFinished {
                source: "admin.sp".to_string(),
                status: JobStatus::Succeeded
            }]
        );

        let state = manager.snapshot();
        assert!(!state.is_compiling());
        assert_eq!(state.last_status, Some(JobStatus::Succeeded));
        assert_eq!(state.last_source.as_deref(), Some("admin.sp"));
    }

    #[test]
    fn test_busy_rejection_leaves_running_job_alone() {
        let manager = StateManager::new();
        let guard = manager.try_begin_compile("first.sp").unwrap();
        let mut rx = manager.subscribe();

        let second = manager.try_begin_compile("second.sp");
        assert!(matches!(second, Err(CompileError::Busy(ref s)) if s == "first.sp"));

        // No events, same running source
        assert!(rx.try_recv().is_err());
        assert_eq!(
            manager.read(|s| s.job.clone()),
            JobState::Running {
                source: "first.sp".to_string()
            }
        );

        let failed = JobStatus::Failed {
            exit_code: 1,
            reason: FailureReason::NonZeroExit,
        };
        guard.finish(failed.clone());
        assert_eq!(manager.read(|s| s.last_status.clone()), Some(failed));
        assert_eq!(manager.read(|s| s.last_source.clone()).as_deref(), Some("first.sp"));
    }

    #[test]
    fn test_dropped_guard_returns_to_idle() {
        let manager = StateManager::new();
        {
            let _guard = manager.try_begin_compile("admin.sp").unwrap();
        }

        let state = manager.snapshot();
        assert!(!state.is_compiling());
        assert!(matches!(state.last_status, Some(JobStatus::Errored { .. })));

        // And a new job can start
        assert!(manager.try_begin_compile("admin.sp").is_ok());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        let _guard = manager.try_begin_compile("admin.sp").unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(
            event,
            StateChange::CompileStarted {
                source: "admin.sp".to_string()
            }
        );
    }

    #[test]
    fn test_finished_event_carries_status() {
        let manager = StateManager::new();
        let guard = manager.try_begin_compile("admin.sp").unwrap();
        let mut rx = manager.subscribe();

        guard.finish(JobStatus::Errored {
            message: "spawn failed".to_string(),
        });

        let event = tokio_test::block_on(rx.recv()).unwrap();
        assert_eq!(
            event,
            StateChange::CompileFinished {
                source: "admin.sp".to_string(),
                status: JobStatus::Errored {
                    message: "spawn failed".to_string()
                }
            }
        );
    }

    #[test]
    fn test_settings_change_detection() {
        let manager = StateManager::new();
        let settings = CompilerSettings {
            compiler_executable: "spcomp".to_string(),
            ..CompilerSettings::default()
        };

        let changes = manager.set_settings(settings);
        assert_eq!(changes, vec![StateChange::SettingsChanged]);
    }

    #[test]
    fn test_load_from_settings_applies_default_sort() {
        let manager = StateManager::new();
        let settings = CompilerSettings {
            default_sort: SortKey::Name,
            ..CompilerSettings::default()
        };

        manager.load_from_settings(&settings, Some(Utf8PathBuf::from("/scripts")));

        let state = manager.snapshot();
        assert_eq!(state.sort_key, SortKey::Name);
        assert_eq!(state.working_directory, Some(Utf8PathBuf::from("/scripts")));
    }

    #[test]
    fn test_refresh_without_directory_is_empty() {
        let manager = StateManager::new();
        assert_eq!(manager.refresh_files().unwrap(), 0);
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.set_search_term("admin");

        assert_eq!(manager2.read(|s| s.search_term.clone()), "admin");
    }
}
