//! Data models for the Pawn Compiler application.
//!
//! - [`AppState`]: the central state container (directory, file list, job state)
//! - [`CompilerSettings`]: compiler and editor settings loaded from `settings.yaml`
//! - [`SourceFile`], [`SortKey`], [`FileListEntry`]: the file list and its display rows
//! - [`CompileJob`], [`CompileReport`], [`JobStatus`], [`OutputLine`]: one compiler run
//!   and what came out of it
//!
//! `AppState` is never shared directly. It lives behind
//! [`StateManager`](crate::state::StateManager), which emits change events.

pub mod app_state;
pub mod config;
pub mod job;
pub mod source_file;

pub use app_state::{AppState, JobState};
pub use config::CompilerSettings;
pub use job::{CompileJob, CompileReport, FailureReason, JobStatus, LineLevel, OutputLine};
pub use source_file::{FileListEntry, NO_RESULTS_LABEL, SortKey, SourceFile};
