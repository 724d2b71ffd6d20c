//! Services module: the application's business logic, kept free of UI code.
//!
//! # Components
//!
//! - [`listing`]: scans the working directory for source files, sorts them by
//!   name, date or size, and filters them by a search term.
//! - [`compiler`]: [`CompilerService`] runs the external compiler for one job.
//!   It prepares paths, backs up the previous artifact, streams classified
//!   output and decides the final [`JobStatus`](crate::models::JobStatus).
//! - [`classify`]: [`OutputClassifier`] is an ordered list of regex rules
//!   that tags each output line as error, warning or info.
//! - [`editor`]: the [`EditorLauncher`] seam for handing files and folders
//!   to external programs.
//!
//! None of these depend on Slint. Subprocess work is async on tokio and
//! everything else is synchronous file IO.

pub mod classify;
pub mod compiler;
pub mod editor;
pub mod listing;

pub use classify::{ClassificationRule, OutputClassifier};
pub use compiler::{CompileError, CompilerService, backup_path_for, evaluate_outcome};
pub use editor::{CommandEditorLauncher, EditorError, EditorLauncher, open_in_editor};
pub use listing::{ListingError, filter_files, scan_directory, sort_files};
