// GUI Controller - Bridges Slint UI with Rust State Management
//
// This module contains the GuiController which coordinates between:
// - Slint UI (MainWindow)
// - StateManager (application state and the idle/running job machine)
// - CompilerService and EditorLauncher (business logic)
// - EventLoopBridge (async/GUI coordination)
//
// It handles:
// - Setting up UI callbacks → state updates and async compile jobs
// - Subscribing to state changes → UI updates
// - The folder picker and dialogs

use crate::config::ConfigManager;
use crate::models::{
    AppState, CompileJob, FileListEntry, JobState, JobStatus, LineLevel, OutputLine, SortKey,
};
use crate::services::compiler::{CompileError, CompilerService};
use crate::services::editor::{EditorLauncher, open_in_editor};
use crate::state::{CompileGuard, StateChange, StateManager};
use crate::ui::bridge::{EventLoopBridge, EventLoopBridgeHandle};
use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use slint::{Model, ModelRc, SharedString, StandardListViewItem, VecModel};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

// Include the generated Slint code
slint::include_modules!();

/// Capacity of the channel between the compiler and the console forwarder
const CONSOLE_LINE_BUFFER: usize = 256;

/// Everything the callbacks need, cloned into each closure
#[derive(Clone)]
struct Services {
    state: Arc<StateManager>,
    config: Arc<ConfigManager>,
    compiler: Arc<CompilerService>,
    editor: Arc<dyn EditorLauncher>,
}

/// GUI Controller that wires up the Slint UI with application state and logic
///
/// This is the main coordinator for the GUI layer. It:
/// - Creates and manages the EventLoopBridge for tokio/Slint coordination
/// - Sets up Slint callbacks for search, sort, compile and editor actions
/// - Subscribes to StateManager events and updates UI accordingly
/// - Handles the working directory picker using the `rfd` crate
///
/// # Example
/// ```ignore
/// let controller = GuiController::new(
///     state_manager,
///     config_manager,
///     compiler,
///     editor,
///     runtime.handle().clone(),
/// )?;
/// controller.run()?;  // Blocks until window is closed
/// ```
pub struct GuiController {
    /// The Slint UI window
    ui: MainWindow,

    /// Event loop bridge for coordinating between tokio and Slint
    _bridge: EventLoopBridge<MainWindow>,
}

impl GuiController {
    /// Create a new GUI controller
    ///
    /// # Arguments
    /// * `state_manager` - Shared application state manager
    /// * `config_manager` - Persists the working directory
    /// * `compiler` - Runs compile jobs
    /// * `editor` - Opens files and the output folder
    /// * `tokio_handle` - Handle to the tokio runtime for spawning async tasks
    pub fn new(
        state_manager: Arc<StateManager>,
        config_manager: Arc<ConfigManager>,
        compiler: Arc<CompilerService>,
        editor: Arc<dyn EditorLauncher>,
        tokio_handle: tokio::runtime::Handle,
    ) -> Result<Self> {
        let ui = MainWindow::new().context("Failed to create Slint UI")?;

        let bridge = EventLoopBridge::new(&ui, tokio_handle);

        let services = Services {
            state: state_manager,
            config: config_manager,
            compiler,
            editor,
        };

        Self::sync_ui_with_state(&ui, &services.state);
        Self::setup_callbacks(&ui, &bridge, &services);
        Self::setup_state_subscription(&bridge, &services.state);

        tracing::info!("GUI controller initialized");

        Ok(Self {
            ui,
            _bridge: bridge,
        })
    }

    /// Run the GUI (blocks until window is closed)
    pub fn run(self) -> Result<(), slint::PlatformError> {
        tracing::info!("Starting GUI event loop");
        self.ui.run()
    }

    /// Synchronize UI with current state
    ///
    /// Called once at startup. Also installs the console model that
    /// [`append_console_line`] pushes into.
    fn sync_ui_with_state(ui: &MainWindow, state_manager: &StateManager) {
        let snapshot = state_manager.read(UiSnapshot::from_state);
        snapshot.apply(ui);

        ui.set_console_lines(ModelRc::new(VecModel::<ConsoleLine>::default()));
        ui.set_selected_index(-1);

        tracing::debug!("UI synchronized with initial state");
    }

    /// Set up Slint UI callbacks
    fn setup_callbacks(
        ui: &MainWindow,
        bridge: &EventLoopBridge<MainWindow>,
        services: &Services,
    ) {
        let state = Arc::clone(&services.state);
        ui.on_search_edited(move |text| {
            tracing::trace!("Search edited: {}", text);
            state.set_search_term(text.as_str());
        });

        let state = Arc::clone(&services.state);
        ui.on_sort_by_name(move || {
            tracing::debug!("Sort by name clicked");
            state.set_sort_key(SortKey::Name);
        });

        let state = Arc::clone(&services.state);
        ui.on_sort_by_date(move || {
            tracing::debug!("Sort by date clicked");
            state.set_sort_key(SortKey::Date);
        });

        let state = Arc::clone(&services.state);
        ui.on_sort_by_size(move || {
            tracing::debug!("Sort by size clicked");
            state.set_sort_key(SortKey::Size);
        });

        let ctx = services.clone();
        let bridge_handle = bridge.clone_handle();
        let ui_weak = ui.as_weak();
        ui.on_compile_selected(move |index, label| {
            tracing::info!("Compile clicked (row {}: {})", index, label);
            if let Some(ui) = ui_weak.upgrade() {
                Self::start_compile(&ui, &ctx, &bridge_handle, index, &label);
            }
        });

        let ctx = services.clone();
        let ui_weak = ui.as_weak();
        ui.on_open_in_editor(move |index, label| {
            tracing::debug!("Open in editor clicked (row {}: {})", index, label);
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };

            let Some(file) = ctx.state.selected_file(index, &label) else {
                show_message_dialog(&ui, "No Selection", CompileError::NoSelection.to_string(), true);
                return;
            };
            let Some(dir) = ctx.state.read(|s| s.working_directory.clone()) else {
                show_error_dialog(&ui, "Editor Error", CompileError::NoWorkingDirectory.to_string(), "");
                return;
            };

            if let Err(message) = open_in_editor(ctx.editor.as_ref(), &dir.join(&file.name)) {
                show_error_dialog(&ui, "Editor Error", message, "");
            }
        });

        let ctx = services.clone();
        let ui_weak = ui.as_weak();
        ui.on_change_directory(move || {
            tracing::debug!("Change directory clicked");
            let Some(ui) = ui_weak.upgrade() else {
                return;
            };

            let start_dir = ctx.state.read(|s| s.working_directory.clone());
            let Some(dir) = show_folder_picker("Select Script Directory", start_dir) else {
                tracing::debug!("Folder picker cancelled");
                return;
            };

            tracing::info!("Working directory selected: {}", dir);
            if let Err(e) = ctx.config.save_directory(&dir) {
                tracing::error!("Failed to save working directory: {:#}", e);
                show_error_dialog(
                    &ui,
                    "Configuration Error",
                    "The directory was selected but could not be saved.",
                    format!("{:#}", e),
                );
            }

            ctx.state.set_working_directory(dir);
            Self::refresh_listing(&ui, &ctx.state);
        });

        let state = Arc::clone(&services.state);
        let ui_weak = ui.as_weak();
        ui.on_refresh_files(move || {
            tracing::debug!("Refresh clicked");
            if let Some(ui) = ui_weak.upgrade() {
                Self::refresh_listing(&ui, &state);
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_clear_console(move || {
            if let Some(ui) = ui_weak.upgrade() {
                clear_console(&ui);
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_error_dialog_dismissed(move || {
            tracing::debug!("Error dialog dismissed");
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_error_dialog(false);
            }
        });

        let ui_weak = ui.as_weak();
        ui.on_message_dialog_dismissed(move || {
            tracing::debug!("Message dialog dismissed");
            if let Some(ui) = ui_weak.upgrade() {
                ui.set_show_message_dialog(false);
            }
        });

        tracing::debug!("UI callbacks configured");
    }

    /// Re-list the working directory, reporting failures in a dialog
    fn refresh_listing(ui: &MainWindow, state: &StateManager) {
        match state.refresh_files() {
            Ok(count) => tracing::info!("Listed {} source files", count),
            Err(e) => {
                tracing::error!("Failed to list directory: {}", e);
                show_error_dialog(ui, "Directory Error", "Could not list the directory.", e.to_string());
            }
        }
    }

    /// Validate the selection, claim the job slot, and hand the job to tokio.
    ///
    /// Runs on the UI thread, so the busy check happens before the console
    /// is touched.
    fn start_compile(
        ui: &MainWindow,
        ctx: &Services,
        bridge: &EventLoopBridgeHandle<MainWindow>,
        index: i32,
        label: &str,
    ) {
        let Some(file) = ctx.state.selected_file(index, label) else {
            report_compile_error(ui, &CompileError::NoSelection);
            return;
        };

        let guard = match ctx.state.try_begin_compile(&file.name) {
            Ok(guard) => guard,
            Err(e) => {
                report_compile_error(ui, &e);
                return;
            }
        };

        let job = match ctx.state.read(|s| s.working_directory.clone()) {
            Some(dir) => ctx.compiler.prepare_job(&dir, &file.name),
            None => Err(CompileError::NoWorkingDirectory),
        };
        let job = match job {
            Ok(job) => job,
            Err(e) => {
                tracing::error!("Cannot compile {}: {}", file.name, e);
                guard.finish(JobStatus::Errored {
                    message: e.to_string(),
                });
                report_compile_error(ui, &e);
                return;
            }
        };

        clear_console(ui);
        append_console_line(ui, &OutputLine::info(job_header(&job)));

        let compiler = Arc::clone(&ctx.compiler);
        let editor = Arc::clone(&ctx.editor);
        let bridge_clone = bridge.clone();
        bridge.spawn_async(move || async move {
            Self::run_compile_job(guard, job, compiler, editor, bridge_clone).await;
        });
    }

    /// Run one compile job and report its outcome
    ///
    /// 1. Forwards each classified line to the console in order
    /// 2. Writes a footer line with the final status
    /// 3. Returns the state machine to idle
    /// 4. Shows a dialog and, on success, optionally opens the output folder
    async fn run_compile_job(
        guard: CompileGuard,
        job: CompileJob,
        compiler: Arc<CompilerService>,
        editor: Arc<dyn EditorLauncher>,
        bridge: EventLoopBridgeHandle<MainWindow>,
    ) {
        let (line_tx, mut line_rx) = mpsc::channel::<OutputLine>(CONSOLE_LINE_BUFFER);

        let forward_bridge = bridge.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(line) = line_rx.recv().await {
                forward_bridge
                    .send_ui(move |ui| append_console_line(ui, &line))
                    .await;
            }
        });

        let compiled_dir = job.artifact_path.parent().map(|p| p.to_path_buf());
        let result = compiler.execute(job, line_tx).await;

        // The sender was moved into `execute`, so the forwarder drains and exits
        if let Err(e) = forwarder.await {
            tracing::error!("Console forwarder failed: {}", e);
        }

        let (status, duration, errors, warnings) = match &result {
            Ok(report) => (
                report.status.clone(),
                Some(report.duration),
                report.count(LineLevel::Error),
                report.count(LineLevel::Warning),
            ),
            Err(e) => (
                JobStatus::Errored {
                    message: e.to_string(),
                },
                None,
                0,
                0,
            ),
        };

        let footer = OutputLine::new(
            job_footer(&status, duration),
            if status.is_success() {
                LineLevel::Info
            } else {
                LineLevel::Error
            },
        );
        bridge
            .send_ui(move |ui| append_console_line(ui, &footer))
            .await;

        let source = guard.source().to_string();
        guard.finish(status.clone());

        match result {
            Ok(report) if report.status.is_success() => {
                let artifact = report.job.artifact_path.to_string();
                bridge
                    .send_ui(move |ui| {
                        show_message_dialog(
                            ui,
                            "Compilation Successful",
                            format!("{} compiled successfully.\n\n{}", source, artifact),
                            warnings > 0,
                        );
                    })
                    .await;

                if compiler.settings().open_output_on_success {
                    if let Some(dir) = compiled_dir {
                        if let Err(e) = editor.open_folder(&dir) {
                            tracing::warn!("Could not open output folder: {}", e);
                        }
                    }
                }
            }
            Ok(_) => {
                let details = format!(
                    "{} error line(s), {} warning line(s). See the console for the full output.",
                    errors, warnings
                );
                bridge
                    .send_ui(move |ui| {
                        show_error_dialog(ui, "Compilation Failed", status.to_string(), details);
                    })
                    .await;
            }
            Err(e) => {
                tracing::error!("Compile job for {} errored: {}", source, e);
                bridge
                    .send_ui(move |ui| report_compile_error(ui, &e))
                    .await;
            }
        }
    }

    /// Subscribe to state changes and update UI accordingly
    ///
    /// This spawns a background thread that listens for state change events
    /// and updates the Slint UI via the EventLoopBridge. Updates block for
    /// queue space, so a burst of console lines cannot drop the update that
    /// re-enables the Compile button.
    fn setup_state_subscription(
        bridge: &EventLoopBridge<MainWindow>,
        state_manager: &Arc<StateManager>,
    ) {
        let bridge_handle = bridge.clone_handle();
        let state = Arc::clone(state_manager);
        let mut rx = state_manager.subscribe();

        let spawned = std::thread::Builder::new()
            .name("state-subscription".to_string())
            .spawn(move || {
                tracing::debug!("State subscription thread started");

                loop {
                    match rx.blocking_recv() {
                        Ok(change) => {
                            tracing::trace!("State change received: {:?}", change);
                            Self::handle_state_change(change, &state, &bridge_handle);
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            tracing::info!(
                                "State broadcast channel closed - shutting down subscription thread"
                            );
                            break;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                "State subscription lagged - {} events were skipped, resyncing",
                                skipped
                            );
                            let snapshot = state.read(UiSnapshot::from_state);
                            bridge_handle.blocking_send_ui(move |ui| snapshot.apply(ui));
                        }
                    }
                }

                tracing::debug!("State subscription thread terminated gracefully");
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to start state subscription thread: {}", e);
        }
    }

    fn handle_state_change(
        change: StateChange,
        state: &StateManager,
        bridge: &EventLoopBridgeHandle<MainWindow>,
    ) {
        let status = state.read(status_message);

        match change {
            StateChange::DirectoryChanged { directory } => {
                tracing::debug!("Directory changed: {:?}", directory);
                let label = directory_label(directory.as_ref());
                bridge.blocking_send_ui(move |ui| {
                    ui.set_working_directory(label.into());
                    ui.set_status_message(status.into());
                });
            }

            StateChange::FileListChanged {
                visible,
                total,
                sort_key,
            } => {
                tracing::debug!("File list changed: {}/{} by {}", visible, total, sort_key);
                let labels = state.read(|s| file_labels(&s.visible));
                bridge.blocking_send_ui(move |ui| {
                    ui.set_file_items(list_model(&labels));
                    ui.set_selected_index(-1);
                    ui.set_sort_label(sort_label(sort_key).into());
                    ui.set_status_message(status.into());
                });
            }

            StateChange::CompileStarted { source } => {
                tracing::debug!("Compile started: {}", source);
                bridge.blocking_send_ui(move |ui| {
                    ui.set_is_compiling(true);
                    ui.set_status_message(status.into());
                });
            }

            StateChange::CompileFinished { source, status: job_status } => {
                tracing::debug!("Compile finished: {} ({})", source, job_status.as_str());
                bridge.blocking_send_ui(move |ui| {
                    ui.set_is_compiling(false);
                    ui.set_status_message(status.into());
                });
            }

            StateChange::SettingsChanged => {
                tracing::debug!("Settings changed");
            }
        }
    }
}

/// Everything the window shows that is derived from [`AppState`]
///
/// Plain data so it can cross from the subscription thread to the UI thread.
#[derive(Debug, Clone, PartialEq)]
struct UiSnapshot {
    working_directory: String,
    file_labels: Vec<String>,
    sort_label: String,
    status_message: String,
    is_compiling: bool,
}

impl UiSnapshot {
    fn from_state(state: &AppState) -> Self {
        Self {
            working_directory: directory_label(state.working_directory.as_ref()),
            file_labels: file_labels(&state.visible),
            sort_label: sort_label(state.sort_key),
            status_message: status_message(state),
            is_compiling: state.is_compiling(),
        }
    }

    fn apply(&self, ui: &MainWindow) {
        ui.set_working_directory(self.working_directory.as_str().into());
        ui.set_file_items(list_model(&self.file_labels));
        ui.set_sort_label(self.sort_label.as_str().into());
        ui.set_status_message(self.status_message.as_str().into());
        ui.set_is_compiling(self.is_compiling);
    }
}

fn directory_label(directory: Option<&Utf8PathBuf>) -> String {
    directory
        .map(|d| d.to_string())
        .unwrap_or_else(|| "(no directory selected)".to_string())
}

fn file_labels(entries: &[FileListEntry]) -> Vec<String> {
    entries.iter().map(|e| e.label().to_string()).collect()
}

fn sort_label(key: SortKey) -> String {
    match key {
        SortKey::Name => "Sorted by name".to_string(),
        SortKey::Date => "Sorted by date (newest first)".to_string(),
        SortKey::Size => "Sorted by size (largest first)".to_string(),
    }
}

/// One-line summary for the status bar
fn status_message(state: &AppState) -> String {
    if let JobState::Running { source } = &state.job {
        return format!("Compiling {}...", source);
    }

    let Some(dir) = &state.working_directory else {
        return "Select a script directory to begin".to_string();
    };

    let listing = if state.search_term.is_empty() {
        format!(
            "{} .{} file(s) in {}",
            state.files.len(),
            state.settings.source_extension,
            dir
        )
    } else {
        format!(
            "{} of {} .{} file(s) match \"{}\"",
            state.visible_file_count(),
            state.files.len(),
            state.settings.source_extension,
            state.search_term
        )
    };

    match (&state.last_source, &state.last_status) {
        (Some(source), Some(status)) => format!("{} | Last: {} - {}", listing, source, status),
        _ => listing,
    }
}

fn job_header(job: &CompileJob) -> String {
    format!("=== Compiling {} ({}) ===", job.source_name, job.compiler_path)
}

fn job_footer(status: &JobStatus, duration: Option<Duration>) -> String {
    match duration {
        Some(d) => format!("=== {} ({:.2}s) ===", status, d.as_secs_f32()),
        None => format!("=== {} ===", status),
    }
}

fn console_line(line: &OutputLine) -> ConsoleLine {
    ConsoleLine {
        text: line.text.as_str().into(),
        level: line.level.as_str().into(),
    }
}

fn list_model(labels: &[String]) -> ModelRc<StandardListViewItem> {
    let items: Vec<StandardListViewItem> = labels
        .iter()
        .map(|label| StandardListViewItem::from(label.as_str()))
        .collect();
    ModelRc::new(VecModel::from(items))
}

/// Append a line to the console and keep it scrolled to the end
fn append_console_line(ui: &MainWindow, line: &OutputLine) {
    let model = ui.get_console_lines();
    match model.as_any().downcast_ref::<VecModel<ConsoleLine>>() {
        Some(lines) => lines.push(console_line(line)),
        None => {
            let mut lines: Vec<ConsoleLine> = model.iter().collect();
            lines.push(console_line(line));
            ui.set_console_lines(ModelRc::new(VecModel::from(lines)));
        }
    }
    ui.invoke_scroll_console_to_end();
}

fn clear_console(ui: &MainWindow) {
    ui.set_console_lines(ModelRc::new(VecModel::<ConsoleLine>::default()));
}

/// Warning for user mistakes, error dialog for everything else
fn report_compile_error(ui: &MainWindow, error: &CompileError) {
    match error {
        CompileError::NoSelection => {
            show_message_dialog(ui, "No Selection", "Please select a file to compile.", true)
        }
        CompileError::Busy(source) => show_message_dialog(
            ui,
            "Compilation Running",
            format!("Please wait until {} has finished compiling.", source),
            true,
        ),
        e if e.is_user_error() => show_message_dialog(ui, "Invalid Selection", e.to_string(), true),
        e => show_error_dialog(ui, "Compilation Error", e.to_string(), ""),
    }
}

/// Show an error dialog with optional technical details
fn show_error_dialog(
    ui: &MainWindow,
    title: impl Into<SharedString>,
    message: impl Into<SharedString>,
    details: impl Into<SharedString>,
) {
    ui.set_error_title(title.into());
    ui.set_error_message(message.into());
    ui.set_error_details(details.into());
    ui.set_show_error_dialog(true);
}

/// Show an informational or warning message dialog
fn show_message_dialog(
    ui: &MainWindow,
    title: impl Into<SharedString>,
    message: impl Into<SharedString>,
    is_warning: bool,
) {
    ui.set_message_title(title.into());
    ui.set_message_text(message.into());
    ui.set_message_is_warning(is_warning);
    ui.set_show_message_dialog(true);
}

/// Show a native folder picker
///
/// # Returns
/// The selected folder, or None if cancelled or not valid UTF-8
fn show_folder_picker(title: &str, start_dir: Option<Utf8PathBuf>) -> Option<Utf8PathBuf> {
    let mut dialog = rfd::FileDialog::new().set_title(title);
    if let Some(dir) = start_dir {
        dialog = dialog.set_directory(dir.as_std_path());
    }

    dialog.pick_folder().and_then(|path| {
        Utf8PathBuf::try_from(path)
            .map_err(|e| {
                tracing::error!("Failed to convert path to UTF-8: {}", e);
                e
            })
            .ok()
    })
}
