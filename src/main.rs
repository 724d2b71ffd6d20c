//! Pawn Compiler - GUI entry point
//!
//! # Threading model
//!
//! - **Main thread**: Runs the Slint event loop (blocking, synchronous)
//! - **Tokio workers**: Run compile jobs (subprocess and pipe readers)
//! - **State listener**: Background std::thread for reactive UI updates
//! - **UI bridge**: Background std::thread that queues closures onto the event loop
//!
//! # Execution Flow
//!
//! 1. Load settings from `Pawn Compiler Data/settings.yaml` and `PAWNC_*` variables
//! 2. Initialize logging → `logs/pawn-compiler.<date>`
//! 3. Create tokio runtime
//! 4. Load the working directory from `Pawn Compiler Data/config.txt`, falling
//!    back to the current directory
//! 5. List source files, create GuiController, run the Slint event loop
//! 6. Shutdown tokio runtime with 5s timeout

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use pawn_compiler::logging::{LoggingOptions, setup_logging};
use pawn_compiler::services::{CommandEditorLauncher, CompilerService, EditorLauncher};
use pawn_compiler::ui::GuiController;
use pawn_compiler::{APP_NAME, ConfigManager, StateManager, VERSION};
use std::sync::Arc;
use std::time::Duration;

/// Directory holding `config.txt` and `settings.yaml`
const DATA_DIR: &str = "Pawn Compiler Data";

const LOG_DIR: &str = "logs";

const WORKER_THREADS: usize = 2;

fn main() -> Result<()> {
    let config_manager = Arc::new(ConfigManager::new(DATA_DIR)?);
    let settings = config_manager.load_settings()?;

    // Held until main returns so buffered log lines are flushed
    let _log_guard = setup_logging(&LoggingOptions {
        log_dir: Utf8Path::new(LOG_DIR),
        log_prefix: APP_NAME,
        debug_mode: settings.debug_mode,
        console_output: true,
    })?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(WORKER_THREADS)
        .thread_name("pawn-compiler-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    tracing::info!("Tokio runtime initialized with {} worker threads", WORKER_THREADS);

    let directory = match config_manager.load_directory() {
        Ok(Some(dir)) => Some(dir),
        Ok(None) => current_directory(),
        Err(e) => {
            tracing::error!("Failed to load saved directory: {:#}", e);
            current_directory()
        }
    };

    let state_manager = Arc::new(StateManager::new());
    state_manager.load_from_settings(&settings, directory);

    match state_manager.refresh_files() {
        Ok(count) => tracing::info!("Found {} source files", count),
        Err(e) => tracing::error!("Initial listing failed: {}", e),
    }

    let editor: Arc<dyn EditorLauncher> =
        Arc::new(CommandEditorLauncher::new(settings.editor_command.clone()));
    let compiler = Arc::new(CompilerService::new(settings));

    let gui_controller = GuiController::new(
        Arc::clone(&state_manager),
        config_manager,
        compiler,
        editor,
        runtime.handle().clone(),
    )?;

    tracing::info!("GUI controller initialized, launching window");

    let result = gui_controller.run();

    tracing::info!("GUI closed, shutting down");

    if state_manager.is_compiling() {
        tracing::warn!("Window closed while a compile job was running");
    }

    runtime.shutdown_timeout(Duration::from_secs(5));

    tracing::info!("Application shutdown complete");

    result.map_err(|e| {
        tracing::error!("GUI error: {}", e);
        anyhow::anyhow!("GUI error: {}", e)
    })
}

/// The process's current directory, used when nothing is saved. Not persisted.
fn current_directory() -> Option<Utf8PathBuf> {
    let cwd = std::env::current_dir()
        .map_err(|e| tracing::warn!("Cannot read current directory: {}", e))
        .ok()?;

    match Utf8PathBuf::try_from(cwd) {
        Ok(dir) => {
            tracing::info!("No saved directory, using current directory {}", dir);
            Some(dir)
        }
        Err(e) => {
            tracing::warn!("Current directory is not valid UTF-8: {}", e);
            None
        }
    }
}
