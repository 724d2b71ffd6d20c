use camino::{Utf8Path, Utf8PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use thiserror::Error;

/// Errors from handing a file off to an external program
#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Failed to launch '{command}' for {path}: {source}")]
    LaunchFailed {
        command: String,
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opens files and folders in external programs
#[cfg_attr(test, mockall::automock)]
pub trait EditorLauncher: Send + Sync {
    /// Open a source file in the editor
    fn open_file(&self, path: &Utf8Path) -> Result<(), EditorError>;

    /// Reveal a folder in the platform file manager
    fn open_folder(&self, path: &Utf8Path) -> Result<(), EditorError>;
}

/// Launches the configured editor command (`code` by default).
///
/// The child runs detached with its standard streams discarded. A reaper
/// thread waits on it so it never lingers as a zombie.
#[derive(Debug, Clone)]
pub struct CommandEditorLauncher {
    editor_command: String,
}

impl CommandEditorLauncher {
    pub fn new(editor_command: impl Into<String>) -> Self {
        Self {
            editor_command: editor_command.into(),
        }
    }

    fn spawn(&self, program: &str, path: &Utf8Path) -> Result<(), EditorError> {
        let child = shell_command(program, path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| EditorError::LaunchFailed {
                command: program.to_string(),
                path: path.to_path_buf(),
                source,
            })?;

        reap_detached(child);
        Ok(())
    }
}

impl EditorLauncher for CommandEditorLauncher {
    fn open_file(&self, path: &Utf8Path) -> Result<(), EditorError> {
        tracing::info!("Opening {} with '{}'", path, self.editor_command);
        self.spawn(&self.editor_command, path)
    }

    fn open_folder(&self, path: &Utf8Path) -> Result<(), EditorError> {
        let opener = if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };

        tracing::info!("Opening folder {} with '{}'", path, opener);

        // explorer is a real executable, so skip the cmd shim for it
        if cfg!(target_os = "windows") {
            let child = Command::new(opener)
                .arg(path.as_str())
                .spawn()
                .map_err(|source| EditorError::LaunchFailed {
                    command: opener.to_string(),
                    path: path.to_path_buf(),
                    source,
                })?;
            reap_detached(child);
            return Ok(());
        }

        self.spawn(opener, path)
    }
}

/// `code` is a .cmd shim on Windows and needs the shell to resolve it
#[cfg(windows)]
fn shell_command(program: &str, path: &Utf8Path) -> Command {
    use std::os::windows::process::CommandExt;

    let mut cmd = Command::new("cmd");
    cmd.raw_arg(cmd_line(program, path));
    cmd
}

#[cfg(not(windows))]
fn shell_command(program: &str, path: &Utf8Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.arg(path.as_str());
    cmd
}

/// Arguments for `cmd`. With `/S` only the outer quote pair is stripped, so
/// a path containing spaces or `&` reaches the program as one argument.
#[cfg(any(windows, test))]
fn cmd_line(program: &str, path: &Utf8Path) -> String {
    format!(r#"/S /C ""{}" "{}"""#, program, path)
}

/// Wait on a detached child from a background thread
fn reap_detached(mut child: Child) -> Option<JoinHandle<Option<ExitStatus>>> {
    let pid = child.id();
    std::thread::Builder::new()
        .name("child-reaper".to_string())
        .spawn(move || match child.wait() {
            Ok(status) => {
                tracing::debug!("Process {} exited: {}", pid, status);
                Some(status)
            }
            Err(e) => {
                tracing::warn!("Failed to wait on process {}: {}", pid, e);
                None
            }
        })
        .map_err(|e| tracing::warn!("Failed to start reaper for process {}: {}", pid, e))
        .ok()
}

/// Open the selected file, turning a launch failure into a user-facing message
pub fn open_in_editor(launcher: &dyn EditorLauncher, path: &Utf8Path) -> Result<(), String> {
    launcher.open_file(path).map_err(|e| {
        tracing::error!("Editor hand-off failed: {}", e);
        format!("Could not open {} in the editor.\n{}", path, e)
    })
}
