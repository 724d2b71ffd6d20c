use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::process::Stdio;
use std::time::Instant;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::mpsc;

use super::classify::OutputClassifier;
use crate::models::{
    CompileJob, CompileReport, CompilerSettings, FailureReason, JobStatus, OutputLine,
};

/// Capacity of the channel between the pipe reader and the job loop
const RAW_LINE_BUFFER: usize = 256;

/// Errors that stop a compile job from producing an exit code
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("No file selected")]
    NoSelection,

    #[error("A compilation is already running ({0})")]
    Busy(String),

    #[error("No working directory configured")]
    NoWorkingDirectory,

    #[error("{name} is not a .{extension} source file")]
    InvalidSource { name: String, extension: String },

    #[error("Source file not found: {0}")]
    SourceNotFound(Utf8PathBuf),

    #[error("Compiler not found: {0}")]
    CompilerNotFound(Utf8PathBuf),

    #[error("Failed to start compiler {path}: {source}")]
    Spawn {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Process error: {0}")]
    Io(#[from] std::io::Error),
}

impl CompileError {
    /// User input problems, as opposed to environment failures
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CompileError::NoSelection | CompileError::Busy(_) | CompileError::InvalidSource { .. }
        )
    }
}

/// Runs the external compiler for one source file at a time.
///
/// A job goes through four steps:
///
/// 1. [`prepare_job`](Self::prepare_job) validates the source and resolves
///    the compiler and artifact paths.
/// 2. [`backup_existing_artifact`](Self::backup_existing_artifact) moves a
///    previous build aside to `<stem>_backup_<YYYYMMDD_HHMMSS>.<ext>`.
/// 3. The compiler is spawned as `compiler <source name>` in the working
///    directory with stdin closed. stdout and stderr share one pipe, so lines
///    are classified and relayed in the order the compiler wrote them.
/// 4. [`evaluate_outcome`] decides the status. Success needs both exit code 0
///    and the artifact on disk, because the compiler's exit code alone does
///    not prove an artifact was written.
///
/// The service holds no job state. Keeping to one job at a time is the
/// caller's concern (see [`crate::state::StateManager::try_begin_compile`]).
#[derive(Debug, Clone)]
pub struct CompilerService {
    settings: CompilerSettings,
    classifier: OutputClassifier,
}

impl CompilerService {
    pub fn new(settings: CompilerSettings) -> Self {
        Self {
            settings,
            classifier: OutputClassifier::new(),
        }
    }

    pub fn settings(&self) -> &CompilerSettings {
        &self.settings
    }

    /// Expected artifact location: `<dir>/<compiled>/<stem>.<artifact_ext>`
    pub fn artifact_path(&self, working_dir: &Utf8Path, source_name: &str) -> Utf8PathBuf {
        let stem = Utf8Path::new(source_name).file_stem().unwrap_or(source_name);
        working_dir
            .join(&self.settings.compiled_subdir)
            .join(format!("{}.{}", stem, self.settings.artifact_extension))
    }

    /// Compiler path, resolved against the working directory when relative
    pub fn resolve_compiler(&self, working_dir: &Utf8Path) -> Utf8PathBuf {
        let configured = Utf8Path::new(&self.settings.compiler_executable);
        if configured.is_absolute() {
            configured.to_path_buf()
        } else {
            working_dir.join(configured)
        }
    }

    /// Validate a selection and resolve every path the job needs.
    ///
    /// The compiler is checked here so a missing binary fails before any
    /// backup is taken.
    pub fn prepare_job(
        &self,
        working_dir: &Utf8Path,
        source_name: &str,
    ) -> Result<CompileJob, CompileError> {
        if source_name.is_empty() {
            return Err(CompileError::NoSelection);
        }

        let is_bare_name = Utf8Path::new(source_name).file_name() == Some(source_name);
        if !is_bare_name || !self.settings.is_source_name(source_name) {
            return Err(CompileError::InvalidSource {
                name: source_name.to_string(),
                extension: self.settings.source_extension.clone(),
            });
        }

        let source_path = working_dir.join(source_name);
        if !source_path.is_file() {
            return Err(CompileError::SourceNotFound(source_path));
        }

        let compiler_path = self.resolve_compiler(working_dir);
        if !compiler_path.is_file() {
            return Err(CompileError::CompilerNotFound(compiler_path));
        }

        Ok(CompileJob {
            source_name: source_name.to_string(),
            artifact_path: self.artifact_path(working_dir, source_name),
            source_path,
            working_directory: working_dir.to_path_buf(),
            compiler_path,
        })
    }

    /// Rename an existing artifact to a timestamped backup.
    ///
    /// Returns `Ok(None)` when there is nothing to back up.
    pub fn backup_existing_artifact(&self, artifact: &Utf8Path) -> Result<Option<Utf8PathBuf>> {
        if !artifact.exists() {
            return Ok(None);
        }

        let backup = backup_path_for(artifact, &Local::now().naive_local());

        fs::rename(artifact, &backup)
            .with_context(|| format!("Failed to back up {} to {}", artifact, backup))?;

        tracing::info!("Backed up previous artifact: {} -> {}", artifact, backup);
        Ok(Some(backup))
    }

    /// Run a prepared job to completion.
    ///
    /// Classified lines are sent to `output` as they arrive. The send is
    /// awaited, so a slow consumer slows the reader down and no line is
    /// dropped. If the receiver goes away, lines are still collected into
    /// the report.
    ///
    /// Returns `Err` only when the compiler could not be started. Every
    /// process that ran yields a report with a status.
    pub async fn execute(
        &self,
        job: CompileJob,
        output: mpsc::Sender<OutputLine>,
    ) -> Result<CompileReport, CompileError> {
        let start = Instant::now();
        let mut lines = Vec::new();

        let backup = match self.backup_existing_artifact(&job.artifact_path) {
            Ok(Some(path)) => {
                relay(
                    &output,
                    &mut lines,
                    OutputLine::info(format!("Previous build moved to {}", path)),
                )
                .await;
                Some(path)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Backup failed, continuing: {:#}", e);
                relay(
                    &output,
                    &mut lines,
                    OutputLine::warning(format!("Backup failed: {:#}", e)),
                )
                .await;
                None
            }
        };

        tracing::info!(
            "Compiling {} with {} (cwd: {})",
            job.source_path,
            job.compiler_path,
            job.working_directory
        );

        // Both streams write into one pipe, which keeps their interleaving
        let (pipe_reader, pipe_writer) = std::io::pipe()?;
        let stderr_writer = pipe_writer.try_clone()?;

        // The command holds the parent's write ends. It must drop right after
        // spawning or the reader never sees EOF.
        let mut child = {
            let mut command = Command::new(job.compiler_path.as_std_path());
            command
                .arg(&job.source_name)
                .current_dir(job.working_directory.as_std_path())
                .stdin(Stdio::null())
                .stdout(Stdio::from(pipe_writer))
                .stderr(Stdio::from(stderr_writer));

            command.spawn().map_err(|source| match source.kind() {
                std::io::ErrorKind::NotFound => {
                    CompileError::CompilerNotFound(job.compiler_path.clone())
                }
                _ => CompileError::Spawn {
                    path: job.compiler_path.clone(),
                    source,
                },
            })?
        };

        let (raw_tx, mut raw_rx) = mpsc::channel::<String>(RAW_LINE_BUFFER);
        let reader = tokio::task::spawn_blocking(move || read_lines(pipe_reader, raw_tx));

        while let Some(raw) = raw_rx.recv().await {
            let line = self.classifier.classify(raw);
            relay(&output, &mut lines, line).await;
        }

        match reader.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Error reading compiler output: {}", e),
            Err(e) => tracing::error!("Output reader task failed: {}", e),
        }

        let exit_status = child.wait().await?;
        let exit_code = exit_status.code().unwrap_or(-1);
        let artifact_exists = job.artifact_path.is_file();
        let status = evaluate_outcome(exit_code, artifact_exists);
        let duration = start.elapsed();

        tracing::info!(
            "Compiler finished in {:.2}s with exit code {} (artifact present: {}): {}",
            duration.as_secs_f32(),
            exit_code,
            artifact_exists,
            status.as_str()
        );

        Ok(CompileReport {
            job,
            backup,
            exit_code,
            lines,
            status,
            duration,
        })
    }
}

/// Backup name for an artifact: `<stem>_backup_<YYYYMMDD_HHMMSS>.<ext>` beside it
pub fn backup_path_for(artifact: &Utf8Path, timestamp: &NaiveDateTime) -> Utf8PathBuf {
    let stamp = timestamp.format("%Y%m%d_%H%M%S");
    let stem = artifact.file_stem().unwrap_or("artifact");

    let file_name = match artifact.extension() {
        Some(ext) => format!("{}_backup_{}.{}", stem, stamp, ext),
        None => format!("{}_backup_{}", stem, stamp),
    };

    artifact.with_file_name(file_name)
}

/// Success needs both a zero exit code and the artifact on disk
pub fn evaluate_outcome(exit_code: i32, artifact_exists: bool) -> JobStatus {
    if exit_code != 0 {
        JobStatus::Failed {
            exit_code,
            reason: FailureReason::NonZeroExit,
        }
    } else if !artifact_exists {
        JobStatus::Failed {
            exit_code,
            reason: FailureReason::ArtifactMissing,
        }
    } else {
        JobStatus::Succeeded
    }
}

/// Decode one raw line, tolerating non UTF-8 compiler output
fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}

/// Forward each line of the merged output pipe until EOF. Runs on a blocking
/// thread.
fn read_lines(reader: impl Read, tx: mpsc::Sender<String>) -> std::io::Result<()> {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            return Ok(());
        }
        if tx.blocking_send(decode_line(&buf)).is_err() {
            return Ok(());
        }
    }
}

async fn relay(output: &mpsc::Sender<OutputLine>, lines: &mut Vec<OutputLine>, line: OutputLine) {
    // A closed receiver only means nobody is watching
    let _ = output.send(line.clone()).await;
    lines.push(line);
}
