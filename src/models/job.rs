use camino::Utf8PathBuf;
use std::fmt;
use std::time::Duration;

/// One compiler invocation, fully resolved before the process is spawned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    /// Bare file name as listed, e.g. `plugin.sp`
    pub source_name: String,
    pub source_path: Utf8PathBuf,
    /// Where the compiler is expected to write its output
    pub artifact_path: Utf8PathBuf,
    pub working_directory: Utf8PathBuf,
    pub compiler_path: Utf8PathBuf,
}

/// Display classification of a compiler output line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineLevel {
    Error,
    Warning,
    Info,
}

impl LineLevel {
    /// Tag understood by the console view
    pub fn as_str(&self) -> &'static str {
        match self {
            LineLevel::Error => "error",
            LineLevel::Warning => "warning",
            LineLevel::Info => "info",
        }
    }
}

/// A single classified line of compiler output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub level: LineLevel,
}

impl OutputLine {
    pub fn new(text: impl Into<String>, level: LineLevel) -> Self {
        Self {
            text: text.into(),
            level,
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self::new(text, LineLevel::Info)
    }

    pub fn warning(text: impl Into<String>) -> Self {
        Self::new(text, LineLevel::Warning)
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::new(text, LineLevel::Error)
    }
}

/// Which post-run check failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The compiler exited with a non-zero code
    NonZeroExit,
    /// The compiler exited 0 but the artifact is not on disk
    ArtifactMissing,
}

/// Final outcome of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Succeeded,
    Failed {
        exit_code: i32,
        reason: FailureReason,
    },
    /// The job never produced an exit code (spawn or IO failure)
    Errored { message: String },
}

impl JobStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Succeeded)
    }

    /// Short tag for logs and state events
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Succeeded => "success",
            JobStatus::Failed { .. } => "failure",
            JobStatus::Errored { .. } => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Succeeded => write!(f, "Compiled successfully"),
            JobStatus::Failed {
                exit_code,
                reason: FailureReason::NonZeroExit,
            } => write!(f, "Compiler exited with code {}", exit_code),
            JobStatus::Failed {
                exit_code,
                reason: FailureReason::ArtifactMissing,
            } => write!(
                f,
                "Compiler exited with code {} but no output file was produced",
                exit_code
            ),
            JobStatus::Errored { message } => write!(f, "Compilation error: {}", message),
        }
    }
}

/// Everything known about a finished job
#[derive(Debug, Clone)]
pub struct CompileReport {
    pub job: CompileJob,
    /// Where a previous artifact was moved, if one existed and the rename worked
    pub backup: Option<Utf8PathBuf>,
    /// Process exit code, or -1 when it was killed by a signal
    pub exit_code: i32,
    /// Every output line in the order it was read
    pub lines: Vec<OutputLine>,
    pub status: JobStatus,
    pub duration: Duration,
}

impl CompileReport {
    /// Count of lines classified at a given level
    pub fn count(&self, level: LineLevel) -> usize {
        self.lines.iter().filter(|l| l.level == level).count()
    }
}
