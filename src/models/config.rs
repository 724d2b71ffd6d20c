use serde::{Deserialize, Serialize};

use super::source_file::SortKey;

/// Compiler and front-end settings from `settings.yaml`
///
/// Every field has a default so a partial (or missing) file is valid.
/// Field names are flat snake_case so they can be overridden from the
/// environment with a `PAWNC_` prefix (e.g. `PAWNC_COMPILER_EXECUTABLE`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Compiler executable. Relative paths resolve against the working directory.
    pub compiler_executable: String,

    /// Extension of source files, without the leading dot
    pub source_extension: String,

    /// Extension of compiled artifacts, without the leading dot
    pub artifact_extension: String,

    /// Subdirectory of the working directory where artifacts are written
    pub compiled_subdir: String,

    /// External editor launcher
    pub editor_command: String,

    /// Sort applied to the file list at startup
    pub default_sort: SortKey,

    /// Open the compiled folder after a successful build
    pub open_output_on_success: bool,

    /// Debug-level logging
    pub debug_mode: bool,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            compiler_executable: default_compiler_executable(),
            source_extension: "sp".to_string(),
            artifact_extension: "smx".to_string(),
            compiled_subdir: "compiled".to_string(),
            editor_command: "code".to_string(),
            default_sort: SortKey::Date,
            open_output_on_success: true,
            debug_mode: false,
        }
    }
}

fn default_compiler_executable() -> String {
    format!("compiler{}", std::env::consts::EXE_SUFFIX)
}

impl CompilerSettings {
    /// Check whether a file name carries the configured source extension
    pub fn is_source_name(&self, name: &str) -> bool {
        has_extension(name, &self.source_extension)
    }
}

/// Case-insensitive extension match on a bare file name
pub(crate) fn has_extension(name: &str, extension: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}
