use crate::models::CompilerSettings;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File holding the working directory, one line, no schema
pub const DIRECTORY_FILE: &str = "config.txt";

/// YAML file holding [`CompilerSettings`]
pub const SETTINGS_FILE: &str = "settings.yaml";

/// Prefix for environment overrides, e.g. `PAWNC_COMPILER_EXECUTABLE`
pub const ENV_PREFIX: &str = "PAWNC";

/// Configuration manager for the persisted working directory and settings.
///
/// Manages two files inside the data directory:
/// - `config.txt`: the absolute working directory, overwritten on change
/// - `settings.yaml`: compiler/editor settings, layered under `PAWNC_*`
///   environment variables
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    directory_path: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager, creating `config_dir` if needed.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            directory_path: config_dir.join(DIRECTORY_FILE),
            settings_path: config_dir.join(SETTINGS_FILE),
            config_dir,
        })
    }

    /// Load the saved working directory.
    ///
    /// # Returns
    /// `None` if nothing is saved, the file is blank, or the saved directory
    /// no longer exists
    pub fn load_directory(&self) -> Result<Option<Utf8PathBuf>> {
        if !self.directory_path.exists() {
            tracing::info!("No saved directory at {}", self.directory_path);
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.directory_path)
            .with_context(|| format!("Failed to read {}", self.directory_path))?;

        let line = contents.trim();
        if line.is_empty() {
            tracing::warn!("Saved directory file {} is empty", self.directory_path);
            return Ok(None);
        }

        let directory = Utf8PathBuf::from(line);
        if !directory.is_dir() {
            tracing::warn!("Saved directory {} no longer exists, ignoring it", directory);
            return Ok(None);
        }

        tracing::info!("Loaded working directory {}", directory);
        Ok(Some(directory))
    }

    /// Overwrite the saved working directory
    pub fn save_directory(&self, directory: &Utf8Path) -> Result<()> {
        fs::write(&self.directory_path, directory.as_str())
            .with_context(|| format!("Failed to write {}", self.directory_path))?;

        tracing::info!("Saved working directory {} to {}", directory, self.directory_path);
        Ok(())
    }

    /// Load settings: defaults, then `settings.yaml` if present, then the
    /// environment
    pub fn load_settings(&self) -> Result<CompilerSettings> {
        self.load_settings_with_env(config::Environment::with_prefix(ENV_PREFIX))
    }

    /// Load settings with an explicit environment source.
    ///
    /// Split out so tests can supply variables without touching the
    /// process environment.
    pub fn load_settings_with_env(&self, env: config::Environment) -> Result<CompilerSettings> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
        }

        let settings: CompilerSettings = config::Config::builder()
            .add_source(
                config::File::from(self.settings_path.as_std_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(env.try_parsing(true))
            .build()
            .with_context(|| format!("Failed to load settings from {}", self.settings_path))?
            .try_deserialize()
            .with_context(|| format!("Failed to parse settings from {}", self.settings_path))?;

        tracing::info!("Loaded settings from {}", self.settings_path);
        Ok(settings)
    }

    /// Save settings as YAML
    pub fn save_settings(&self, settings: &CompilerSettings) -> Result<()> {
        let yaml_string =
            serde_yaml_ng::to_string(settings).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    pub fn directory_file(&self) -> &Utf8Path {
        &self.directory_path
    }

    pub fn settings_file(&self) -> &Utf8Path {
        &self.settings_path
    }
}
