//! Integration tests for ConfigManager and configuration file handling
//!
//! These tests verify:
//! - Working directory persistence in `config.txt`
//! - Settings loading from hand-written YAML
//! - Environment layering over the YAML file
//! - Integration with StateManager at startup

use camino::Utf8PathBuf;
use pawn_compiler::config::{DIRECTORY_FILE, ENV_PREFIX, SETTINGS_FILE};
use pawn_compiler::models::SortKey;
use pawn_compiler::{CompilerSettings, ConfigManager, StateManager};
use std::collections::HashMap;
use std::fs;
use tempfile::TempDir;

fn create_test_config_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, config_path)
}

fn empty_env() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX).source(Some(HashMap::new()))
}

#[test]
fn test_create_config_manager() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    assert_eq!(manager.config_dir(), &config_path);
    assert_eq!(manager.directory_file(), config_path.join(DIRECTORY_FILE));
    assert_eq!(manager.settings_file(), config_path.join(SETTINGS_FILE));
}

#[test]
fn test_config_manager_creates_missing_directory() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let nested = config_path.join("Pawn Compiler Data");

    ConfigManager::new(&nested).unwrap();

    assert!(nested.is_dir());
}

#[test]
fn test_directory_file_is_a_single_line() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();
    let scripts = config_path.join("scripts");
    fs::create_dir(&scripts).unwrap();

    manager.save_directory(&scripts).unwrap();
    let contents = fs::read_to_string(manager.directory_file()).unwrap();
    assert_eq!(contents.lines().count(), 1);

    // A second save overwrites rather than appends
    manager.save_directory(&config_path).unwrap();
    assert_eq!(manager.load_directory().unwrap(), Some(config_path.clone()));
}

#[test]
fn test_directory_file_tolerates_whitespace() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.directory_file(), format!("  {}\r\n", config_path)).unwrap();

    assert_eq!(manager.load_directory().unwrap(), Some(config_path));
}

#[test]
fn test_blank_directory_file() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.directory_file(), "\n").unwrap();

    assert_eq!(manager.load_directory().unwrap(), None);
}

#[test]
fn test_hand_written_settings() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(
        manager.settings_file(),
        "compiler_executable: spcomp64\ndefault_sort: name\nopen_output_on_success: false\n",
    )
    .unwrap();

    let settings = manager.load_settings_with_env(empty_env()).unwrap();

    assert_eq!(settings.compiler_executable, "spcomp64");
    assert_eq!(settings.default_sort, SortKey::Name);
    assert!(!settings.open_output_on_success);
    // Unspecified keys fall back to defaults
    assert_eq!(settings.source_extension, "sp");
    assert_eq!(settings.compiled_subdir, "compiled");
    assert_eq!(settings.editor_command, "code");
}

#[test]
fn test_invalid_settings_value_is_an_error() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    fs::write(manager.settings_file(), "default_sort: alphabetical\n").unwrap();

    assert!(manager.load_settings_with_env(empty_env()).is_err());
}

#[test]
fn test_environment_layers_over_yaml() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(&config_path).unwrap();

    manager
        .save_settings(&CompilerSettings {
            compiler_executable: "spcomp".to_string(),
            ..CompilerSettings::default()
        })
        .unwrap();

    let mut vars = HashMap::new();
    vars.insert("PAWNC_COMPILER_EXECUTABLE".to_string(), "pawncc".to_string());
    vars.insert("PAWNC_DEFAULT_SORT".to_string(), "size".to_string());
    let env = config::Environment::with_prefix(ENV_PREFIX).source(Some(vars));

    let settings = manager.load_settings_with_env(env).unwrap();

    assert_eq!(settings.compiler_executable, "pawncc");
    assert_eq!(settings.default_sort, SortKey::Size);
}

#[test]
fn test_startup_flow_lists_saved_directory() {
    let (_temp_dir, config_path) = create_test_config_dir();
    let manager = ConfigManager::new(config_path.join("data")).unwrap();

    let scripts = config_path.join("scripts");
    fs::create_dir(&scripts).unwrap();
    fs::write(scripts.join("admin.sp"), "public OnPluginStart() {}").unwrap();
    fs::write(scripts.join("notes.txt"), "not a script").unwrap();
    manager.save_directory(&scripts).unwrap();

    let settings = manager.load_settings_with_env(empty_env()).unwrap();
    let directory = manager.load_directory().unwrap();

    let state = StateManager::new();
    state.load_from_settings(&settings, directory);
    let count = state.refresh_files().unwrap();

    assert_eq!(count, 1);
    assert_eq!(state.selected_file(0, "admin.sp").unwrap().name, "admin.sp");
}
