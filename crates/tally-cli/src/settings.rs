//! Resolves where the CLI keeps its queue and which settings it runs with.

use std::env;
use std::path::{Path, PathBuf};

use tally_core::SyncSettings;

use crate::error::CliError;

const SETTINGS_FILE_NAME: &str = "settings.json";

pub fn resolve_data_dir(cli_data_dir: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(dir) = cli_data_dir.or_else(|| env::var_os("TALLY_DATA_DIR").map(PathBuf::from)) {
        return Ok(dir);
    }
    default_data_dir()
}

pub fn default_data_dir() -> Result<PathBuf, CliError> {
    dirs::data_local_dir()
        .map(|dir| dir.join("tally"))
        .ok_or_else(|| CliError::Config("Failed to resolve local data directory".to_string()))
}

pub fn resolve_settings_path(cli_config: Option<PathBuf>) -> Option<PathBuf> {
    cli_config.or_else(|| dirs::config_dir().map(|dir| dir.join("tally").join(SETTINGS_FILE_NAME)))
}

/// Load the settings file (if any), apply `TALLY_*` overrides, and validate.
pub fn load_settings(path: Option<&Path>) -> Result<SyncSettings, CliError> {
    let settings = match path {
        Some(path) => SyncSettings::load_from_path(path)?,
        None => SyncSettings::default(),
    };
    let settings = settings.with_env_overrides()?;
    settings.validate()?;
    tracing::debug!(
        "Loaded settings from {}",
        path.map_or_else(|| "defaults".to_string(), |path| path.display().to_string())
    );
    Ok(settings)
}
