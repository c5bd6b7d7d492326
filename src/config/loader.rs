// src/config/loader.rs

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{EngineError, Result};

const DEFAULT_CONFIG_FILE: &str = "Jobgate.toml";

/// Read and deserialize a config file without any semantic checks.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    debug!(path = %path.display(), bytes = text.len(), "read config file");
    Ok(toml::from_str(&text)?)
}

/// Deserialize, then validate storage layout, link limits and timings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// [`load_and_validate`], except that a missing `Jobgate.toml` at the
/// default location falls back to built-in defaults.
///
/// Any other missing path is a config error.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let path = path.as_ref();
    match load_and_validate(path) {
        Err(EngineError::IoError(err)) if err.kind() == ErrorKind::NotFound => {
            if path == default_config_path() {
                info!("no {DEFAULT_CONFIG_FILE} found; using built-in defaults");
                ConfigFile::try_from(RawConfigFile::default())
            } else {
                Err(EngineError::ConfigError(format!(
                    "config file {} does not exist",
                    path.display()
                )))
            }
        }
        other => other,
    }
}

/// `Jobgate.toml`, relative to the working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_FILE)
}
