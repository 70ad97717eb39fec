// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{JobConfig, RawJobConfig};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawJobConfig`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawJobConfig> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawJobConfig = toml::from_str(&contents)?;
    Ok(config)
}

/// Load a configuration file from path and validate it.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<JobConfig> {
    let raw = load_from_path(&path)?;
    JobConfig::try_from(raw)
}

/// `Iterdag.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Iterdag.toml")
}
