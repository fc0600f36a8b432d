use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::shared::constants;

pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))
}

/// `<config dir>/glyphrain/config.json`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(constants::APP_NAME).join(constants::CONFIG_FILE))
}
