pub mod profiles;

pub use profiles::*;

use crate::error::{AppError, AppResult};
use std::path::PathBuf;

/// Get the metalite config directory
pub fn get_config_dir() -> AppResult<PathBuf> {
    let config_dir = dirs::config_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .ok_or_else(|| AppError::Config("Could not find config directory".into()))?
        .join("metalite");

    Ok(config_dir)
}

/// Get the config directory, creating it if it does not exist yet
pub fn ensure_config_dir() -> AppResult<PathBuf> {
    let config_dir = get_config_dir()?;
    std::fs::create_dir_all(&config_dir)?;
    Ok(config_dir)
}
