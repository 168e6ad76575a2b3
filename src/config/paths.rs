//! XDG path resolution for repochat configuration and data directories.

use anyhow::Result;
use std::path::PathBuf;

use super::types::Config;
use crate::constants::{APP_NAME, CONFIG_FILENAME, CONTEXT_FILENAME, HISTORY_FILENAME};

impl Config {
    /// Returns the platform-specific configuration directory for repochat.
    ///
    /// Returns `~/.config/repochat/` on Linux (`XDG_CONFIG_HOME/repochat`).
    ///
    /// # Errors
    ///
    /// Returns an error if the platform's config directory cannot be determined.
    pub fn config_dir() -> Result<PathBuf> {
        let dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the platform-specific data directory for repochat.
    ///
    /// Returns `~/.local/share/repochat/` on Linux (`XDG_DATA_HOME/repochat`).
    /// Holds the cached repository context.
    pub fn data_dir() -> Result<PathBuf> {
        let dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the platform-specific cache directory for repochat.
    ///
    /// Returns `~/.cache/repochat/` on Linux (`XDG_CACHE_HOME/repochat`).
    pub fn cache_dir() -> Result<PathBuf> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))?
            .join(APP_NAME);
        Ok(dir)
    }

    /// Returns the full path to the repochat configuration file.
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Well-known location of the flattened repository rendering.
    pub fn context_path() -> Result<PathBuf> {
        Ok(Self::data_dir()?.join(CONTEXT_FILENAME))
    }

    /// Readline history file.
    pub fn history_path() -> Result<PathBuf> {
        Ok(Self::cache_dir()?.join(HISTORY_FILENAME))
    }
}
