//! Configuration types and path resolution for repochat.
//!
//! Settings live as TOML at the platform's XDG config path
//! (e.g. `~/.config/repochat/config.toml` on Linux), optionally overridden by
//! a `repochat.toml` in the project. The cached repository context lives
//! under the XDG data directory (`~/.local/share/repochat/`).

mod loader;
mod paths;
mod resolve;
mod types;

pub use types::Config;

use anyhow::Result;

impl Config {
    /// Load config with precedence: project > global > defaults.
    /// Creates default config file if none exists.
    pub fn load() -> Result<Self> {
        let global = Self::load_global()?;
        let project = Self::load_project()?;

        let mut config = global;
        if let Some(proj) = project {
            config = Self::merge(config, proj);
        }

        config.resolve_substitutions();
        Ok(config)
    }
}
