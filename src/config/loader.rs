//! File loading and merging for repochat configuration.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use super::types::Config;

/// Written on first run so users can discover the available keys.
const DEFAULT_CONFIG_TEMPLATE: &str = r#"# repochat configuration. Command-line flags override these values.

# model = "{env:HOME}/models/model.gguf"
# n_ctx = 32768
# n_gpu_layers = 0
# gpu_type = "auto"
# temperature = 0.7
# max_tokens = 512
# chat_format = "chatml"
# repo_ignore = ["*.log", "node_modules/"]
# system_prompt = "You are a helpful assistant."
# stream = true
"#;

impl Config {
    /// Loads the global config from `~/.config/repochat/config.toml`.
    ///
    /// If no config file exists, writes a commented template and returns
    /// the defaults.
    pub(super) fn load_global() -> Result<Self> {
        let path = Self::config_path()?;
        if !path.exists() {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, DEFAULT_CONFIG_TEMPLATE)
                .with_context(|| format!("Failed to write default config to {:?}", path))?;
            return Ok(Config::default());
        }
        Self::load_file(&path)
    }

    /// Look for repochat.toml in current dir, then walk up to git root.
    pub(super) fn load_project() -> Result<Option<Config>> {
        let mut dir = std::env::current_dir()?;
        loop {
            let candidate = dir.join(crate::constants::PROJECT_CONFIG_FILENAME);
            if candidate.exists() {
                return Self::load_file(&candidate).map(Some);
            }
            // Stop at git root or filesystem root
            if dir.join(".git").exists() || !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    /// Parses one TOML config file.
    pub(super) fn load_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config at {:?}", path))?;
        Ok(config)
    }

    /// Merge project config over global config.
    /// Project values win when present.
    pub(super) fn merge(global: Config, project: Config) -> Config {
        Config {
            model: project.model.or(global.model),
            n_ctx: project.n_ctx.or(global.n_ctx),
            n_gpu_layers: project.n_gpu_layers.or(global.n_gpu_layers),
            gpu_type: project.gpu_type.or(global.gpu_type),
            temperature: project.temperature.or(global.temperature),
            max_tokens: project.max_tokens.or(global.max_tokens),
            chat_format: project.chat_format.or(global.chat_format),
            repo_ignore: if project.repo_ignore.is_empty() {
                global.repo_ignore
            } else {
                project.repo_ignore
            },
            system_prompt: project.system_prompt.or(global.system_prompt),
            stream: project.stream.or(global.stream),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::gpu::GpuType;

    #[test]
    fn test_template_parses_to_defaults() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_file_reads_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("repochat.toml");
        fs::write(
            &path,
            "model = \"/models/a.gguf\"\ngpu_type = \"cuda\"\nn_gpu_layers = -1\nrepo_ignore = [\"target/\"]\n",
        )
        .unwrap();

        let config = Config::load_file(&path).unwrap();
        assert_eq!(config.model.as_deref(), Some("/models/a.gguf"));
        assert_eq!(config.gpu_type, Some(GpuType::Cuda));
        assert_eq!(config.n_gpu_layers, Some(-1));
        assert_eq!(config.repo_ignore, vec!["target/".to_string()]);
    }

    #[test]
    fn test_load_file_rejects_unknown_gpu_type() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "gpu_type = \"rocm\"\n").unwrap();
        assert!(Config::load_file(&path).is_err());
    }

    #[test]
    fn test_merge_prefers_project_values() {
        let global = Config {
            model: Some("global.gguf".into()),
            temperature: Some(0.1),
            repo_ignore: vec!["*.log".into()],
            ..Config::default()
        };
        let project = Config {
            model: Some("project.gguf".into()),
            max_tokens: Some(1024),
            ..Config::default()
        };

        let merged = Config::merge(global, project);
        assert_eq!(merged.model.as_deref(), Some("project.gguf"));
        assert_eq!(merged.temperature, Some(0.1));
        assert_eq!(merged.max_tokens, Some(1024));
        assert_eq!(merged.repo_ignore, vec!["*.log".to_string()]);
    }
}
