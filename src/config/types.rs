//! Struct definitions for repochat configuration.

use serde::{Deserialize, Serialize};

use crate::model::gpu::GpuType;

/// Root configuration for repochat, deserialized from `config.toml`.
///
/// Every field is optional: missing values fall back to command-line flags
/// and then to the built-in defaults in [`crate::constants`].
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    /// Path to the GGUF model file. Supports `{env:VAR}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Context window size in tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_ctx: Option<u32>,
    /// Layers to offload to the GPU (`-1` for all).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n_gpu_layers: Option<i32>,
    /// GPU acceleration type: none, metal, cuda or auto.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_type: Option<GpuType>,
    /// Sampling temperature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    /// Maximum number of tokens generated per reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// llama.cpp chat template name (e.g. `chatml`, `llama2`, `gemma`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_format: Option<String>,
    /// Extra ignore patterns applied when flattening a repository.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub repo_ignore: Vec<String>,
    /// System prompt used when no repository context is available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    /// Whether replies are streamed as they are generated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}
