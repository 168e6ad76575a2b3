//! Environment variable substitution and default resolution.

use super::types::Config;

use crate::constants::{
    DEFAULT_MAX_TOKENS, DEFAULT_N_CTX, DEFAULT_N_GPU_LAYERS, DEFAULT_SYSTEM_PROMPT,
    DEFAULT_TEMPERATURE,
};
use crate::model::gpu::GpuType;

impl Config {
    /// Resolve {env:VAR_NAME} patterns in string fields.
    pub(super) fn resolve_substitutions(&mut self) {
        for field in [&mut self.model, &mut self.chat_format, &mut self.system_prompt] {
            if let Some(value) = field {
                *value = Self::resolve_str(value);
            }
        }
    }

    /// Replace {env:VAR} with the environment variable value.
    fn resolve_str(s: &str) -> String {
        let mut result = s.to_string();
        while let Some(start) = result.find("{env:") {
            if let Some(end) = result[start..].find('}') {
                let var_name = &result[start + 5..start + end];
                let value = std::env::var(var_name).unwrap_or_default();
                result = format!(
                    "{}{}{}",
                    &result[..start],
                    value,
                    &result[start + end + 1..]
                );
            } else {
                break;
            }
        }
        result
    }

    pub fn n_ctx_or_default(&self) -> u32 {
        self.n_ctx.unwrap_or(DEFAULT_N_CTX)
    }

    pub fn n_gpu_layers_or_default(&self) -> i32 {
        self.n_gpu_layers.unwrap_or(DEFAULT_N_GPU_LAYERS)
    }

    pub fn gpu_type_or_default(&self) -> GpuType {
        self.gpu_type.unwrap_or_default()
    }

    pub fn temperature_or_default(&self) -> f32 {
        self.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Whether replies stream; on unless turned off.
    pub fn stream_enabled(&self) -> bool {
        self.stream.unwrap_or(true)
    }

    /// Prompt used when there is no repository context.
    pub fn system_prompt_or_default(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or(DEFAULT_SYSTEM_PROMPT)
    }
}
