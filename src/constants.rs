//! Centralized constants for repochat.
//!
//! All magic numbers, default strings, and configuration constants live here
//! so they can be changed in one place.

/// Application name used in CLI output and directory paths.
pub const APP_NAME: &str = "repochat";

/// Default system prompt used when no repository context is available.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// Instruction placed in front of repository context in the system message.
pub const CONTEXT_SYSTEM_PROMPT: &str =
    "You are an assistant that can only answer questions based on the content provided below:";

/// Configuration filename.
pub const CONFIG_FILENAME: &str = "config.toml";

/// Per-project configuration filename.
pub const PROJECT_CONFIG_FILENAME: &str = "repochat.toml";

/// Readline history filename.
pub const HISTORY_FILENAME: &str = "chat_history.txt";

/// Cached repository rendering, stored under the data directory.
pub const CONTEXT_FILENAME: &str = "context.txt";

// --- Generation defaults ---

/// Default context window size in tokens.
pub const DEFAULT_N_CTX: u32 = 32_768;

/// Default number of layers offloaded to the GPU.
pub const DEFAULT_N_GPU_LAYERS: i32 = 0;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Default cap on generated tokens per reply.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Chat template used when the model file carries none.
pub const FALLBACK_CHAT_TEMPLATE: &str = "chatml";

/// Seed passed to the distribution sampler (llama.cpp's "random seed" value).
pub const SAMPLER_SEED: u32 = 0xFFFF_FFFF;

/// Prompt tokens decoded per llama.cpp batch.
pub const PROMPT_CHUNK_TOKENS: usize = 512;

// --- GPU detection ---

/// Environment variable whose presence signals a CUDA environment.
pub const CUDA_ENV_VAR: &str = "CUDA_VISIBLE_DEVICES";

/// Conventional CUDA toolkit install location.
pub const CUDA_INSTALL_PATH: &str = "/usr/local/cuda";

// --- Repository flattening ---

/// Files larger than this are listed in the tree but their contents are skipped.
pub const FLATTEN_MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Byte threshold for binary file detection (check first N bytes for null).
pub const BINARY_DETECTION_BYTES: usize = 8192;
