//! llama.cpp engine behind the [`ChatModel`] trait.
//!
//! Each reply gets a fresh llama context: the whole transcript is rendered
//! through the model's chat template, decoded in one batch, then sampled one
//! token at a time by [`LlamaStream`].

use std::num::NonZeroU32;

use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::context::LlamaContext;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaChatTemplate, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use tokio_util::sync::CancellationToken;

use super::{ChatModel, DeltaStream, GatewayError, ModelLoader, ResolvedLoad, SamplingParams};
use crate::constants::{FALLBACK_CHAT_TEMPLATE, PROMPT_CHUNK_TOKENS, SAMPLER_SEED};
use crate::message::Message;

/// Loads GGUF files with llama.cpp.
pub struct LlamaLoader;

impl ModelLoader for LlamaLoader {
    fn load(&self, request: &ResolvedLoad) -> Result<Box<dyn ChatModel>, GatewayError> {
        let load_err = |reason: String| GatewayError::Load {
            path: request.model_path.clone(),
            reason,
        };

        let backend = LlamaBackend::init().map_err(|e| load_err(e.to_string()))?;
        let params =
            LlamaModelParams::default().with_n_gpu_layers(gpu_layers(request.gpu.n_gpu_layers));
        let model = LlamaModel::load_from_file(&backend, &request.model_path, &params)
            .map_err(|e| load_err(e.to_string()))?;
        let template = chat_template(&model, request.chat_format.as_deref())?;

        Ok(Box::new(LlamaChatModel {
            model,
            backend,
            template,
            n_ctx: request.n_ctx,
        }))
    }
}

/// A loaded llama.cpp model. The model is dropped before the backend.
pub struct LlamaChatModel {
    model: LlamaModel,
    backend: LlamaBackend,
    template: LlamaChatTemplate,
    n_ctx: u32,
}

impl LlamaChatModel {
    fn render_prompt(&self, transcript: &[Message]) -> Result<String, GatewayError> {
        let chat = transcript
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| GatewayError::Template(e.to_string()))?;
        self.model
            .apply_chat_template(&self.template, &chat, true)
            .map_err(|e| GatewayError::Template(e.to_string()))
    }
}

impl ChatModel for LlamaChatModel {
    fn stream<'a>(
        &'a mut self,
        transcript: &[Message],
        params: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<DeltaStream<'a>, GatewayError> {
        let this: &'a Self = self;
        let prompt = this.render_prompt(transcript)?;
        let tokens = this
            .model
            .str_to_token(&prompt, AddBos::Always)
            .map_err(decode_err)?;
        if tokens.is_empty() {
            return Err(GatewayError::Decode("prompt rendered to no tokens".to_string()));
        }
        let remaining = generation_budget(tokens.len(), params.max_tokens, this.n_ctx)?;

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(this.n_ctx))
            .with_n_batch(PROMPT_CHUNK_TOKENS as u32);
        let mut ctx = this
            .model
            .new_context(&this.backend, ctx_params)
            .map_err(decode_err)?;

        // decoded in chunks so a long prompt can still be interrupted
        let mut batch = LlamaBatch::new(PROMPT_CHUNK_TOKENS, 1);
        let last_index = tokens.len() - 1;
        for (chunk_index, chunk) in tokens.chunks(PROMPT_CHUNK_TOKENS).enumerate() {
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            batch.clear();
            let offset = chunk_index * PROMPT_CHUNK_TOKENS;
            for (i, token) in chunk.iter().enumerate() {
                let position = offset + i;
                // logits are only needed for the last prompt token
                batch
                    .add(*token, position as i32, &[0], position == last_index)
                    .map_err(decode_err)?;
            }
            ctx.decode(&mut batch).map_err(decode_err)?;
        }
        tracing::debug!(prompt_tokens = tokens.len(), remaining, "prompt decoded");

        Ok(Box::new(LlamaStream {
            model: &this.model,
            ctx,
            batch,
            sampler: sampler_for(params.temperature),
            cancel: cancel.clone(),
            position: tokens.len() as i32,
            remaining,
            pending: Vec::new(),
            done: false,
        }))
    }
}

/// Tokens left for the reply once the prompt is in the context window.
///
/// Fails only when the prompt alone leaves no room; otherwise `max_tokens`
/// is clamped to the free space.
fn generation_budget(
    prompt_tokens: usize,
    max_tokens: u32,
    n_ctx: u32,
) -> Result<u32, GatewayError> {
    let available = n_ctx as usize;
    if prompt_tokens >= available {
        return Err(GatewayError::ContextOverflow {
            needed: prompt_tokens,
            available,
        });
    }
    let free = u32::try_from(available - prompt_tokens).unwrap_or(u32::MAX);
    Ok(max_tokens.min(free))
}

/// Samples one token per step and yields text on UTF-8 boundaries.
struct LlamaStream<'a> {
    model: &'a LlamaModel,
    ctx: LlamaContext<'a>,
    batch: LlamaBatch,
    sampler: LlamaSampler,
    cancel: CancellationToken,
    position: i32,
    remaining: u32,
    pending: Vec<u8>,
    done: bool,
}

impl LlamaStream<'_> {
    fn step(&mut self) -> Result<Option<String>, GatewayError> {
        if self.cancel.is_cancelled() {
            self.done = true;
            return Err(GatewayError::Cancelled);
        }
        if self.remaining == 0 {
            self.done = true;
            return Ok(flush_lossy(&mut self.pending));
        }

        let token = self.sampler.sample(&self.ctx, self.batch.n_tokens() - 1);
        self.sampler.accept(token);
        if self.model.is_eog_token(token) {
            self.done = true;
            return Ok(flush_lossy(&mut self.pending));
        }

        let bytes = self
            .model
            .token_to_bytes(token, Special::Plaintext)
            .map_err(decode_err)?;
        self.pending.extend_from_slice(&bytes);
        self.remaining -= 1;

        if self.remaining > 0 {
            self.batch.clear();
            self.batch
                .add(token, self.position, &[0], true)
                .map_err(decode_err)?;
            self.position += 1;
            self.ctx.decode(&mut self.batch).map_err(decode_err)?;
        }

        Ok(take_utf8_prefix(&mut self.pending))
    }
}

impl Iterator for LlamaStream<'_> {
    type Item = Result<String, GatewayError>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            match self.step() {
                Ok(Some(delta)) => return Some(Ok(delta)),
                Ok(None) => {}
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        None
    }
}

fn decode_err(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Decode(err.to_string())
}

fn chat_template(
    model: &LlamaModel,
    chat_format: Option<&str>,
) -> Result<LlamaChatTemplate, GatewayError> {
    let named = |name: &str| {
        LlamaChatTemplate::new(name).map_err(|e| GatewayError::Template(e.to_string()))
    };
    match chat_format {
        Some(name) => named(name),
        None => match model.chat_template(None) {
            Ok(template) => Ok(template),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "model has no chat template, using {}",
                    FALLBACK_CHAT_TEMPLATE
                );
                named(FALLBACK_CHAT_TEMPLATE)
            }
        },
    }
}

fn sampler_for(temperature: f32) -> LlamaSampler {
    if temperature <= 0.0 {
        LlamaSampler::greedy()
    } else {
        LlamaSampler::chain_simple([LlamaSampler::temp(temperature), LlamaSampler::dist(SAMPLER_SEED)])
    }
}

/// Maps the CLI layer count to llama.cpp's: `-1` (or any negative) means all.
fn gpu_layers(n_gpu_layers: i32) -> u32 {
    u32::try_from(n_gpu_layers).unwrap_or(i32::MAX as u32)
}

/// Splits off the longest complete UTF-8 prefix of `pending`.
///
/// An incomplete trailing sequence stays buffered for the next token.
/// Bytes that can never form valid UTF-8 are replaced with U+FFFD.
fn take_utf8_prefix(pending: &mut Vec<u8>) -> Option<String> {
    let valid = match std::str::from_utf8(pending).map(str::len) {
        Ok(len) => len,
        Err(e) if e.error_len().is_some() => return flush_lossy(pending),
        Err(e) => e.valid_up_to(),
    };
    if valid == 0 {
        return None;
    }
    let rest = pending.split_off(valid);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    Some(text)
}

fn flush_lossy(pending: &mut Vec<u8>) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(pending).into_owned();
    pending.clear();
    Some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_budget_clamps_to_free_context() {
        assert_eq!(generation_budget(100, 512, 4096).unwrap(), 512);
        // a large repository prompt still gets the space that is left
        assert_eq!(generation_budget(32_300, 512, 32_768).unwrap(), 468);
        assert_eq!(generation_budget(4095, 512, 4096).unwrap(), 1);
    }

    #[test]
    fn test_generation_budget_rejects_prompt_that_fills_context() {
        let err = generation_budget(4096, 16, 4096).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::ContextOverflow {
                needed: 4096,
                available: 4096
            }
        ));
        assert!(generation_budget(5000, 16, 4096).is_err());
    }

    #[test]
    fn test_gpu_layers_negative_means_all() {
        assert_eq!(gpu_layers(-1), i32::MAX as u32);
        assert_eq!(gpu_layers(0), 0);
        assert_eq!(gpu_layers(35), 35);
    }

    #[test]
    fn test_take_utf8_prefix_holds_partial_character() {
        // "é" is 0xC3 0xA9; deliver it split across two tokens
        let mut pending = vec![b'c', b'a', b'f', 0xC3];
        assert_eq!(take_utf8_prefix(&mut pending).as_deref(), Some("caf"));
        assert_eq!(pending, vec![0xC3]);

        assert_eq!(take_utf8_prefix(&mut pending), None);
        pending.push(0xA9);
        assert_eq!(take_utf8_prefix(&mut pending).as_deref(), Some("é"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_take_utf8_prefix_replaces_invalid_bytes() {
        let mut pending = vec![b'a', 0xFF, b'b'];
        assert_eq!(take_utf8_prefix(&mut pending).as_deref(), Some("a\u{FFFD}b"));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_flush_lossy_empty_is_none() {
        let mut pending = Vec::new();
        assert_eq!(flush_lossy(&mut pending), None);
        let mut pending = vec![0xE2, 0x82];
        assert_eq!(flush_lossy(&mut pending).as_deref(), Some("\u{FFFD}"));
    }
}
