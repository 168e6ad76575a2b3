//! Model gateway for repochat.
//!
//! [`ModelGateway`] owns the loaded model (the only engine handle in the
//! process) and exposes load / generate / release. The inference engine is
//! reached through the [`ModelLoader`] and [`ChatModel`] traits; the
//! llama.cpp implementation lives in [`llama`].

pub mod gpu;
pub mod llama;

use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;

use colored::Colorize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::message::Message;
use gpu::{GpuPlan, GpuProbe, GpuType};

/// Errors raised by the model gateway and its engine.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("model not loaded; call load first")]
    NotLoaded,

    #[error("failed to load model from {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    #[error("chat template error: {0}")]
    Template(String),

    #[error("prompt needs {needed} tokens but the context window holds {available}")]
    ContextOverflow { needed: usize, available: usize },

    #[error("generation failed: {0}")]
    Decode(String),

    #[error("generation cancelled")]
    Cancelled,
}

/// Lazy, finite sequence of text deltas. Dropping it abandons generation.
pub type DeltaStream<'a> = Box<dyn Iterator<Item = Result<String, GatewayError>> + 'a>;

/// Sampling parameters forwarded verbatim to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Everything needed to load a model.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub model_path: PathBuf,
    pub n_ctx: u32,
    /// Layers to offload; `-1` means all.
    pub n_gpu_layers: i32,
    pub gpu_type: GpuType,
    pub chat_format: Option<String>,
    pub temperature: f32,
}

/// Load parameters after GPU resolution, as handed to the engine.
#[derive(Debug, Clone)]
pub struct ResolvedLoad {
    pub model_path: PathBuf,
    pub n_ctx: u32,
    pub gpu: GpuPlan,
    pub chat_format: Option<String>,
}

/// A loaded model able to answer chat requests.
///
/// Engines check `cancel` between units of work and answer a cancelled
/// token with [`GatewayError::Cancelled`].
pub trait ChatModel {
    /// Starts generating a reply to `transcript`, yielding text deltas.
    fn stream<'a>(
        &'a mut self,
        transcript: &[Message],
        params: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<DeltaStream<'a>, GatewayError>;

    /// Generates the whole reply at once.
    fn complete(
        &mut self,
        transcript: &[Message],
        params: &SamplingParams,
        cancel: &CancellationToken,
    ) -> Result<String, GatewayError> {
        self.stream(transcript, params, cancel)?.collect()
    }
}

/// Constructs [`ChatModel`]s from resolved load parameters.
pub trait ModelLoader {
    fn load(&self, request: &ResolvedLoad) -> Result<Box<dyn ChatModel>, GatewayError>;
}

/// A reply as returned by [`ModelGateway::generate`].
pub enum Reply<'a> {
    Stream(DeltaStream<'a>),
    Complete(String),
}

/// Owns the model handle for the lifetime of a session.
pub struct ModelGateway {
    handle: Option<Box<dyn ChatModel>>,
}

impl ModelGateway {
    pub fn new() -> Self {
        Self { handle: None }
    }

    /// Wraps an already constructed model.
    pub fn with_model(model: Box<dyn ChatModel>) -> Self {
        Self {
            handle: Some(model),
        }
    }

    #[cfg(test)]
    pub fn is_loaded(&self) -> bool {
        self.handle.is_some()
    }

    /// Resolves GPU settings and loads the model, replacing any loaded one.
    ///
    /// # Errors
    ///
    /// Returns whatever the loader reports when the model file cannot be
    /// loaded. The gateway is left empty in that case.
    pub fn load(
        &mut self,
        request: &LoadRequest,
        loader: &dyn ModelLoader,
        probe: &dyn GpuProbe,
    ) -> Result<(), GatewayError> {
        self.release();

        let plan = gpu::resolve(request.gpu_type, request.n_gpu_layers, probe);
        if plan.layers_disabled {
            tracing::warn!(
                requested = request.n_gpu_layers,
                "n_gpu_layers is set but GPU acceleration is disabled; using 0"
            );
        }

        println!(
            "{} {}...",
            "Loading model from".bold(),
            request.model_path.display()
        );
        println!(
            "GPU acceleration: {} (n_gpu_layers={})",
            plan.accelerator.to_string().yellow(),
            plan.n_gpu_layers
        );
        tracing::debug!(
            n_ctx = request.n_ctx,
            temperature = request.temperature,
            chat_format = request.chat_format.as_deref().unwrap_or("<model default>"),
            "load parameters"
        );

        let resolved = ResolvedLoad {
            model_path: request.model_path.clone(),
            n_ctx: request.n_ctx,
            gpu: plan,
            chat_format: request.chat_format.clone(),
        };
        self.handle = Some(loader.load(&resolved)?);
        println!("{}", "Model loaded successfully!".green());
        Ok(())
    }

    /// Asks the loaded model for a reply, streamed or whole.
    ///
    /// Cancelling `cancel` stops the engine at its next check, which also
    /// cuts a non-streaming reply short.
    pub fn generate(
        &mut self,
        transcript: &[Message],
        params: &SamplingParams,
        streaming: bool,
        cancel: &CancellationToken,
    ) -> Result<Reply<'_>, GatewayError> {
        let model = self.handle.as_mut().ok_or(GatewayError::NotLoaded)?;
        if streaming {
            Ok(Reply::Stream(model.stream(transcript, params, cancel)?))
        } else {
            Ok(Reply::Complete(model.complete(transcript, params, cancel)?))
        }
    }

    /// Drops the model handle. Idempotent and never fails.
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            if panic::catch_unwind(AssertUnwindSafe(move || drop(handle))).is_err() {
                tracing::debug!("model teardown panicked; ignored");
            } else {
                tracing::debug!("model released");
            }
        }
    }
}

impl Drop for ModelGateway {
    fn drop(&mut self) {
        self.release();
    }
}


#[cfg(test)]
mod tests {
    use super::gpu::{Accelerator, FixedProbe};
    use super::testing::{ScriptedLoader, ScriptedModel};
    use super::*;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Collects formatted log output for assertions.
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Runs `f` under a WARN-level subscriber and returns its output.
    fn capture_warnings(f: impl FnOnce()) -> String {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = buffer.0.lock().unwrap().clone();
        String::from_utf8(bytes).unwrap()
    }

    fn request(n_gpu_layers: i32) -> LoadRequest {
        LoadRequest {
            model_path: PathBuf::from("models/tiny.gguf"),
            n_ctx: 4096,
            n_gpu_layers,
            gpu_type: GpuType::Auto,
            chat_format: Some("chatml".to_string()),
            temperature: 0.2,
        }
    }

    fn params() -> SamplingParams {
        SamplingParams {
            max_tokens: 64,
            temperature: 0.2,
        }
    }

    #[test]
    fn test_generate_before_load_is_not_loaded() {
        let mut gateway = ModelGateway::new();
        let transcript = [Message::system("sys")];
        let result = gateway.generate(&transcript, &params(), true, &CancellationToken::new());
        assert!(matches!(result, Err(GatewayError::NotLoaded)));
    }

    #[test]
    fn test_load_passes_resolved_gpu_plan() {
        let loader = ScriptedLoader::new();
        let mut gateway = ModelGateway::new();
        gateway
            .load(&request(20), &loader, &FixedProbe(Accelerator::None))
            .unwrap();
        assert!(gateway.is_loaded());

        let seen = loader.seen.borrow().clone().unwrap();
        assert_eq!(seen.gpu.accelerator, Accelerator::None);
        assert_eq!(seen.gpu.n_gpu_layers, 0);
        assert!(seen.gpu.layers_disabled);
        assert_eq!(seen.n_ctx, 4096);
        assert_eq!(seen.chat_format.as_deref(), Some("chatml"));
    }

    #[test]
    fn test_load_failure_leaves_gateway_empty() {
        let mut loader = ScriptedLoader::new();
        loader.fail = true;
        let mut gateway = ModelGateway::new();
        let err = gateway
            .load(&request(0), &loader, &FixedProbe(Accelerator::None))
            .unwrap_err();
        assert!(matches!(err, GatewayError::Load { .. }));
        assert!(!gateway.is_loaded());
    }

    #[test]
    fn test_release_twice_is_harmless() {
        let (model, calls) = ScriptedModel::new(&["hi"]);
        let mut gateway = ModelGateway::with_model(Box::new(model));
        gateway.release();
        assert!(!gateway.is_loaded());
        assert!(calls.borrow().dropped);
        gateway.release();
        assert!(!gateway.is_loaded());
    }

    #[test]
    fn test_streaming_and_complete_forward_params() {
        let (model, calls) = ScriptedModel::new(&["Hel", "lo"]);
        let mut gateway = ModelGateway::with_model(Box::new(model));
        let transcript = [Message::system("sys"), Message::user("hi")];

        let cancel = CancellationToken::new();
        let text = match gateway.generate(&transcript, &params(), true, &cancel).unwrap() {
            Reply::Stream(stream) => stream.collect::<Result<String, _>>().unwrap(),
            Reply::Complete(_) => panic!("expected a stream"),
        };
        assert_eq!(text, "Hello");

        match gateway.generate(&transcript, &params(), false, &cancel).unwrap() {
            Reply::Complete(text) => assert_eq!(text, "Hello"),
            Reply::Stream(_) => panic!("expected a complete reply"),
        }

        let calls = calls.borrow();
        assert_eq!(calls.generations, 2);
        assert_eq!(calls.last_prompt_len, 2);
        assert_eq!(calls.last_params, Some(params()));
    }

    #[test]
    fn test_disabled_gpu_layers_warn_exactly_once() {
        let logs = capture_warnings(|| {
            let mut gateway = ModelGateway::new();
            gateway
                .load(&request(20), &ScriptedLoader::new(), &FixedProbe(Accelerator::None))
                .unwrap();
        });
        assert_eq!(logs.matches("WARN").count(), 1, "logs: {logs}");
        assert!(logs.contains("GPU acceleration is disabled"));
        assert!(logs.contains("requested=20"));

        let quiet = capture_warnings(|| {
            let mut gateway = ModelGateway::new();
            gateway
                .load(&request(0), &ScriptedLoader::new(), &FixedProbe(Accelerator::None))
                .unwrap();
        });
        assert_eq!(quiet.matches("WARN").count(), 0, "logs: {quiet}");
    }

    #[test]
    fn test_cancel_stops_complete_reply_early() {
        let (mut model, calls) = ScriptedModel::new(&["one", "two", "three", "four"]);
        model.cancel_after = Some(2);
        let mut gateway = ModelGateway::with_model(Box::new(model));
        let transcript = [Message::system("sys"), Message::user("hi")];
        let cancel = CancellationToken::new();

        let result = gateway.generate(&transcript, &params(), false, &cancel);
        assert!(matches!(result, Err(GatewayError::Cancelled)));
        assert!(cancel.is_cancelled());
        assert_eq!(calls.borrow().yielded, 2);
    }
}
