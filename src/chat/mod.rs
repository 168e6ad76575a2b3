//! Interactive chat REPL for repochat.
//!
//! Provides a multi-turn conversation loop using [`rustyline`] for readline
//! support (history, line editing). The full transcript is rendered into the
//! prompt on every turn so the model keeps the conversation's context.

mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tokio_util::sync::CancellationToken;

use crate::context::ContextBuilder;
use crate::format;
use crate::message::Transcript;
use crate::model::gpu::HostProbe;
use crate::model::llama::LlamaLoader;
use crate::model::{GatewayError, LoadRequest, ModelGateway, Reply, SamplingParams};
use crate::output::{Renderer, StdoutRenderer};

/// Everything a chat session needs, resolved from flags and config.
#[derive(Debug, Clone)]
pub struct ChatOptions {
    pub load: LoadRequest,
    pub sampling: SamplingParams,
    pub stream: bool,
    pub repo_path: Option<PathBuf>,
    pub repo_ignore: Vec<String>,
    /// System prompt used when no repository context is available.
    pub default_prompt: String,
    pub context_file: PathBuf,
    pub history_file: PathBuf,
}

/// What happened to one line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Blank input; nothing was generated.
    Skipped,
    /// A slash command was handled.
    Command,
    /// The model replied and both turns were recorded.
    Replied,
    /// Generation failed; the user turn was dropped.
    Failed,
    /// The user asked to leave.
    Exit,
    /// Shutdown was requested; any partial reply was abandoned.
    Interrupted,
}

/// A running conversation: the model gateway plus the transcript.
///
/// The session is the sole owner of the model handle; [`ChatSession::close`]
/// releases it.
pub struct ChatSession {
    gateway: ModelGateway,
    transcript: Transcript,
    sampling: SamplingParams,
    stream: bool,
    shutdown: CancellationToken,
}

impl ChatSession {
    pub fn new(
        gateway: ModelGateway,
        system_prompt: impl Into<String>,
        sampling: SamplingParams,
        stream: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            transcript: Transcript::new(system_prompt),
            sampling,
            stream,
            shutdown,
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Handles one line of user input.
    ///
    /// Blank lines are ignored. Anything that is not a known slash command
    /// is sent to the model; on success the user turn and the reply are
    /// appended to the transcript.
    ///
    /// # Errors
    ///
    /// Only for broken invariants, such as generating without a loaded model.
    /// Ordinary generation failures are rendered and reported as
    /// [`TurnOutcome::Failed`].
    pub fn handle_line(&mut self, line: &str, renderer: &mut dyn Renderer) -> Result<TurnOutcome> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(TurnOutcome::Skipped);
        }
        if self.shutdown.is_cancelled() {
            return Ok(TurnOutcome::Interrupted);
        }

        if let Some(action) = commands::handle_slash_command(line, &mut self.transcript) {
            return Ok(match action {
                commands::CommandAction::Continue => TurnOutcome::Command,
                commands::CommandAction::Exit => TurnOutcome::Exit,
            });
        }

        tracing::debug!(prompt = %format::preview(line, 60), "generating reply");
        self.transcript.push_user(line)?;
        renderer.render_start();

        match self.generate_reply(renderer) {
            Ok(Some(reply)) => {
                renderer.render_done();
                self.transcript.push_assistant(reply)?;
                Ok(TurnOutcome::Replied)
            }
            Ok(None) | Err(GatewayError::Cancelled) => {
                self.transcript.discard_pending_user();
                Ok(TurnOutcome::Interrupted)
            }
            Err(e @ GatewayError::NotLoaded) => {
                self.transcript.discard_pending_user();
                Err(e.into())
            }
            Err(e) => {
                self.transcript.discard_pending_user();
                renderer.render_error(&e.to_string());
                Ok(TurnOutcome::Failed)
            }
        }
    }

    /// Runs one generation. `None` means shutdown was requested meanwhile.
    fn generate_reply(
        &mut self,
        renderer: &mut dyn Renderer,
    ) -> Result<Option<String>, GatewayError> {
        let reply = self.gateway.generate(
            self.transcript.messages(),
            &self.sampling,
            self.stream,
            &self.shutdown,
        )?;

        match reply {
            Reply::Complete(text) => {
                if self.shutdown.is_cancelled() {
                    return Ok(None);
                }
                renderer.render_delta(&text);
                Ok(Some(text))
            }
            Reply::Stream(stream) => {
                let mut buffer = String::new();
                for delta in stream {
                    // dropping the stream abandons the rest of the generation
                    if self.shutdown.is_cancelled() {
                        return Ok(None);
                    }
                    let delta = delta?;
                    renderer.render_delta(&delta);
                    buffer.push_str(&delta);
                }
                if self.shutdown.is_cancelled() {
                    return Ok(None);
                }
                Ok(Some(buffer))
            }
        }
    }

    /// Ends the session and releases the model.
    pub fn close(mut self) {
        self.gateway.release();
    }
}

/// Runs the interactive chat REPL.
///
/// Loads the model, prepares the system message, then enters a readline
/// loop until end of input, `/exit`, or a shutdown request.
///
/// # Readline behavior
///
/// - **Ctrl+C**: shuts down (releases the model, then returns)
/// - **Ctrl+D**: exits cleanly with "goodbye."
/// - Readline history is persisted to `~/.cache/repochat/chat_history.txt`
///
/// # Errors
///
/// Fails if the model cannot be loaded or the terminal cannot be set up.
pub fn run_chat(options: ChatOptions, shutdown: CancellationToken) -> Result<()> {
    let mut gateway = ModelGateway::new();
    gateway
        .load(&options.load, &LlamaLoader, &HostProbe::new())
        .with_context(|| format!("Failed to load model {}", options.load.model_path.display()))?;

    if shutdown.is_cancelled() {
        gateway.release();
        print_shutdown();
        return Ok(());
    }

    println!();
    println!("{}", "=== Chat Completion ===".bold().cyan());

    let builder =
        ContextBuilder::new(&options.context_file).default_prompt(options.default_prompt.clone());
    let system_prompt = builder.prepare(options.repo_path.as_deref(), &options.repo_ignore);
    let mut session = ChatSession::new(
        gateway,
        system_prompt,
        options.sampling,
        options.stream,
        shutdown.clone(),
    );

    let model_name = options
        .load
        .model_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    println!(
        "{} [model: {}] (Ctrl+D to exit, /help for commands)",
        "repochat".bold().cyan(),
        model_name.yellow(),
    );
    println!(
        "{}",
        format!("context file: {}", builder.context_file().display()).dimmed()
    );
    println!();

    // Set up readline with persistent history
    let mut rl = DefaultEditor::new()?;
    if options.history_file.exists() {
        let _ = rl.load_history(&options.history_file);
    }

    let mut renderer = StdoutRenderer::new();
    let interrupted = loop {
        if shutdown.is_cancelled() {
            break true;
        }
        match rl.readline(&format!("{} ", ">".green().bold())) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    let _ = rl.add_history_entry(line.trim());
                }
                match session.handle_line(&line, &mut renderer)? {
                    TurnOutcome::Interrupted => break true,
                    TurnOutcome::Exit => break false,
                    _ => {}
                }
            }
            Err(ReadlineError::Interrupted) => break true,
            Err(ReadlineError::Eof) => break false,
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                break false;
            }
        }
    };

    // Save readline history
    if let Some(parent) = options.history_file.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = rl.save_history(&options.history_file);

    session.close();
    if interrupted {
        print_shutdown();
    } else {
        println!("{}", "goodbye.".dimmed());
    }
    Ok(())
}

fn print_shutdown() {
    println!();
    println!("{}", "Shutting down...".dimmed());
    println!("{}", "Model resources released. Goodbye.".dimmed());
}
