//! Command-line interface definition and dispatch for repochat.
//!
//! Uses [`clap`] for argument parsing with derive macros. Flag names follow
//! the underscore style of llama.cpp (`--n_ctx`, `--max_tokens`) except for
//! the repository options.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use crate::chat::{self, ChatOptions};
use crate::config::Config;
use crate::model::gpu::GpuType;
use crate::model::{LoadRequest, SamplingParams};

/// Top-level CLI structure for repochat.
///
/// Without a subcommand, repochat starts an interactive chat session using
/// the flags in [`ChatArgs`].
#[derive(Parser)]
#[command(
    name = "repochat",
    about = "Chat with a local LLM about a source repository"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub chat: ChatArgs,

    /// Show debug logs (including llama.cpp's)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Flags for the chat session. Unset flags fall back to the config file.
#[derive(Args, Debug, Default, Clone)]
pub struct ChatArgs {
    /// Path to the GGUF model file
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// Context window size [default: 32768]
    #[arg(long = "n_ctx")]
    pub n_ctx: Option<u32>,

    /// Number of layers to offload to GPU (-1 for all layers) [default: 0]
    #[arg(long = "n_gpu_layers", allow_negative_numbers = true)]
    pub n_gpu_layers: Option<i32>,

    /// GPU acceleration type [default: auto]
    #[arg(long = "gpu_type", value_enum)]
    pub gpu_type: Option<GpuType>,

    /// Sampling temperature [default: 0.7]
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Maximum number of tokens to generate [default: 512]
    #[arg(long = "max_tokens")]
    pub max_tokens: Option<u32>,

    /// Chat format to use (e.g. 'llama2', 'chatml', 'gemma')
    #[arg(long = "chat_format")]
    pub chat_format: Option<String>,

    /// Path to a repository to process and send to the LLM
    #[arg(long = "repo-path")]
    pub repo_path: Option<PathBuf>,

    /// Patterns to ignore when processing the repository (e.g. '*.log' 'node_modules/')
    #[arg(long = "repo-ignore", num_args = 0..)]
    pub repo_ignore: Option<Vec<String>>,

    /// Print each reply only once it is complete
    #[arg(long = "no-stream")]
    pub no_stream: bool,
}

/// Available subcommands for the repochat CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Subcommands for the `config` command.
///
/// Controls reading repochat's TOML configuration file stored at the XDG
/// config path (`~/.config/repochat/config.toml`).
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the merged configuration
    Show,
}

/// Parses command-line arguments into a [`Cli`] struct.
///
/// Delegates to [`clap::Parser::parse`], which exits the process on invalid input.
pub fn parse() -> Cli {
    Cli::parse()
}

/// Dispatches the parsed CLI command to its handler.
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Some(Commands::Config { action }) => {
            let config = Config::load()?;
            match action {
                ConfigAction::Show => {
                    let path = Config::config_path()?;
                    println!("{} {}", "Config path:".bold(), path.display());
                    println!("{} {}", "Context file:".bold(), Config::context_path()?.display());
                    println!();
                    let toml_str = toml::to_string_pretty(&config)?;
                    println!("{}", toml_str);
                }
            }
            Ok(())
        }
        None => {
            let config = Config::load()?;
            let options = resolve_options(&cli.chat, &config)?;
            run_session(options).await
        }
    }
}

/// Runs the blocking chat loop while the async side watches for Ctrl+C.
async fn run_session(options: ChatOptions) -> Result<()> {
    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn(watch_interrupt(shutdown.clone()));

    let token = shutdown.clone();
    let result = tokio::task::spawn_blocking(move || chat::run_chat(options, token)).await;

    watcher.abort();
    result?
}

/// Turns the first Ctrl+C into a shutdown request and a second one into an
/// immediate exit.
///
/// The chat thread only sees the request between units of work, so a model
/// load or a long prompt decode can hold it up. The forced exit leaves the
/// model memory to the OS, since the handle is still in use on that thread.
async fn watch_interrupt(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "could not install Ctrl+C handler");
        return;
    }
    tracing::debug!("interrupt received, shutting down");
    shutdown.cancel();
    println!();
    println!(
        "{}",
        "Interrupt received; stopping after the current step (Ctrl+C again to force exit).".dimmed()
    );

    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::debug!("second interrupt received, forcing exit");
        println!("{}", "Forced exit.".dimmed());
        std::process::exit(0);
    }
}

/// Combines flags, config and defaults. Priority: CLI flags > config > defaults.
pub fn resolve_options(args: &ChatArgs, config: &Config) -> Result<ChatOptions> {
    let model_path = args
        .model
        .clone()
        .or_else(|| config.model.as_ref().map(PathBuf::from))
        .ok_or_else(|| {
            anyhow::anyhow!("No model given. Pass --model <path.gguf> or set `model` in config.toml")
        })?;

    let temperature = args
        .temperature
        .unwrap_or_else(|| config.temperature_or_default());

    let load = LoadRequest {
        model_path,
        n_ctx: args.n_ctx.unwrap_or_else(|| config.n_ctx_or_default()),
        n_gpu_layers: args
            .n_gpu_layers
            .unwrap_or_else(|| config.n_gpu_layers_or_default()),
        gpu_type: args.gpu_type.unwrap_or_else(|| config.gpu_type_or_default()),
        chat_format: args.chat_format.clone().or_else(|| config.chat_format.clone()),
        temperature,
    };

    let sampling = SamplingParams {
        max_tokens: args
            .max_tokens
            .unwrap_or_else(|| config.max_tokens_or_default()),
        temperature,
    };

    Ok(ChatOptions {
        load,
        sampling,
        stream: !args.no_stream && config.stream_enabled(),
        repo_path: args.repo_path.clone(),
        repo_ignore: args
            .repo_ignore
            .clone()
            .unwrap_or_else(|| config.repo_ignore.clone()),
        default_prompt: config.system_prompt_or_default().to_string(),
        context_file: Config::context_path()?,
        history_file: Config::history_path()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_args(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("repochat").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parses_llama_style_flag_names() {
        let cli = parse_args(&[
            "--model",
            "m.gguf",
            "--n_ctx",
            "4096",
            "--n_gpu_layers",
            "-1",
            "--gpu_type",
            "cuda",
            "--temperature",
            "0.2",
            "--max_tokens",
            "64",
            "--chat_format",
            "chatml",
            "--repo-path",
            ".",
            "--repo-ignore",
            "*.log",
            "node_modules/",
        ]);
        let args = cli.chat;
        assert_eq!(args.model, Some(PathBuf::from("m.gguf")));
        assert_eq!(args.n_ctx, Some(4096));
        assert_eq!(args.n_gpu_layers, Some(-1));
        assert_eq!(args.gpu_type, Some(GpuType::Cuda));
        assert_eq!(args.temperature, Some(0.2));
        assert_eq!(args.max_tokens, Some(64));
        assert_eq!(args.chat_format.as_deref(), Some("chatml"));
        assert_eq!(args.repo_path, Some(PathBuf::from(".")));
        assert_eq!(
            args.repo_ignore,
            Some(vec!["*.log".to_string(), "node_modules/".to_string()])
        );
    }

    #[test]
    fn test_rejects_unknown_gpu_type() {
        let result = Cli::try_parse_from(["repochat", "--model", "m.gguf", "--gpu_type", "rocm"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_defaults_when_only_model_given() {
        let cli = parse_args(&["--model", "m.gguf"]);
        let options = resolve_options(&cli.chat, &Config::default()).unwrap();
        assert_eq!(options.load.n_ctx, 32_768);
        assert_eq!(options.load.n_gpu_layers, 0);
        assert_eq!(options.load.gpu_type, GpuType::Auto);
        assert_eq!(options.load.chat_format, None);
        assert_eq!(options.sampling.max_tokens, 512);
        assert_eq!(options.sampling.temperature, 0.7);
        assert!(options.stream);
        assert!(options.repo_path.is_none());
        assert!(options.repo_ignore.is_empty());
        assert_eq!(options.default_prompt, "You are a helpful assistant.");
    }

    #[test]
    fn test_flags_override_config() {
        let config = Config {
            model: Some("from-config.gguf".into()),
            max_tokens: Some(1024),
            temperature: Some(0.1),
            repo_ignore: vec!["target/".into()],
            ..Config::default()
        };

        let from_config = resolve_options(&ChatArgs::default(), &config).unwrap();
        assert_eq!(from_config.load.model_path, PathBuf::from("from-config.gguf"));
        assert_eq!(from_config.sampling.max_tokens, 1024);
        assert_eq!(from_config.load.temperature, 0.1);
        assert_eq!(from_config.repo_ignore, vec!["target/".to_string()]);

        let cli = parse_args(&["--model", "cli.gguf", "--max_tokens", "8", "--no-stream"]);
        let from_cli = resolve_options(&cli.chat, &config).unwrap();
        assert_eq!(from_cli.load.model_path, PathBuf::from("cli.gguf"));
        assert_eq!(from_cli.sampling.max_tokens, 8);
        assert_eq!(from_cli.sampling.temperature, 0.1);
        assert!(!from_cli.stream);
    }

    #[test]
    fn test_missing_model_is_an_error() {
        let err = resolve_options(&ChatArgs::default(), &Config::default()).unwrap_err();
        assert!(err.to_string().contains("--model"));
    }

    #[test]
    fn test_config_subcommand_parses_without_model() {
        let cli = parse_args(&["config", "show"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config {
                action: ConfigAction::Show
            })
        ));
    }
}
