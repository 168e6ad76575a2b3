//! System context for a chat session.
//!
//! The [`ContextBuilder`] turns a repository (or the rendering cached from a
//! previous run) into the system message. Repository renderings are cached
//! in a single well-known file that is overwritten on every flatten.

mod flatten;

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use thiserror::Error;

use crate::constants::{CONTEXT_SYSTEM_PROMPT, DEFAULT_SYSTEM_PROMPT};
pub use flatten::{RepoFlattener, WalkFlattener};

/// Errors raised while preparing repository context.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("repository path does not exist: {0}")]
    RepoNotFound(PathBuf),

    #[error("repository path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("failed to access context file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Builds the system message from repository content or a cached rendering.
pub struct ContextBuilder<F = WalkFlattener> {
    flattener: F,
    context_file: PathBuf,
    default_prompt: String,
}

impl ContextBuilder<WalkFlattener> {
    /// Builder caching renderings at `context_file`.
    pub fn new(context_file: impl Into<PathBuf>) -> Self {
        Self::with_flattener(WalkFlattener::new(), context_file)
    }
}

impl<F: RepoFlattener> ContextBuilder<F> {
    pub fn with_flattener(flattener: F, context_file: impl Into<PathBuf>) -> Self {
        Self {
            flattener,
            context_file: context_file.into(),
            default_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replaces the prompt used when no repository context is available.
    pub fn default_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.default_prompt = prompt.into();
        self
    }

    pub fn context_file(&self) -> &Path {
        &self.context_file
    }

    /// Flattens `path` and caches the rendering, overwriting any prior one.
    ///
    /// # Errors
    ///
    /// [`ContextError::RepoNotFound`] if `path` does not exist, otherwise
    /// whatever the flattener or the cache write reports.
    pub fn flatten_repository(
        &self,
        path: &Path,
        ignore_patterns: &[String],
    ) -> Result<String, ContextError> {
        if !path.exists() {
            return Err(ContextError::RepoNotFound(path.to_path_buf()));
        }
        if !path.is_dir() {
            return Err(ContextError::NotADirectory(path.to_path_buf()));
        }

        tracing::info!(repo = %path.display(), patterns = ?ignore_patterns, "flattening repository");
        let text = self.flattener.flatten(path, ignore_patterns)?;

        let io_err = |source| ContextError::Io {
            path: self.context_file.clone(),
            source,
        };
        if let Some(parent) = self.context_file.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        fs::write(&self.context_file, &text).map_err(io_err)?;
        tracing::info!(file = %self.context_file.display(), bytes = text.len(), "repository context saved");

        Ok(text)
    }

    /// Wraps context text with the answer-only-from-this-content instruction.
    pub fn build_system_message(text: &str) -> String {
        format!("{}\n\n{}", CONTEXT_SYSTEM_PROMPT, text)
    }

    /// System message from the cached rendering, or the default prompt.
    ///
    /// Never fails: a missing file yields the default prompt, and so does a
    /// read error after it is logged.
    pub fn load_cached_context(&self) -> String {
        if !self.context_file.exists() {
            return self.default_prompt.clone();
        }
        self.read_context_file()
    }

    /// Startup policy: flatten `repo_path` when given, else use the cache.
    ///
    /// Any failure while flattening is reported and answered with the
    /// default prompt so the session can still start.
    pub fn prepare(&self, repo_path: Option<&Path>, ignore_patterns: &[String]) -> String {
        let Some(repo) = repo_path else {
            return self.load_cached_context();
        };

        println!();
        println!("{} {}...", "Processing repository:".bold(), repo.display());
        match self.flatten_repository(repo, ignore_patterns) {
            Ok(_) => {
                println!(
                    "Repository processed. Content saved to {}",
                    self.context_file.display()
                );
                self.read_context_file()
            }
            Err(e) => {
                eprintln!("{} {}", "error:".red().bold(), e);
                println!();
                self.default_prompt.clone()
            }
        }
    }

    fn read_context_file(&self) -> String {
        match fs::read_to_string(&self.context_file) {
            Ok(content) => {
                println!(
                    "{}",
                    format!("Loaded {} as the system message.", self.context_file.display())
                        .dimmed()
                );
                Self::build_system_message(&content)
            }
            Err(e) => {
                tracing::warn!(file = %self.context_file.display(), error = %e, "failed to read context file");
                eprintln!(
                    "{} could not read {}: {}",
                    "warning:".yellow().bold(),
                    self.context_file.display(),
                    e
                );
                self.default_prompt.clone()
            }
        }
    }
}
