//! Entry point for repochat, a terminal chat client for local GGUF models
//! that can answer questions about a flattened source repository.
//!
//! This binary loads environment variables, parses CLI arguments via [`cli`],
//! sets up logging, and dispatches to the appropriate handler.

mod chat;
mod cli;
mod config;
mod constants;
mod context;
mod format;
mod logging;
mod message;
mod model;
mod output;

use anyhow::Result;

/// Runs the repochat CLI.
///
/// Loads `.env` files (silently ignored if absent), parses command-line
/// arguments into a [`cli::Cli`] struct, and dispatches via [`cli::run`].
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = cli::parse();
    logging::init(cli.verbose);
    cli::run(cli).await
}
