//! Tracing subscriber setup.
//!
//! Diagnostics go to stderr so they never interleave with streamed replies on
//! stdout. `RUST_LOG` wins when set; otherwise only warnings are shown, or
//! debug output for this crate with `--verbose`.

use std::io;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global subscriber. Safe to call more than once.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "warn,repochat=debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();

    // llama.cpp is chatty; only forward its logs when asked to
    llama_cpp_2::send_logs_to_tracing(llama_cpp_2::LogOptions::default().with_logs_enabled(verbose));
}
