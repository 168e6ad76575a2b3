//! Output rendering abstraction for repochat.
//!
//! Defines the [`Renderer`] trait that decouples model output from the
//! terminal. [`StdoutRenderer`] prints deltas directly to stdout; tests use
//! an in-memory renderer instead.

use colored::Colorize;
use std::io::{self, Write};

/// Trait for rendering model output.
pub trait Renderer {
    /// Called once before the first delta of a reply.
    fn render_start(&mut self);

    /// Render a single text delta as it arrives.
    fn render_delta(&mut self, delta: &str);

    /// Called when the full response is complete.
    fn render_done(&mut self);

    /// Called when an error occurs during generation.
    fn render_error(&mut self, err: &str);
}

/// Renders streaming model output directly to stdout.
///
/// Each delta is printed immediately with an explicit flush so the user
/// sees a "typing" effect. Nothing is buffered across deltas.
pub struct StdoutRenderer {
    delta_count: usize,
}

impl StdoutRenderer {
    pub fn new() -> Self {
        Self { delta_count: 0 }
    }
}

impl Renderer for StdoutRenderer {
    fn render_start(&mut self) {
        self.delta_count = 0;
        println!("{}", "generating...".dimmed());
        println!();
    }

    fn render_delta(&mut self, delta: &str) {
        print!("{}", delta);
        // Flush immediately so each delta appears as it arrives
        io::stdout().flush().ok();
        self.delta_count += 1;
    }

    fn render_done(&mut self) {
        println!(); // Final newline after stream ends
        println!();
        tracing::debug!(deltas = self.delta_count, "reply complete");
    }

    fn render_error(&mut self, err: &str) {
        eprintln!();
        eprintln!("{} {}", "error:".red().bold(), err);
    }
}
