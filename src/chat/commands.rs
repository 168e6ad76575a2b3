//! Slash command handlers for the chat REPL.
//!
//! Dispatches `/history`, `/clear`, `/help`, and `/exit`. Only exact matches
//! are commands; any other input, slash or not, goes to the model.

use colored::Colorize;

use crate::format;
use crate::message::Transcript;

/// Action returned by slash command handling.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum CommandAction {
    /// Command was handled successfully; continue the REPL loop.
    Continue,
    /// Leave the REPL.
    Exit,
}

/// Dispatch and handle a slash command.
///
/// Returns `None` when `command` is not a known command.
pub(crate) fn handle_slash_command(
    command: &str,
    transcript: &mut Transcript,
) -> Option<CommandAction> {
    match command {
        "/history" => {
            println!(
                "{} {}",
                "system:".dimmed(),
                format::preview(transcript.system_prompt(), 80).dimmed()
            );
            println!();
            for msg in transcript.exchanges() {
                println!("{}", format::format_message(msg));
                println!();
            }
            Some(CommandAction::Continue)
        }
        "/clear" => {
            transcript.clear();
            println!("{}", "History cleared.".dimmed());
            Some(CommandAction::Continue)
        }
        "/help" => {
            println!("{}", "Commands:".bold());
            println!("  {} - show conversation history", "/history".cyan());
            println!("  {} - clear conversation (keeps the system message)", "/clear".cyan());
            println!("  {} - show this help", "/help".cyan());
            println!("  {} - exit", "/exit".cyan());
            println!("  {} - exit", "Ctrl+D".cyan());
            Some(CommandAction::Continue)
        }
        "/exit" | "/quit" => Some(CommandAction::Exit),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_keeps_system_turn() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("q").unwrap();
        transcript.push_assistant("a").unwrap();
        assert_eq!(
            handle_slash_command("/clear", &mut transcript),
            Some(CommandAction::Continue)
        );
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript.system_prompt(), "sys");
    }

    #[test]
    fn test_exit_and_unknown() {
        let mut transcript = Transcript::new("sys");
        assert_eq!(
            handle_slash_command("/exit", &mut transcript),
            Some(CommandAction::Exit)
        );
        assert_eq!(
            handle_slash_command("/quit", &mut transcript),
            Some(CommandAction::Exit)
        );
        assert_eq!(handle_slash_command("/usr/bin is where?", &mut transcript), None);
        assert_eq!(handle_slash_command("hello", &mut transcript), None);
    }

    #[test]
    fn test_history_does_not_modify_transcript() {
        let mut transcript = Transcript::new("sys");
        transcript.push_user("q").unwrap();
        transcript.push_assistant("a").unwrap();
        handle_slash_command("/history", &mut transcript);
        assert_eq!(transcript.len(), 3);
    }
}
