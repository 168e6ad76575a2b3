use colored::Colorize;

use crate::message::{Message, Role};

/// Format a message for terminal display with role label and colors.
pub fn format_message(msg: &Message) -> String {
    let label = format_role_label(&msg.role);
    let body = format_body(msg.text(), &msg.role);
    format!("{}\n{}", label, body)
}

fn format_role_label(role: &Role) -> String {
    match role {
        Role::User => format!("{}", "you:".green().bold()),
        Role::Assistant => format!("{}", "model:".cyan().bold()),
        Role::System => format!("{}", "system:".dimmed()),
    }
}

fn format_body(text: &str, role: &Role) -> String {
    match role {
        Role::System => text.dimmed().to_string(),
        _ => text.to_string(),
    }
}

/// Shortens long text to `max_chars` characters for one-line previews.
pub fn preview(text: &str, max_chars: usize) -> String {
    let first_line = text.lines().next().unwrap_or_default();
    if first_line.chars().count() > max_chars || text.lines().nth(1).is_some() {
        let truncated: String = first_line.chars().take(max_chars).collect();
        format!("{}...", truncated)
    } else {
        first_line.to_string()
    }
}
