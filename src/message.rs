//! Message types for repochat's conversation history.
//!
//! Provides a [`Message`] type with a [`Role`] and the [`Transcript`] that
//! owns the ordered turns of one chat session. The transcript keeps the
//! system turn first and makes user and assistant turns alternate.

use anyhow::{bail, Result};

/// A single turn in a conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

/// The role of a message sender in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    /// Role name as understood by chat templates.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }
    pub fn text(&self) -> &str {
        &self.content
    }
}

/// Ordered turns of one session.
///
/// Exactly one system turn, always first and never replaced. After it, user
/// and assistant turns alternate, starting with a user turn.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Starts a transcript with its system turn.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// All turns, system turn first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        self.messages[0].text()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True when a user turn is waiting for its reply.
    pub fn has_pending_user(&self) -> bool {
        self.messages
            .last()
            .is_some_and(|m| m.role == Role::User)
    }

    /// Appends a user turn. Fails if the previous user turn has no reply yet.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<()> {
        if self.has_pending_user() {
            bail!("a user turn is already waiting for a reply");
        }
        self.messages.push(Message::user(text));
        Ok(())
    }

    /// Appends the reply to the pending user turn.
    pub fn push_assistant(&mut self, text: impl Into<String>) -> Result<()> {
        if !self.has_pending_user() {
            bail!("assistant turn without a preceding user turn");
        }
        self.messages.push(Message::assistant(text));
        Ok(())
    }

    /// Drops the pending user turn, if any, returning it.
    pub fn discard_pending_user(&mut self) -> Option<Message> {
        if self.has_pending_user() {
            self.messages.pop()
        } else {
            None
        }
    }

    /// Removes every turn except the system turn.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    /// Turns after the system turn.
    pub fn exchanges(&self) -> &[Message] {
        &self.messages[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_transcript_has_only_system_turn() {
        let t = Transcript::new("be brief");
        assert_eq!(t.len(), 1);
        assert_eq!(t.messages()[0].role, Role::System);
        assert_eq!(t.system_prompt(), "be brief");
        assert!(t.exchanges().is_empty());
    }

    #[test]
    fn test_turns_must_alternate() {
        let mut t = Transcript::new("sys");
        assert!(t.push_assistant("too early").is_err());
        t.push_user("hi").unwrap();
        assert!(t.push_user("again").is_err());
        t.push_assistant("hello").unwrap();
        assert!(t.push_assistant("twice").is_err());
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn test_discard_pending_user() {
        let mut t = Transcript::new("sys");
        assert!(t.discard_pending_user().is_none());
        t.push_user("question").unwrap();
        let dropped = t.discard_pending_user().unwrap();
        assert_eq!(dropped.text(), "question");
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_clear_keeps_system_turn() {
        let mut t = Transcript::new("sys");
        t.push_user("a").unwrap();
        t.push_assistant("b").unwrap();
        t.clear();
        assert_eq!(t.len(), 1);
        assert_eq!(t.system_prompt(), "sys");
    }
}
