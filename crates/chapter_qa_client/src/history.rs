//! Conversation log for one chat session. Append-only between resets.

use serde::{Deserialize, Serialize};

/// Speaker of one conversation turn. Serialized lowercase on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

/// Chat session state: the ordered conversation log between resets.
///
/// Turns are appended in chronological order and sent back to the server as
/// context with every question. The log is cleared on "new chat" and on
/// chapter selection, and lives only in memory.
#[derive(Debug, Default, Clone)]
pub struct ChatSession {
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the user's question. Called before the network request is
    /// issued so a failed request does not lose the question from the log.
    pub fn push_user(&mut self, content: &str) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: content.to_string(),
        });
    }

    /// Record a completed assistant answer.
    pub fn push_assistant(&mut self, content: &str) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: content.to_string(),
        });
    }

    /// Clear the log. Used by "new chat" and by chapter selection; safe to
    /// call any number of times.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
