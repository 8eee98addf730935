//! Ordered, append-only conversation record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Originator {
    /// The human speaking to the assistant.
    User,
    /// The assistant.
    Assistant,
}

impl Originator {
    /// Role string used in generation context.
    #[must_use]
    pub fn role(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One exchanged message. Immutable after append, except for the one-time
/// screen-context tag.
#[derive(Debug, Clone)]
pub struct ConversationMessage {
    /// Unique message id.
    pub id: Uuid,
    /// Message text.
    pub text: String,
    /// Append time.
    pub timestamp: DateTime<Utc>,
    /// Who produced it.
    pub originator: Originator,
    /// Whether a screen snapshot accompanied this message to generation.
    pub has_screen_context: bool,
}

/// A `{role, content}` pair as consumed by the generation gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatEntry {
    /// "user" or "assistant".
    pub role: &'static str,
    /// Message text.
    pub content: String,
}

/// Insertion-ordered message log. Unbounded for display; a bounded
/// trailing window is exposed as generation context.
#[derive(Debug, Default)]
pub struct ConversationLog {
    messages: Vec<ConversationMessage>,
}

impl ConversationLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return it.
    pub fn append(&mut self, text: impl Into<String>, originator: Originator) -> ConversationMessage {
        let message = ConversationMessage {
            id: Uuid::new_v4(),
            text: text.into(),
            timestamp: Utc::now(),
            originator,
            has_screen_context: false,
        };
        self.messages.push(message.clone());
        message
    }

    /// The last `window` messages mapped to role/content pairs, oldest
    /// first.
    #[must_use]
    pub fn history(&self, window: usize) -> Vec<ChatEntry> {
        let start = self.messages.len().saturating_sub(window);
        self.messages[start..]
            .iter()
            .map(|m| ChatEntry {
                role: m.originator.role(),
                content: m.text.clone(),
            })
            .collect()
    }

    /// Tag the message with the given id as screen-augmented. Applied at
    /// most once, to the message that triggered a screen capture.
    pub fn tag_screen_context(&mut self, id: Uuid) {
        if let Some(message) = self.messages.iter_mut().find(|m| m.id == id) {
            message.has_screen_context = true;
        }
    }

    /// Remove all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Read-only view of the full message list, in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Number of messages in the log.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
