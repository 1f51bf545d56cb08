//! Transcript types for a tutoring session.
//!
//! This module defines the visible chat transcript ([`Transcript`] of
//! [`Message`]s) and the role/content pairs ([`ChatMessage`]) sent to the
//! completion endpoint.

use chrono::Local;
use serde::{Deserialize, Serialize};

/// Time label given to the initial greeting.
pub const GREETING_TIME_LABEL: &str = "just now";

/// Default greeting shown at the top of every transcript.
pub const DEFAULT_GREETING: &str =
    "Hello! I am BEX, your Bugbox Tutor 🤓. How can I help you today?";

// ============================================================================
// Sender / Direction
// ============================================================================

/// Who wrote a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// The student.
    User,
    /// BEX, including filter notices and error apologies.
    Assistant,
}

impl Sender {
    /// Presentation direction for this sender.
    #[must_use]
    pub const fn direction(self) -> Direction {
        match self {
            Self::User => Direction::Outgoing,
            Self::Assistant => Direction::Incoming,
        }
    }

    /// Role used when this sender's messages are sent to the model.
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::User => Role::User,
            Self::Assistant => Role::Assistant,
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// Which side of the chat a message is drawn on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Written by the student.
    Outgoing,
    /// Written by BEX.
    Incoming,
}

// ============================================================================
// Message
// ============================================================================

/// One transcript entry. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    text: String,
    sender: Sender,
    timestamp: String,
    direction: Direction,
}

impl Message {
    /// Creates a message stamped with the current local time (`HH:MM`).
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self::with_timestamp(sender, text, Local::now().format("%H:%M").to_string())
    }

    /// Creates a message with an explicit time label.
    #[must_use]
    pub fn with_timestamp(
        sender: Sender,
        text: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: timestamp.into(),
            direction: sender.direction(),
        }
    }

    /// Creates a student message.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// Creates a BEX message.
    #[must_use]
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, text)
    }

    /// Message body, possibly markdown.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Who wrote the message.
    #[must_use]
    pub const fn sender(&self) -> Sender {
        self.sender
    }

    /// Human-readable creation time.
    #[must_use]
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Presentation direction.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        self.direction
    }

    /// Converts the message into a role/content pair for the model.
    #[must_use]
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage::new(self.sender.role(), self.text.clone())
    }
}

// ============================================================================
// Transcript
// ============================================================================

/// Insertion-ordered conversation store.
///
/// The first entry is always the greeting. Entries are only ever appended;
/// [`Transcript::reset`] is the single way to drop them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Default for Transcript {
    fn default() -> Self {
        Self::new(DEFAULT_GREETING)
    }
}

impl Transcript {
    /// Creates a transcript holding only the greeting.
    ///
    /// # Examples
    ///
    /// ```
    /// use bex_tutor::{Sender, Transcript};
    ///
    /// let transcript = Transcript::new("Hi!");
    /// assert_eq!(transcript.len(), 1);
    /// assert_eq!(transcript.messages()[0].sender(), Sender::Assistant);
    /// ```
    #[must_use]
    pub fn new(greeting: impl Into<String>) -> Self {
        Self {
            messages: vec![Message::with_timestamp(
                Sender::Assistant,
                greeting,
                GREETING_TIME_LABEL,
            )],
        }
    }

    /// Appends a student message and returns a reference to it.
    pub fn push_user(&mut self, text: impl Into<String>) -> &Message {
        self.push(Message::user(text))
    }

    /// Appends a BEX message and returns a reference to it.
    pub fn push_assistant(&mut self, text: impl Into<String>) -> &Message {
        self.push(Message::assistant(text))
    }

    fn push(&mut self, message: Message) -> &Message {
        self.messages.push(message);
        let last = self.messages.len() - 1;
        &self.messages[last]
    }

    /// All messages in order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages, greeting included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Always `false`: the greeting is never removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Drops everything except the greeting.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
    }

    /// Maps the whole transcript to role/content pairs, greeting included.
    #[must_use]
    pub fn to_chat_messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().map(Message::to_chat_message).collect()
    }
}

// ============================================================================
// Model-facing messages
// ============================================================================

/// Role of a message in a completion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions establishing the tutor persona.
    System,
    /// The student.
    User,
    /// The tutor.
    Assistant,
}

/// A role/content pair as sent to the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: Role,
    /// What was said.
    pub content: String,
}

impl ChatMessage {
    /// Creates a new role/content pair.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a `system` message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}
