//! Message and Conversation domain types.
//!
//! A conversation is owned by the caller's session. The allocator only reads
//! it; when a message has to be shrunk it produces a *new* `Message` through
//! [`Message::compressed_copy`] and never edits history in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a conversation (session).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user (user-facing turn)
    User,
    /// The model (model-facing turn)
    Assistant,
    /// System instructions
    System,
    /// Tool execution result, fed back to the model
    Tool,
}

/// Metadata key set on messages produced by compression.
pub const COMPRESSED_KEY: &str = "compressed";

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    #[serde(default = "new_id")]
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content, possibly embedding `[kind:payload]` media markers
    pub content: String,

    /// Timestamp
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Optional metadata (source tool, compression flags, etc.)
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

impl Message {
    /// Create a message with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a tool result message.
    pub fn tool(content: impl Into<String>) -> Self {
        Self::new(Role::Tool, content)
    }

    /// Build a new message carrying `content` in place of this one's.
    ///
    /// Identity, role and timestamp are kept so the copy can be matched back
    /// to the caller's authoritative history.
    pub fn compressed_copy(&self, content: impl Into<String>) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.insert(COMPRESSED_KEY.into(), serde_json::Value::Bool(true));
        Self {
            id: self.id.clone(),
            role: self.role,
            content: content.into(),
            timestamp: self.timestamp,
            metadata,
        }
    }

    /// Whether this message was produced by compression.
    pub fn is_compressed(&self) -> bool {
        self.metadata
            .get(COMPRESSED_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

/// A conversation is an ordered sequence of messages with shared context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID
    #[serde(default)]
    pub id: ConversationId,

    /// Ordered messages, oldest first
    #[serde(default)]
    pub messages: Vec<Message>,

    /// When this conversation was created
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// When the last message was added
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new empty conversation.
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Add a message to the conversation.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Replace the whole history, e.g. after a session-wide compaction.
    pub fn replace_messages(&mut self, messages: Vec<Message>) {
        self.updated_at = Utc::now();
        self.messages = messages;
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new()
    }
}
