use serde::{Deserialize, Serialize};

/// A persisted conversation thread owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub title: String,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    /// Unix timestamp in milliseconds. Bumped when a message is inserted.
    pub updated_at: i64,
}

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    /// Parse the stored column value. Unknown values map to `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One turn in a chat. Immutable once inserted; ordered by `created_at`
/// ascending within its chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub role: Role,
    /// Plain text, or a structured analysis payload as serialized JSON.
    pub text: String,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
}

/// Insert payload for a message. The repository assigns `id` and
/// `created_at` on insert.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub chat_id: String,
    pub role: Role,
    pub text: String,
    pub file_name: Option<String>,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
}

impl NewMessage {
    /// Convenience for messages without an attachment.
    pub fn text_only(chat_id: impl Into<String>, role: Role, text: impl Into<String>) -> Self {
        Self {
            chat_id: chat_id.into(),
            role,
            text: text.into(),
            file_name: None,
            file_type: None,
            file_size: None,
        }
    }
}

/// Which analysis model endpoint outgoing messages are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    Numerical,
    NonNumerical,
}

/// Current wall-clock time as Unix milliseconds.
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
