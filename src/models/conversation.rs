use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Sliding expiry window for a conversation. A session that goes quiet for
/// this long starts over with empty history.
pub const CONVERSATION_TTL_MINUTES: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: String,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub user_id: i64,
    pub messages: Vec<ConversationMessage>,
    pub last_activity: NaiveDateTime,
    pub expires_at: NaiveDateTime,
}

impl Conversation {
    pub fn new(user_id: i64, now: NaiveDateTime) -> Self {
        Self {
            user_id,
            messages: vec![],
            last_activity: now,
            expires_at: now + Duration::minutes(CONVERSATION_TTL_MINUTES),
        }
    }

    /// Records a full exchange and slides the expiry window forward.
    pub fn record_turn(&mut self, user_message: &str, assistant_reply: &str, now: NaiveDateTime) {
        self.messages.push(ConversationMessage::user(user_message));
        self.messages
            .push(ConversationMessage::assistant(assistant_reply));
        self.last_activity = now;
        self.expires_at = now + Duration::minutes(CONVERSATION_TTL_MINUTES);
    }
}
