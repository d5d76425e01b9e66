use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

/// One unit of conversation content
///
/// User turns are final when appended. The assistant turn starts as an empty
/// placeholder whose content is replaced while the reply streams in, and is
/// finalized once the reply ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub id: Uuid,
    pub role: TurnRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_voice_input: bool,
    pub is_final: bool,
    pub error: Option<String>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>, is_voice_input: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: TurnRole::User,
            content: content.into(),
            created_at: Utc::now(),
            is_voice_input,
            is_final: true,
            error: None,
        }
    }

    /// Empty assistant turn that will be filled as the reply streams
    pub fn assistant_placeholder(id: Uuid) -> Self {
        Self {
            id,
            role: TurnRole::Assistant,
            content: String::new(),
            created_at: Utc::now(),
            is_voice_input: false,
            is_final: false,
            error: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}
