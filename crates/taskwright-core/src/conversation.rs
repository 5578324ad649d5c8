use serde::{Deserialize, Serialize};
use taskwright_model::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One prior turn of a conversation, replayed ahead of the task description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: ConversationRole,
    pub content: String,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ConversationRole::Assistant, content: content.into() }
    }

    pub(crate) fn to_model(&self) -> Message {
        match self.role {
            ConversationRole::User => Message::user(&self.content),
            ConversationRole::Assistant => Message::assistant(&self.content),
        }
    }
}

/// Everything one execution needs from its caller.
#[derive(Debug, Clone, Default)]
pub struct TaskRequest {
    /// Used for log correlation only.
    pub task_id: Option<String>,
    pub user_id: String,
    pub description: String,
    pub history: Vec<ConversationMessage>,
}

impl TaskRequest {
    pub fn new(user_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            task_id: None,
            user_id: user_id.into(),
            description: description.into(),
            history: Vec::new(),
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<ConversationMessage>) -> Self {
        self.history = history;
        self
    }

    /// History followed by the description as a fresh user turn.
    pub(crate) fn initial_messages(&self) -> Vec<Message> {
        self.history
            .iter()
            .map(ConversationMessage::to_model)
            .chain(std::iter::once(Message::user(&self.description)))
            .collect()
    }
}
