// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskwright_core::{ConversationMessage, ConversationRole, TaskMetadata};

use crate::{ConversationId, TaskId, TaskStatus};

/// A submitted natural-language task and everything persisted about it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentTask {
    pub task_id: TaskId,
    pub user_id: String,
    pub description: String,
    pub conversation_id: ConversationId,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: TaskMetadata,
    /// Number of processing attempts started so far.
    #[serde(default)]
    pub attempts: u32,
    /// Claim held by the worker processing this task.
    #[serde(skip)]
    pub lease: Option<String>,
}

impl AgentTask {
    /// New `Queued` task.  Without an explicit conversation the task gets its
    /// own, derived from the task id.
    pub fn new(
        user_id: impl Into<String>,
        description: impl Into<String>,
        conversation_id: Option<ConversationId>,
    ) -> Self {
        let task_id = TaskId::generate();
        let conversation_id = conversation_id.unwrap_or_else(|| ConversationId::for_task(&task_id));
        Self {
            task_id,
            user_id: user_id.into(),
            description: description.into(),
            conversation_id,
            status: TaskStatus::Queued,
            result: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
            metadata: TaskMetadata::default(),
            attempts: 0,
            lease: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub conversation_id: ConversationId,
    pub role: ConversationRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    pub fn to_history(&self) -> ConversationMessage {
        ConversationMessage { role: self.role, content: self.content.clone() }
    }
}
