//! Persistence boundaries.  Every operation is scoped by the owning user;
//! a record owned by someone else is reported as not found.

use async_trait::async_trait;
use taskwright_core::{AgentTaskResult, ConversationRole};

use crate::{AgentTask, Conversation, ConversationId, QueueError, StoredMessage, TaskId, TaskStatus};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: AgentTask) -> Result<(), QueueError>;

    async fn get(&self, task_id: &TaskId, user_id: &str) -> Result<AgentTask, QueueError>;

    /// Validated status change.
    async fn update_status(
        &self,
        task_id: &TaskId,
        user_id: &str,
        status: TaskStatus,
    ) -> Result<(), QueueError>;

    /// Move the task to `Processing` under `lease` and count the attempt.
    ///
    /// Succeeds for a `Queued` task, or a `Processing` task already held by
    /// the same lease (a retry).  Any other holder gets
    /// [`QueueError::AlreadyClaimed`].
    async fn claim(&self, task_id: &TaskId, user_id: &str, lease: &str)
        -> Result<AgentTask, QueueError>;

    /// Store a successful result and mark the task `Completed`.
    async fn set_result(
        &self,
        task_id: &TaskId,
        user_id: &str,
        result: &AgentTaskResult,
    ) -> Result<(), QueueError>;

    /// Record an error.  `terminal` also marks the task `Failed`; otherwise
    /// it stays `Processing` awaiting a retry.
    async fn set_error(
        &self,
        task_id: &TaskId,
        user_id: &str,
        error: &str,
        terminal: bool,
    ) -> Result<(), QueueError>;
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Returns the conversation and whether this call created it.
    async fn get_or_create(
        &self,
        id: &ConversationId,
        user_id: &str,
        title: &str,
    ) -> Result<(Conversation, bool), QueueError>;

    async fn get(&self, id: &ConversationId, user_id: &str) -> Result<Conversation, QueueError>;

    async fn append_message(
        &self,
        id: &ConversationId,
        user_id: &str,
        role: ConversationRole,
        content: &str,
    ) -> Result<StoredMessage, QueueError>;

    /// Messages in insertion order.
    async fn list_messages(
        &self,
        id: &ConversationId,
        user_id: &str,
    ) -> Result<Vec<StoredMessage>, QueueError>;

    /// Bump `updated_at`.
    async fn touch(&self, id: &ConversationId, user_id: &str) -> Result<(), QueueError>;
}
