//! In-memory repositories used by the CLI and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use taskwright_core::{AgentTaskResult, ConversationRole};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::{
    AgentTask, Conversation, ConversationId, ConversationRepository, QueueError, StoredMessage,
    TaskId, TaskRepository, TaskStatus,
};

#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: RwLock<HashMap<TaskId, AgentTask>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every task owned by `user_id`, oldest first.
    pub async fn list_for(&self, user_id: &str) -> Vec<AgentTask> {
        let mut out: Vec<AgentTask> = self
            .tasks
            .read()
            .await
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.created_at);
        out
    }
}

fn owned<'a>(
    tasks: &'a mut HashMap<TaskId, AgentTask>,
    task_id: &TaskId,
    user_id: &str,
) -> Result<&'a mut AgentTask, QueueError> {
    tasks
        .get_mut(task_id)
        .filter(|t| t.user_id == user_id)
        .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))
}

fn transition(task: &mut AgentTask, to: TaskStatus) -> Result<(), QueueError> {
    if !task.status.can_transition_to(to) {
        return Err(QueueError::InvalidStateTransition { from: task.status, to });
    }
    task.status = to;
    if to.is_terminal() {
        task.completed_at = Some(Utc::now());
        task.lease = None;
    }
    Ok(())
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn create(&self, task: AgentTask) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.task_id) {
            return Err(QueueError::Storage(format!("task {} already exists", task.task_id)));
        }
        tasks.insert(task.task_id.clone(), task);
        Ok(())
    }

    async fn get(&self, task_id: &TaskId, user_id: &str) -> Result<AgentTask, QueueError> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .filter(|t| t.user_id == user_id)
            .cloned()
            .ok_or_else(|| QueueError::TaskNotFound(task_id.to_string()))
    }

    async fn update_status(
        &self,
        task_id: &TaskId,
        user_id: &str,
        status: TaskStatus,
    ) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().await;
        transition(owned(&mut tasks, task_id, user_id)?, status)
    }

    async fn claim(
        &self,
        task_id: &TaskId,
        user_id: &str,
        lease: &str,
    ) -> Result<AgentTask, QueueError> {
        let mut tasks = self.tasks.write().await;
        let task = owned(&mut tasks, task_id, user_id)?;
        match (task.status, task.lease.as_deref()) {
            (TaskStatus::Queued, _) => {}
            (TaskStatus::Processing, Some(held)) if held == lease => {}
            (TaskStatus::Processing, _) => {
                return Err(QueueError::AlreadyClaimed(task_id.to_string()))
            }
            _ => {}
        }
        transition(task, TaskStatus::Processing)?;
        task.lease = Some(lease.to_string());
        task.attempts += 1;
        debug!(task_id = %task_id, attempt = task.attempts, "task claimed");
        Ok(task.clone())
    }

    async fn set_result(
        &self,
        task_id: &TaskId,
        user_id: &str,
        result: &AgentTaskResult,
    ) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().await;
        let task = owned(&mut tasks, task_id, user_id)?;
        transition(task, TaskStatus::Completed)?;
        task.result = Some(result.text.clone());
        task.error = None;
        task.metadata = result.metadata.clone();
        Ok(())
    }

    async fn set_error(
        &self,
        task_id: &TaskId,
        user_id: &str,
        error: &str,
        terminal: bool,
    ) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().await;
        let task = owned(&mut tasks, task_id, user_id)?;
        if terminal {
            transition(task, TaskStatus::Failed)?;
        }
        task.error = Some(error.to_string());
        Ok(())
    }
}

#[derive(Default)]
struct ConversationStore {
    conversations: HashMap<ConversationId, Conversation>,
    messages: HashMap<ConversationId, Vec<StoredMessage>>,
}

#[derive(Default)]
pub struct InMemoryConversationRepository {
    inner: RwLock<ConversationStore>,
}

impl InMemoryConversationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conversations owned by `user_id`.
    pub async fn count_for(&self, user_id: &str) -> usize {
        self.inner
            .read()
            .await
            .conversations
            .values()
            .filter(|c| c.user_id == user_id)
            .count()
    }
}

fn owned_conversation<'a>(
    store: &'a ConversationStore,
    id: &ConversationId,
    user_id: &str,
) -> Result<&'a Conversation, QueueError> {
    store
        .conversations
        .get(id)
        .filter(|c| c.user_id == user_id)
        .ok_or_else(|| QueueError::ConversationNotFound(id.to_string()))
}

#[async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn get_or_create(
        &self,
        id: &ConversationId,
        user_id: &str,
        title: &str,
    ) -> Result<(Conversation, bool), QueueError> {
        let mut store = self.inner.write().await;
        if let Some(existing) = store.conversations.get(id) {
            // A foreign conversation with this id is not ours to reuse.
            if existing.user_id != user_id {
                return Err(QueueError::ConversationNotFound(id.to_string()));
            }
            return Ok((existing.clone(), false));
        }
        let now = Utc::now();
        let conv = Conversation {
            id: id.clone(),
            user_id: user_id.to_string(),
            title: title.to_string(),
            created_at: now,
            updated_at: now,
        };
        store.conversations.insert(id.clone(), conv.clone());
        store.messages.insert(id.clone(), Vec::new());
        Ok((conv, true))
    }

    async fn get(&self, id: &ConversationId, user_id: &str) -> Result<Conversation, QueueError> {
        let store = self.inner.read().await;
        owned_conversation(&store, id, user_id).cloned()
    }

    async fn append_message(
        &self,
        id: &ConversationId,
        user_id: &str,
        role: ConversationRole,
        content: &str,
    ) -> Result<StoredMessage, QueueError> {
        let mut store = self.inner.write().await;
        owned_conversation(&store, id, user_id)?;
        let msg = StoredMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: id.clone(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        store.messages.entry(id.clone()).or_default().push(msg.clone());
        Ok(msg)
    }

    async fn list_messages(
        &self,
        id: &ConversationId,
        user_id: &str,
    ) -> Result<Vec<StoredMessage>, QueueError> {
        let store = self.inner.read().await;
        owned_conversation(&store, id, user_id)?;
        Ok(store.messages.get(id).cloned().unwrap_or_default())
    }

    async fn touch(&self, id: &ConversationId, user_id: &str) -> Result<(), QueueError> {
        let mut store = self.inner.write().await;
        owned_conversation(&store, id, user_id)?;
        if let Some(conv) = store.conversations.get_mut(id) {
            conv.updated_at = Utc::now();
        }
        Ok(())
    }
}
