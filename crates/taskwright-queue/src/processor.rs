// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use taskwright_core::{
    AgentExecutor, AgentOutcome, AgentTaskResult, ConversationMessage, ConversationRole, TaskRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    ConversationId, ConversationRepository, QueueError, RetryPolicy, TaskId, TaskRepository,
    TaskStatus,
};

const TITLE_CHARS: usize = 80;

/// One unit of queued work.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskJob {
    pub task_id: TaskId,
    pub user_id: String,
    pub description: String,
    /// Existing conversation to continue.  `None` gives the task its own.
    pub conversation_id: Option<ConversationId>,
}

/// Where the history for one attempt came from.
struct ResolvedConversation {
    id: ConversationId,
    history: Vec<ConversationMessage>,
    /// The description still has to be stored as a user turn.
    append_description: bool,
}

/// Side effects already carried out for a job, kept across its attempts.
#[derive(Default)]
struct Progress {
    result: Option<AgentTaskResult>,
    description_stored: bool,
    reply_stored: bool,
}

/// Runs queued jobs against the executor and persists the outcome.
pub struct BackgroundProcessor {
    executor: AgentExecutor,
    tasks: Arc<dyn TaskRepository>,
    conversations: Arc<dyn ConversationRepository>,
    retry: RetryPolicy,
}

impl BackgroundProcessor {
    pub fn new(
        executor: AgentExecutor,
        tasks: Arc<dyn TaskRepository>,
        conversations: Arc<dyn ConversationRepository>,
        retry: RetryPolicy,
    ) -> Self {
        Self { executor, tasks, conversations, retry }
    }

    pub fn tasks(&self) -> &Arc<dyn TaskRepository> {
        &self.tasks
    }

    /// Run a job through the retry schedule and return the final status.
    ///
    /// Errors are returned only when the task never became ours (missing,
    /// claimed by another worker, already terminal); the task record is left
    /// untouched in that case.
    pub async fn run_job(
        &self,
        job: &TaskJob,
        cancel: CancellationToken,
    ) -> Result<TaskStatus, QueueError> {
        let lease = Uuid::new_v4().to_string();
        let mut progress = Progress::default();
        let mut retry = 0usize;
        loop {
            let err = match self.process_task(job, &lease, &cancel, &mut progress).await {
                Ok(()) => return Ok(TaskStatus::Completed),
                Err(e) if e.is_ownership() => {
                    warn!(task_id = %job.task_id, "job skipped: {e}");
                    return Err(e);
                }
                Err(e) => e,
            };

            let delay = if err.is_retryable() && !cancel.is_cancelled() {
                self.retry.delay_for(retry)
            } else {
                None
            };
            let Some(delay) = delay else {
                error!(task_id = %job.task_id, attempts = retry + 1, "task failed permanently: {err}");
                self.persist_error(job, &err, true).await;
                return Ok(TaskStatus::Failed);
            };

            retry += 1;
            warn!(
                task_id = %job.task_id,
                attempt = retry,
                delay_secs = delay.as_secs(),
                "attempt failed, retrying: {err}"
            );
            self.persist_error(job, &err, false).await;

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    self.persist_error(job, &QueueError::Execution("task was cancelled".into()), true).await;
                    return Ok(TaskStatus::Failed);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Fail a task that will never reach a worker, e.g. one still buffered
    /// when the queue shuts down.
    pub async fn abandon(&self, job: &TaskJob, reason: &str) {
        if let Err(e) = self
            .tasks
            .update_status(&job.task_id, &job.user_id, TaskStatus::Processing)
            .await
        {
            warn!(task_id = %job.task_id, "cannot abandon task: {e}");
            return;
        }
        info!(task_id = %job.task_id, "task abandoned: {reason}");
        self.persist_error(job, &QueueError::Execution(reason.to_string()), true).await;
    }

    /// One attempt: claim the task, resolve its conversation, run the agent
    /// and persist the reply.  Steps recorded in `progress` by an earlier
    /// attempt are not repeated; a run that already succeeded is never
    /// executed again.
    async fn process_task(
        &self,
        job: &TaskJob,
        lease: &str,
        cancel: &CancellationToken,
        progress: &mut Progress,
    ) -> Result<(), QueueError> {
        let task = self.tasks.claim(&job.task_id, &job.user_id, lease).await?;
        info!(task_id = %job.task_id, user_id = %job.user_id, attempt = task.attempts, "processing task");

        let conv = self.resolve_conversation(job).await?;
        let result = match progress.result.take() {
            Some(done) => {
                debug!(task_id = %job.task_id, "reusing result of an earlier attempt");
                done
            }
            None => {
                let request = TaskRequest::new(job.user_id.clone(), job.description.clone())
                    .with_task_id(job.task_id.to_string())
                    .with_history(conv.history);
                let result = self.executor.execute(request, cancel.clone()).await;
                if !result.success {
                    let msg = result.error.clone().unwrap_or_else(|| "agent run failed".into());
                    if result.outcome == AgentOutcome::Cancelled {
                        debug!(task_id = %job.task_id, "run cancelled");
                    }
                    return Err(QueueError::Execution(msg));
                }
                result
            }
        };
        let result = progress.result.insert(result);

        if conv.append_description && !progress.description_stored {
            self.conversations
                .append_message(&conv.id, &job.user_id, ConversationRole::User, &job.description)
                .await?;
            progress.description_stored = true;
        }
        if !progress.reply_stored {
            // An empty turn cannot be replayed to the model later.
            if result.text.trim().is_empty() {
                debug!(task_id = %job.task_id, "empty reply not stored");
            } else {
                self.conversations
                    .append_message(&conv.id, &job.user_id, ConversationRole::Assistant, &result.text)
                    .await?;
            }
            progress.reply_stored = true;
        }
        self.conversations.touch(&conv.id, &job.user_id).await?;
        self.tasks.set_result(&job.task_id, &job.user_id, result).await?;
        info!(task_id = %job.task_id, "task completed");
        Ok(())
    }

    async fn resolve_conversation(&self, job: &TaskJob) -> Result<ResolvedConversation, QueueError> {
        if let Some(id) = &job.conversation_id {
            self.conversations.get(id, &job.user_id).await?;
            let history = self
                .conversations
                .list_messages(id, &job.user_id)
                .await?
                .iter()
                .map(|m| m.to_history())
                .collect();
            return Ok(ResolvedConversation {
                id: id.clone(),
                history,
                append_description: true,
            });
        }

        // The id is derived from the task, so a retry finds the conversation
        // the first attempt created instead of making another.
        let id = ConversationId::for_task(&job.task_id);
        let title: String = job.description.chars().take(TITLE_CHARS).collect();
        let (_, created) = self.conversations.get_or_create(&id, &job.user_id, &title).await?;
        if created {
            self.conversations
                .append_message(&id, &job.user_id, ConversationRole::User, &job.description)
                .await?;
        }
        Ok(ResolvedConversation { id, history: Vec::new(), append_description: false })
    }

    /// A failure here is logged, never escalated.
    async fn persist_error(&self, job: &TaskJob, err: &QueueError, terminal: bool) {
        if let Err(e) = self
            .tasks
            .set_error(&job.task_id, &job.user_id, &err.to_string(), terminal)
            .await
        {
            error!(task_id = %job.task_id, "failed to persist task error: {e}");
        }
    }
}
