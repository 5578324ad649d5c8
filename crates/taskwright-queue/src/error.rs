//! Queue domain errors.

use thiserror::Error;

use crate::TaskStatus;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Missing, or owned by another user.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: TaskStatus, to: TaskStatus },

    /// Another worker holds the task, or the job is already in flight.
    #[error("task already claimed: {0}")]
    AlreadyClaimed(String),

    #[error("queue is closed")]
    QueueClosed,

    #[error("storage error: {0}")]
    Storage(String),

    /// The agent run did not succeed.
    #[error("{0}")]
    Execution(String),
}

impl QueueError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Execution(_) | Self::Storage(_))
    }

    /// Errors raised before this worker owned the task.  The task record is
    /// left untouched.
    pub fn is_ownership(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound(_) | Self::AlreadyClaimed(_) | Self::InvalidStateTransition { .. }
        )
    }
}
