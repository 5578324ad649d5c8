// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Background execution of agent tasks: persisted status, conversation
//! stitching, retry with fixed backoff, and a worker pool.
mod error;
mod ids;
mod memory;
mod processor;
mod queue;
mod repository;
mod retry;
mod status;
mod task;

pub use error::QueueError;
pub use ids::{ConversationId, TaskId};
pub use memory::{InMemoryConversationRepository, InMemoryTaskRepository};
pub use processor::{BackgroundProcessor, TaskJob};
pub use queue::TaskQueue;
pub use repository::{ConversationRepository, TaskRepository};
pub use retry::RetryPolicy;
pub use status::TaskStatus;
pub use task::{AgentTask, Conversation, StoredMessage};
