// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod conversation;
mod events;
mod executor;
mod result;
#[cfg(test)]
mod tests;

pub use conversation::{ConversationMessage, ConversationRole, TaskRequest};
pub use events::{AgentStreamEvent, ProgressEvent};
pub use executor::AgentExecutor;
pub use result::{AgentOutcome, AgentTaskResult, TaskMetadata};
