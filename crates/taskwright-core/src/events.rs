// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::Serialize;

use crate::AgentTaskResult;

/// Events written by a streaming execution as the loop advances.
/// Exactly one terminal event (`Completed` or `Error`) ends every stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentStreamEvent {
    Started { task_id: Option<String> },
    Progress(ProgressEvent),
    Completed { result: AgentTaskResult },
    Error { message: String, result: AgentTaskResult },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProgressEvent {
    IterationStarted { iteration: u32 },
    ToolInvoked { id: String, name: String },
    ToolCompleted { id: String, name: String, is_error: bool },
}

impl AgentStreamEvent {
    pub(crate) fn terminal(result: AgentTaskResult) -> Self {
        if result.success {
            Self::Completed { result }
        } else {
            let message = result.error.clone().unwrap_or_else(|| "task failed".into());
            Self::Error { message, result }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}
