// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Per-invocation context handed to every tool.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Authenticated caller.  Every data access a tool performs is scoped to
    /// this id.
    pub user_id: String,
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(user_id: impl Into<String>, cancel: CancellationToken) -> Self {
        Self { user_id: user_id.into(), cancel }
    }
}

/// The outcome of one tool invocation.
///
/// Exactly one of `content` / `error` is set.  `content` is an opaque
/// serialized payload (usually JSON) forwarded verbatim to the model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn ok(content: impl Into<String>) -> Self {
        Self { success: true, content: Some(content.into()), error: None }
    }

    /// Successful result carrying `value` serialized as JSON.
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(s) => Self::ok(s),
            Err(e) => Self::err(format!("serialization error: {e}")),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self { success: false, content: None, error: Some(msg.into()) }
    }

    /// Text fed back to the model as the tool_result block.
    pub fn to_model_text(&self) -> String {
        match (&self.content, &self.error) {
            (_, Some(e)) if !self.success => format!("Error: {e}"),
            (Some(c), _) => c.clone(),
            _ => String::new(),
        }
    }
}

/// Contract every tool implements.
///
/// `execute` never fails: domain errors, malformed input and cancellation
/// all come back as an error [`ToolResult`].
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    /// Shown verbatim to the model in the tool catalog.
    fn description(&self) -> &str;
    /// JSON Schema for the input object
    fn input_schema(&self) -> Value;
    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult;
}
