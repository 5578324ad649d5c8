// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::{CompletionRequest, CompletionResponse, ContentBlock, Role};

/// Deterministic mock provider.  Echoes the last user text back as the
/// assistant response and ends the turn.
#[derive(Default)]
pub struct MockProvider;

#[async_trait]
impl crate::ModelProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        let reply = req
            .messages
            .iter()
            .rev()
            .filter(|m| m.role == Role::User)
            .find_map(|m| {
                m.content.iter().find_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.clone()),
                    _ => None,
                })
            })
            .unwrap_or_else(|| "[no input]".to_string());
        Ok(CompletionResponse::end_turn(format!("MOCK: {reply}")).with_usage(10, 10))
    }
}

/// One scripted reply: a response or a provider failure.
pub type Script = Result<CompletionResponse, String>;

/// A pre-scripted mock provider.  Each call to `complete` pops the next
/// response from the front of the queue.  This lets tests specify exact
/// sequences (including tool-use turns and provider errors) without network
/// access.
pub struct ScriptedMockProvider {
    scripts: Mutex<VecDeque<Script>>,
    /// Returned once the scripts run out.  `None` ends the turn with a marker.
    fallback: Option<CompletionResponse>,
    /// Artificial latency applied before every reply.
    delay: Option<Duration>,
    /// Every request seen, in call order, so tests can inspect what was sent.
    pub requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedMockProvider {
    pub fn new(responses: Vec<CompletionResponse>) -> Self {
        Self::from_scripts(responses.into_iter().map(Ok).collect())
    }

    /// Build from scripts that may include failures (`Err(message)`).
    pub fn from_scripts(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            fallback: None,
            delay: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Convenience: provider that always returns a single text reply.
    pub fn always_text(reply: impl Into<String>) -> Self {
        Self::new(vec![CompletionResponse::end_turn(reply)])
    }

    /// Convenience: provider that returns one tool call followed by a text reply.
    pub fn tool_then_text(
        tool_id: &str,
        tool_name: &str,
        input: serde_json::Value,
        final_text: impl Into<String>,
    ) -> Self {
        Self::new(vec![
            CompletionResponse::tool_use(vec![(tool_id, tool_name, input)]),
            CompletionResponse::end_turn(final_text),
        ])
    }

    /// Provider that returns the same response on every call.
    pub fn repeating(response: CompletionResponse) -> Self {
        Self::new(vec![]).with_fallback(response)
    }

    pub fn with_fallback(mut self, response: CompletionResponse) -> Self {
        self.fallback = Some(response);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of `complete` calls made so far.
    pub fn calls(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl crate::ModelProvider for ScriptedMockProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "scripted-mock-model"
    }

    async fn complete(&self, req: CompletionRequest) -> anyhow::Result<CompletionResponse> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(req);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.scripts.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(resp)) => Ok(resp),
            Some(Err(msg)) => Err(anyhow::anyhow!(msg)),
            None => Ok(self
                .fallback
                .clone()
                .unwrap_or_else(|| CompletionResponse::end_turn("[no more scripts]"))),
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
