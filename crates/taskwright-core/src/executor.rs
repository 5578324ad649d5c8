// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use taskwright_config::AgentConfig;
use taskwright_model::{
    CompletionRequest, ContentBlock, Message, ModelProvider, StopReason, ToolSchema, ToolUse, Usage,
};
use taskwright_tools::{ToolContext, ToolRegistry, ToolResult};

use crate::{
    AgentOutcome, AgentStreamEvent, AgentTaskResult, ProgressEvent, TaskMetadata, TaskRequest,
};

type EventSink<'a> = Option<&'a mpsc::Sender<AgentStreamEvent>>;

/// Runs the model/tool loop for one task at a time.  Cheap to clone; every
/// clone shares the provider, the registry and the config.
#[derive(Clone)]
pub struct AgentExecutor {
    model: Arc<dyn ModelProvider>,
    tools: Arc<ToolRegistry>,
    config: Arc<AgentConfig>,
}

/// How the loop itself stopped, before timeout and cancellation are folded in.
enum Finish {
    Completed,
    MaxIterations,
}

enum Exit {
    Finished(Finish),
    TimedOut,
    Cancelled,
    Failed(anyhow::Error),
}

/// Mutable state of one run.  Lives outside the loop future so that it
/// survives a timeout or cancellation and still feeds the result metadata.
#[derive(Default)]
struct RunState {
    text: String,
    iterations: u32,
    tools_used: Vec<String>,
    usage: Usage,
}

impl RunState {
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if !self.text.is_empty() {
            self.text.push('\n');
        }
        self.text.push_str(text);
    }

    fn metadata(&self, elapsed: Duration) -> TaskMetadata {
        TaskMetadata {
            tools_used: self.tools_used.clone(),
            iterations: self.iterations,
            duration_ms: elapsed.as_millis() as u64,
            token_usage: self.usage,
        }
    }
}

impl AgentExecutor {
    pub fn new(
        model: Arc<dyn ModelProvider>,
        tools: Arc<ToolRegistry>,
        config: Arc<AgentConfig>,
    ) -> Self {
        Self { model, tools, config }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run a task to completion.  Never fails: every outcome, including
    /// timeout, cancellation and model errors, is reported in the result.
    pub async fn execute(&self, request: TaskRequest, cancel: CancellationToken) -> AgentTaskResult {
        self.run(request, cancel, None).await
    }

    /// Run a task in the background and return a channel of progress events.
    ///
    /// The stream ends with exactly one terminal event.  Dropping the
    /// receiver cancels the run.
    pub fn execute_streaming(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<AgentStreamEvent> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer.max(1));
        let this = self.clone();
        tokio::spawn(async move {
            let run_cancel = cancel.child_token();
            let watcher = {
                let tx = tx.clone();
                let run_cancel = run_cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = tx.closed() => {
                            debug!("stream receiver dropped; cancelling run");
                            run_cancel.cancel();
                        }
                        _ = run_cancel.cancelled() => {}
                    }
                })
            };

            let _ = tx
                .send(AgentStreamEvent::Started { task_id: request.task_id.clone() })
                .await;
            let result = this.run(request, run_cancel.clone(), Some(&tx)).await;

            run_cancel.cancel();
            let _ = watcher.await;
            let _ = tx.send(AgentStreamEvent::terminal(result)).await;
        });
        rx
    }

    async fn run(
        &self,
        request: TaskRequest,
        cancel: CancellationToken,
        events: EventSink<'_>,
    ) -> AgentTaskResult {
        let started = Instant::now();
        let task_id = request.task_id.clone().unwrap_or_else(|| "-".into());
        info!(task_id = %task_id, user_id = %request.user_id, "agent task started");

        let mut state = RunState::default();
        let exit = if cancel.is_cancelled() {
            Exit::Cancelled
        } else {
            // The loop gets its own token so a timeout can stop in-flight tools
            // without touching the caller's token.
            let loop_cancel = cancel.child_token();
            let exit = tokio::select! {
                biased;
                _ = cancel.cancelled() => Exit::Cancelled,
                _ = tokio::time::sleep(self.config.timeout()) => Exit::TimedOut,
                r = self.run_loop(&request, &loop_cancel, &mut state, events) => match r {
                    Ok(finish) => Exit::Finished(finish),
                    Err(e) => Exit::Failed(e),
                },
            };
            loop_cancel.cancel();
            exit
        };

        let metadata = state.metadata(started.elapsed());
        let text = std::mem::take(&mut state.text);
        let result = match exit {
            Exit::Finished(Finish::Completed) => {
                AgentTaskResult::new(AgentOutcome::Completed, text, None, metadata)
            }
            Exit::Finished(Finish::MaxIterations) => {
                warn!(
                    task_id = %task_id,
                    max_iterations = self.config.max_iterations,
                    "iteration cap reached before the model finished"
                );
                AgentTaskResult::new(AgentOutcome::MaxIterationsReached, text, None, metadata)
            }
            Exit::TimedOut => {
                let msg = format!("task timed out after {} seconds", self.config.timeout_secs);
                warn!(task_id = %task_id, "{msg}");
                AgentTaskResult::new(AgentOutcome::TimedOut, text, Some(msg), metadata)
            }
            Exit::Cancelled => {
                info!(task_id = %task_id, "agent task cancelled");
                AgentTaskResult::new(
                    AgentOutcome::Cancelled,
                    text,
                    Some("task was cancelled".into()),
                    metadata,
                )
            }
            Exit::Failed(e) => {
                let msg = format!("model call failed: {e:#}");
                warn!(task_id = %task_id, "{msg}");
                AgentTaskResult::new(AgentOutcome::Failed, text, Some(msg), metadata)
            }
        };

        info!(
            task_id = %task_id,
            outcome = ?result.outcome,
            iterations = result.metadata.iterations,
            duration_ms = result.metadata.duration_ms,
            "agent task finished"
        );
        result
    }

    async fn run_loop(
        &self,
        request: &TaskRequest,
        cancel: &CancellationToken,
        state: &mut RunState,
        events: EventSink<'_>,
    ) -> anyhow::Result<Finish> {
        let ctx = ToolContext::new(request.user_id.clone(), cancel.clone());
        let mut messages = request.initial_messages();

        while state.iterations < self.config.max_iterations {
            state.iterations += 1;
            let iteration = state.iterations;
            emit(events, AgentStreamEvent::Progress(ProgressEvent::IterationStarted { iteration })).await;
            debug!(iteration, messages = messages.len(), "calling model");

            let req = CompletionRequest {
                model: self.model.model_name().to_string(),
                system: self.config.system_prompt.clone(),
                messages: messages.clone(),
                tools: self.catalog(),
                temperature: self.config.temperature,
                max_tokens: self.config.max_tokens,
            };
            let resp = self.model.complete(req).await?;
            state.usage += resp.usage;
            state.push_text(&resp.text());

            match &resp.stop_reason {
                StopReason::EndTurn => return Ok(Finish::Completed),
                StopReason::ToolUse => {
                    let uses = resp.tool_uses();
                    if uses.is_empty() {
                        warn!(iteration, "tool_use stop without tool requests; completing");
                        return Ok(Finish::Completed);
                    }
                    let mut results = Vec::with_capacity(uses.len());
                    for call in &uses {
                        results.push(self.invoke_tool(call, &ctx, state, events).await);
                    }
                    messages.push(resp.to_message());
                    messages.push(Message::tool_results(results));
                }
                StopReason::Other(reason) => {
                    warn!(iteration, reason = %reason, "unexpected stop reason; completing with accumulated text");
                    return Ok(Finish::Completed);
                }
            }
        }
        Ok(Finish::MaxIterations)
    }

    /// Tool catalog for one model call, rebuilt from the registry each time.
    fn catalog(&self) -> Vec<ToolSchema> {
        self.tools
            .definitions()
            .into_iter()
            .map(|d| ToolSchema {
                name: d.name,
                description: d.description,
                input_schema: d.input_schema,
            })
            .collect()
    }

    /// Execute one requested tool and turn the outcome into a result block
    /// keyed by the request id.  Missing tools and panics become error results.
    async fn invoke_tool(
        &self,
        call: &ToolUse,
        ctx: &ToolContext,
        state: &mut RunState,
        events: EventSink<'_>,
    ) -> ContentBlock {
        emit(
            events,
            AgentStreamEvent::Progress(ProgressEvent::ToolInvoked {
                id: call.id.clone(),
                name: call.name.clone(),
            }),
        )
        .await;

        let result = match self.tools.get(&call.name) {
            None => {
                warn!(tool_name = %call.name, "model requested unknown tool");
                ToolResult::err(format!("unknown tool: {}", call.name))
            }
            Some(tool) => {
                debug!(tool_name = %call.name, id = %call.id, "executing tool");
                state.tools_used.push(call.name.clone());
                AssertUnwindSafe(tool.execute(call.input.clone(), ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        warn!(tool_name = %call.name, "tool panicked");
                        ToolResult::err(format!("tool panicked: {}", panic_message(&*panic)))
                    })
            }
        };

        emit(
            events,
            AgentStreamEvent::Progress(ProgressEvent::ToolCompleted {
                id: call.id.clone(),
                name: call.name.clone(),
                is_error: !result.success,
            }),
        )
        .await;
        ContentBlock::tool_result(&call.id, result.to_model_text(), !result.success)
    }
}

async fn emit(events: EventSink<'_>, event: AgentStreamEvent) {
    if let Some(tx) = events {
        // A closed receiver is handled by the stream watcher.
        let _ = tx.send(event).await;
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
