/// Tests for the AgentExecutor orchestration loop.
///
/// Uses ScriptedMockProvider so every scenario is deterministic and
/// requires no network access.  Timing scenarios run on paused tokio time.
#[cfg(test)]
mod executor_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use taskwright_config::AgentConfig;
    use taskwright_model::{
        CompletionRequest, CompletionResponse, ContentBlock, Role, ScriptedMockProvider, StopReason,
        Usage,
    };
    use taskwright_tools::{Tool, ToolContext, ToolRegistry, ToolResult};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        AgentExecutor, AgentOutcome, AgentStreamEvent, ConversationMessage, ProgressEvent,
        TaskRequest,
    };

    // ── Test tools ────────────────────────────────────────────────────────────

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "echoes its input" }
        fn input_schema(&self) -> Value { json!({ "type": "object" }) }
        async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
            ToolResult::ok(format!("{}:{input}", ctx.user_id))
        }
    }

    /// Appends its `tag` argument to a shared log, proving execution order.
    struct RecordingTool {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingTool {
        fn name(&self) -> &str { "record" }
        fn description(&self) -> &str { "records a tag" }
        fn input_schema(&self) -> Value { json!({ "type": "object" }) }
        async fn execute(&self, input: Value, _ctx: &ToolContext) -> ToolResult {
            let tag = input["tag"].as_str().unwrap_or("?").to_string();
            // Yield so a concurrent implementation would interleave.
            tokio::task::yield_now().await;
            self.log.lock().unwrap().push(tag.clone());
            ToolResult::ok(tag)
        }
    }

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str { "fail" }
        fn description(&self) -> &str { "always fails" }
        fn input_schema(&self) -> Value { json!({ "type": "object" }) }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
            ToolResult::err("record not found")
        }
    }

    struct PanicTool;

    #[async_trait]
    impl Tool for PanicTool {
        fn name(&self) -> &str { "explode" }
        fn description(&self) -> &str { "panics" }
        fn input_schema(&self) -> Value { json!({ "type": "object" }) }
        async fn execute(&self, _input: Value, _ctx: &ToolContext) -> ToolResult {
            panic!("boom")
        }
    }

    /// Captures its cancellation token, then sleeps far past any timeout.
    struct SlowTool {
        seen: Arc<Mutex<Option<CancellationToken>>>,
    }

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str { "slow" }
        fn description(&self) -> &str { "sleeps" }
        fn input_schema(&self) -> Value { json!({ "type": "object" }) }
        async fn execute(&self, _input: Value, ctx: &ToolContext) -> ToolResult {
            *self.seen.lock().unwrap() = Some(ctx.cancel.clone());
            tokio::time::sleep(Duration::from_secs(60)).await;
            ToolResult::ok("finally")
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn executor_with(
        model: ScriptedMockProvider,
        tools: Vec<Arc<dyn Tool>>,
        config: AgentConfig,
    ) -> AgentExecutor {
        AgentExecutor::new(
            Arc::new(model),
            Arc::new(ToolRegistry::from_tools(tools)),
            Arc::new(config),
        )
    }

    fn default_executor(model: ScriptedMockProvider) -> AgentExecutor {
        executor_with(model, vec![Arc::new(EchoTool)], AgentConfig::default())
    }

    fn request(text: &str) -> TaskRequest {
        TaskRequest::new("user-a", text).with_task_id("task-1")
    }

    fn requests_of(model: &ScriptedMockProvider) -> Arc<Mutex<Vec<CompletionRequest>>> {
        Arc::clone(&model.requests)
    }

    /// Drain the channel until the terminal event or channel close.
    async fn collect_events(mut rx: mpsc::Receiver<AgentStreamEvent>) -> Vec<AgentStreamEvent> {
        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            let done = ev.is_terminal();
            events.push(ev);
            if done { break; }
        }
        events
    }

    fn tool_results_of(msg: &taskwright_model::Message) -> Vec<(String, String, bool)> {
        msg.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolResult { tool_use_id, content, is_error } => {
                    Some((tool_use_id.clone(), content.clone(), *is_error))
                }
                _ => None,
            })
            .collect()
    }

    // ── Termination ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn end_turn_on_first_iteration_returns_text() {
        let exec = default_executor(ScriptedMockProvider::always_text("all done"));
        let result = exec.execute(request("hi"), CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.outcome, AgentOutcome::Completed);
        assert_eq!(result.text, "all done");
        assert_eq!(result.metadata.iterations, 1);
        assert!(result.error.is_none());
    }

    #[tokio::test]
    async fn end_turn_at_iteration_k_stops_at_k() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("t1", "echo", json!({"n": 1}))]),
            CompletionResponse::tool_use(vec![("t2", "echo", json!({"n": 2}))]),
            CompletionResponse::end_turn("finished after three"),
        ]);
        let requests = requests_of(&model);
        let exec = default_executor(model);
        let result = exec.execute(request("go"), CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.metadata.iterations, 3);
        assert_eq!(result.text, "finished after three");
        assert_eq!(result.metadata.tools_used, vec!["echo", "echo"]);
        assert_eq!(requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn text_accompanying_tool_use_is_accumulated() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("t1", "echo", json!({}))]).with_text("Looking it up."),
            CompletionResponse::end_turn("Found it."),
        ]);
        let result = default_executor(model).execute(request("q"), CancellationToken::new()).await;
        assert_eq!(result.text, "Looking it up.\nFound it.");
    }

    #[tokio::test]
    async fn unexpected_stop_reason_completes_with_text() {
        let resp = CompletionResponse {
            stop_reason: StopReason::Other("max_tokens".into()),
            content: vec![ContentBlock::text("truncated answ")],
            usage: Usage::default(),
        };
        let result = default_executor(ScriptedMockProvider::new(vec![resp]))
            .execute(request("q"), CancellationToken::new())
            .await;
        assert!(result.success);
        assert_eq!(result.outcome, AgentOutcome::Completed);
        assert_eq!(result.text, "truncated answ");
    }

    // ── Tool execution ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn n_tool_uses_yield_n_results_in_request_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![
                ("c1", "record", json!({"tag": "first"})),
                ("c2", "missing_tool", json!({})),
                ("c3", "record", json!({"tag": "third"})),
            ]),
            CompletionResponse::end_turn("ok"),
        ]);
        let requests = requests_of(&model);
        let exec = executor_with(
            model,
            vec![Arc::new(RecordingTool { log: log.clone() })],
            AgentConfig::default(),
        );
        let result = exec.execute(request("go"), CancellationToken::new()).await;
        assert!(result.success);

        assert_eq!(*log.lock().unwrap(), vec!["first", "third"]);

        let reqs = requests.lock().unwrap();
        let second = &reqs[1].messages;
        let assistant = &second[second.len() - 2];
        assert_eq!(assistant.role, Role::Assistant);
        let results = tool_results_of(&second[second.len() - 1]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0], ("c1".into(), "first".into(), false));
        assert_eq!(results[1].0, "c2");
        assert!(results[1].2);
        assert!(results[1].1.contains("unknown tool: missing_tool"));
        assert_eq!(results[2], ("c3".into(), "third".into(), false));
    }

    #[tokio::test]
    async fn failing_tool_does_not_abort_loop() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("f1", "fail", json!({})), ("e1", "echo", json!({}))]),
            CompletionResponse::end_turn("recovered"),
        ]);
        let requests = requests_of(&model);
        let exec = executor_with(
            model,
            vec![Arc::new(FailingTool), Arc::new(EchoTool)],
            AgentConfig::default(),
        );
        let result = exec.execute(request("go"), CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.text, "recovered");
        let reqs = requests.lock().unwrap();
        let results = tool_results_of(reqs[1].messages.last().unwrap());
        assert_eq!(results[0], ("f1".into(), "Error: record not found".into(), true));
        assert_eq!(results[1], ("e1".into(), "user-a:{}".into(), false));
    }

    #[tokio::test]
    async fn panicking_tool_becomes_error_result() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("p1", "explode", json!({}))]),
            CompletionResponse::end_turn("survived"),
        ]);
        let requests = requests_of(&model);
        let exec = executor_with(model, vec![Arc::new(PanicTool)], AgentConfig::default());
        let result = exec.execute(request("go"), CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.text, "survived");
        let reqs = requests.lock().unwrap();
        let results = tool_results_of(reqs[1].messages.last().unwrap());
        assert_eq!(results[0].0, "p1");
        assert!(results[0].2);
        assert!(results[0].1.contains("tool panicked: boom"));
    }

    #[tokio::test]
    async fn tools_receive_the_request_user_id() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("t1", "echo", json!({"x": 1}))]),
            CompletionResponse::end_turn("ok"),
        ]);
        let requests = requests_of(&model);
        let exec = default_executor(model);
        exec.execute(TaskRequest::new("owner-42", "go"), CancellationToken::new()).await;

        let reqs = requests.lock().unwrap();
        let results = tool_results_of(reqs[1].messages.last().unwrap());
        assert!(results[0].1.starts_with("owner-42:"));
    }

    // ── Iteration cap ─────────────────────────────────────────────────────────

    #[tokio::test]
    async fn max_iterations_with_unregistered_tool_succeeds_with_empty_text() {
        let model = ScriptedMockProvider::repeating(CompletionResponse::tool_use(vec![(
            "g", "ghost_tool", json!({}),
        )]));
        let requests = requests_of(&model);
        let config = AgentConfig { max_iterations: 2, ..AgentConfig::default() };
        let exec = executor_with(model, vec![], config);
        let result = exec.execute(request("loop"), CancellationToken::new()).await;

        assert!(result.success);
        assert_eq!(result.outcome, AgentOutcome::MaxIterationsReached);
        assert_eq!(result.text, "");
        assert_eq!(result.metadata.iterations, 2);
        assert!(result.metadata.tools_used.is_empty());
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn iteration_count_never_exceeds_max() {
        for max in [1u32, 3, 5] {
            let model = ScriptedMockProvider::repeating(CompletionResponse::tool_use(vec![(
                "e", "echo", json!({}),
            )]));
            let requests = requests_of(&model);
            let config = AgentConfig { max_iterations: max, ..AgentConfig::default() };
            let exec = executor_with(model, vec![Arc::new(EchoTool)], config);
            let result = exec.execute(request("loop"), CancellationToken::new()).await;
            assert_eq!(result.metadata.iterations, max);
            assert_eq!(requests.lock().unwrap().len(), max as usize);
        }
    }

    // ── Timeout ───────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out_with_configured_seconds() {
        let model = ScriptedMockProvider::always_text("too late").with_delay(Duration::from_secs(5));
        let config = AgentConfig { timeout_secs: 1, ..AgentConfig::default() };
        let exec = executor_with(model, vec![], config);

        let start = tokio::time::Instant::now();
        let result = exec.execute(request("q"), CancellationToken::new()).await;

        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(!result.success);
        assert_eq!(result.outcome, AgentOutcome::TimedOut);
        let err = result.error.unwrap();
        assert!(err.contains('1'), "{err}");
        assert_eq!(err, "task timed out after 1 seconds");
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_in_flight_tool_and_stops_the_loop() {
        let seen = Arc::new(Mutex::new(None));
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("s1", "slow", json!({}))]),
            CompletionResponse::end_turn("should never be requested"),
        ]);
        let requests = requests_of(&model);
        let config = AgentConfig { timeout_secs: 1, ..AgentConfig::default() };
        let exec = executor_with(model, vec![Arc::new(SlowTool { seen: seen.clone() })], config);

        let caller = CancellationToken::new();
        let result = exec.execute(request("q"), caller.clone()).await;
        assert_eq!(result.outcome, AgentOutcome::TimedOut);

        let token = seen.lock().unwrap().clone().expect("slow tool ran");
        assert!(token.is_cancelled(), "stray tool must observe cancellation");
        assert!(!caller.is_cancelled(), "caller token is left alone");

        // Nothing keeps running behind the caller's back.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    // ── Cancellation ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cancelled_before_start_reports_cancelled() {
        let model = ScriptedMockProvider::always_text("unused");
        let requests = requests_of(&model);
        let exec = default_executor(model);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = exec.execute(request("q"), cancel).await;
        assert!(!result.success);
        assert_eq!(result.outcome, AgentOutcome::Cancelled);
        assert_eq!(result.metadata.iterations, 0);
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_during_model_call_is_distinct_from_failure() {
        let model = ScriptedMockProvider::always_text("late").with_delay(Duration::from_secs(30));
        let exec = default_executor(model);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            trigger.cancel();
        });

        let result = exec.execute(request("q"), cancel).await;
        assert_eq!(result.outcome, AgentOutcome::Cancelled);
        assert_eq!(result.error.as_deref(), Some("task was cancelled"));
    }

    // ── Model failures ────────────────────────────────────────────────────────

    #[tokio::test]
    async fn model_error_becomes_failed_result() {
        let model = ScriptedMockProvider::from_scripts(vec![Err("upstream overloaded".into())]);
        let result = default_executor(model).execute(request("q"), CancellationToken::new()).await;

        assert!(!result.success);
        assert_eq!(result.outcome, AgentOutcome::Failed);
        let err = result.error.unwrap();
        assert!(err.starts_with("model call failed"), "{err}");
        assert!(err.contains("upstream overloaded"));
    }

    // ── Request assembly ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn request_uses_configured_prompt_and_sampling() {
        let model = ScriptedMockProvider::always_text("ok");
        let requests = requests_of(&model);
        let config = AgentConfig {
            system_prompt: "You are a test harness.".into(),
            temperature: 0.5,
            max_tokens: 321,
            ..AgentConfig::default()
        };
        let exec = executor_with(model, vec![Arc::new(FailingTool), Arc::new(EchoTool)], config);
        exec.execute(request("q"), CancellationToken::new()).await;

        let reqs = requests.lock().unwrap();
        assert_eq!(reqs[0].system, "You are a test harness.");
        assert_eq!(reqs[0].temperature, 0.5);
        assert_eq!(reqs[0].max_tokens, 321);
        let names: Vec<&str> = reqs[0].tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["echo", "fail"]);
        assert_eq!(reqs[0].tools[0].description, "echoes its input");
    }

    #[tokio::test]
    async fn history_is_replayed_before_the_description() {
        let model = ScriptedMockProvider::always_text("ok");
        let requests = requests_of(&model);
        let exec = default_executor(model);
        let req = request("and now?").with_history(vec![
            ConversationMessage::user("first question"),
            ConversationMessage::assistant("first answer"),
        ]);
        exec.execute(req, CancellationToken::new()).await;

        let reqs = requests.lock().unwrap();
        let texts: Vec<String> = reqs[0].messages.iter().map(|m| m.text()).collect();
        assert_eq!(texts, vec!["first question", "first answer", "and now?"]);
    }

    #[tokio::test]
    async fn token_usage_is_summed_across_calls() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("t", "echo", json!({}))]).with_usage(100, 20),
            CompletionResponse::end_turn("ok").with_usage(150, 30),
        ]);
        let result = default_executor(model).execute(request("q"), CancellationToken::new()).await;
        assert_eq!(result.metadata.token_usage, Usage { input_tokens: 250, output_tokens: 50 });
    }

    // ── Streaming ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn streaming_emits_progress_then_single_terminal_event() {
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("t1", "echo", json!({}))]),
            CompletionResponse::end_turn("streamed"),
        ]);
        let exec = default_executor(model);
        let events = collect_events(exec.execute_streaming(request("q"), CancellationToken::new())).await;

        assert_eq!(events.len(), 6, "{events:?}");
        assert!(matches!(&events[0], AgentStreamEvent::Started { task_id: Some(id) } if id == "task-1"));
        assert_eq!(
            events[1],
            AgentStreamEvent::Progress(ProgressEvent::IterationStarted { iteration: 1 })
        );
        assert_eq!(
            events[2],
            AgentStreamEvent::Progress(ProgressEvent::ToolInvoked { id: "t1".into(), name: "echo".into() })
        );
        assert_eq!(
            events[3],
            AgentStreamEvent::Progress(ProgressEvent::ToolCompleted {
                id: "t1".into(),
                name: "echo".into(),
                is_error: false
            })
        );
        assert_eq!(
            events[4],
            AgentStreamEvent::Progress(ProgressEvent::IterationStarted { iteration: 2 })
        );
        match &events[5] {
            AgentStreamEvent::Completed { result } => assert_eq!(result.text, "streamed"),
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
    }

    #[tokio::test]
    async fn streaming_channel_closes_after_terminal_event() {
        let exec = default_executor(ScriptedMockProvider::always_text("x"));
        let mut rx = exec.execute_streaming(request("q"), CancellationToken::new());
        let mut terminals = 0;
        while let Some(ev) = rx.recv().await {
            if ev.is_terminal() {
                terminals += 1;
            }
        }
        assert_eq!(terminals, 1);
    }

    #[tokio::test]
    async fn streaming_failure_ends_with_error_event() {
        let model = ScriptedMockProvider::from_scripts(vec![Err("bad gateway".into())]);
        let events = collect_events(
            default_executor(model).execute_streaming(request("q"), CancellationToken::new()),
        )
        .await;
        match events.last() {
            Some(AgentStreamEvent::Error { message, result }) => {
                assert!(message.contains("bad gateway"));
                assert_eq!(result.outcome, AgentOutcome::Failed);
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_stream_receiver_cancels_the_run() {
        let seen = Arc::new(Mutex::new(None));
        let model = ScriptedMockProvider::new(vec![
            CompletionResponse::tool_use(vec![("s1", "slow", json!({}))]),
            CompletionResponse::end_turn("unreachable"),
        ]);
        let requests = requests_of(&model);
        let exec = executor_with(
            model,
            vec![Arc::new(SlowTool { seen: seen.clone() })],
            AgentConfig::default(),
        );

        let mut rx = exec.execute_streaming(request("q"), CancellationToken::new());
        while let Some(ev) = rx.recv().await {
            if matches!(ev, AgentStreamEvent::Progress(ProgressEvent::ToolInvoked { .. })) {
                break;
            }
        }
        drop(rx);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let token = seen.lock().unwrap().clone().expect("slow tool ran");
        assert!(token.is_cancelled());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(requests.lock().unwrap().len(), 1);
    }
}
