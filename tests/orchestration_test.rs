//! 编排循环集成测试

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use agency::actor::{Action, Actor, Decider, Role, ScriptedDecider};
    use agency::core::{
        ScriptedConfirmation, SessionBuilder, SessionConfig, SessionEvent, TerminationReason,
    };
    use agency::memory::{
        MessageBody, MessageKind, SharedContextStore, ToolInvocation, STATUS_FAILURE, STATUS_OK,
    };
    use agency::tools::{builtin_registry, Tool, ToolContext, ToolError};
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    #[derive(Deserialize, JsonSchema)]
    struct NoArgs {}

    struct CountingTool {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for CountingTool {
        type Args = NoArgs;

        fn name(&self) -> &str {
            "count"
        }

        fn description(&self) -> &str {
            "counts its invocations"
        }

        async fn execute(&self, _ctx: &ToolContext, _args: NoArgs) -> Result<String, ToolError> {
            Ok(format!("call #{}", self.calls.fetch_add(1, Ordering::SeqCst) + 1))
        }
    }

    fn scripted(actions: Vec<Action>) -> Arc<ScriptedDecider> {
        Arc::new(ScriptedDecider::with_actions(actions))
    }

    fn call(tool: &str, args: serde_json::Value) -> Action {
        Action::ToolRequest(ToolInvocation::new(
            tool,
            args.as_object().cloned().unwrap_or_default(),
        ))
    }

    fn senders(summary: &agency::SessionSummary) -> Vec<String> {
        summary.transcript.iter().map(|m| m.sender.clone()).collect()
    }

    #[tokio::test]
    async fn test_round_robin_until_max_rounds() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(5)
            .actor(Actor::new("A", Role::Admin), scripted(vec![]))
            .actor(Actor::new("B", Role::Planner), scripted(vec![]))
            .actor(Actor::new("C", Role::Verifier), scripted(vec![]))
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(summary.reason, TerminationReason::MaxRoundsReached);
        assert_eq!(summary.round_count, 5);
        assert_eq!(senders(&summary), ["A", "B", "C", "A", "B"]);
        assert!(summary.fatal.is_none());
    }

    #[tokio::test]
    async fn test_termination_token_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(50)
            .actor(Actor::new("Admin", Role::Admin), scripted(vec![Action::text("write a README")]))
            .actor(
                Actor::new("Tester", Role::Verifier),
                scripted(vec![Action::text("README reviewed, looks good. terminate")]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(summary.reason, TerminationReason::ExplicitTerminationToken);
        assert_eq!(summary.round_count, 2);
        assert!(summary.outcome.contains("README reviewed, looks good."));

        let text = std::fs::read_to_string(dir.path().join("chat_results.txt")).unwrap();
        assert!(text.starts_with("Chat Summary:\n"));
        assert!(text.contains("Chat History:\nAdmin: write a README\n"));
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("chat_results.json")).unwrap())
                .unwrap();
        assert_eq!(json["reason"]["reason"], "explicit-termination-token");
        assert_eq!(json["transcript"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_capability_rejection_never_runs_handler() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = builtin_registry();
        registry.register(CountingTool { calls: calls.clone() }, [Role::Executor]);

        let summary = SessionBuilder::new(dir.path())
            .max_rounds(2)
            .registry(Arc::new(registry))
            .actor(
                Actor::new("PM", Role::Planner).with_tools(["update_context"]),
                scripted(vec![call("count", serde_json::json!({}))]),
            )
            .actor(
                Actor::new("Coder", Role::Executor).with_tools(["count"]),
                scripted(vec![call("count", serde_json::json!({}))]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        let results: Vec<_> = summary
            .transcript
            .iter()
            .filter_map(|m| match &m.body {
                MessageBody::ToolResult(out) => Some(out.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status_code, STATUS_FAILURE);
        assert_eq!(results[0].payload, "not permitted for this role");
        assert_eq!(results[1].status_code, STATUS_OK);
        assert_eq!(results[1].payload, "call #1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_a_failed_result() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(1)
            .actor(
                Actor::new("PM", Role::Planner),
                scripted(vec![call("deploy", serde_json::json!({}))]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        match &summary.transcript[1].body {
            MessageBody::ToolResult(out) => assert_eq!(out.payload, "unknown tool"),
            other => panic!("expected tool result, got {:?}", other),
        }
        assert_eq!(summary.reason, TerminationReason::MaxRoundsReached);
    }

    #[tokio::test]
    async fn test_operator_denial_skips_handler() {
        let dir = TempDir::new().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = builtin_registry();
        registry.register(CountingTool { calls: calls.clone() }, [Role::Executor]);
        let channel = Arc::new(ScriptedConfirmation::deny_all());

        let summary = SessionBuilder::new(dir.path())
            .max_rounds(1)
            .registry(Arc::new(registry))
            .confirmation(channel.clone())
            .actor(
                Actor::new("Coder", Role::Executor)
                    .with_tools(["count"])
                    .with_confirmation(true),
                scripted(vec![call("count", serde_json::json!({}))]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(channel.asked(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        match &summary.transcript[1].body {
            MessageBody::ToolResult(out) => {
                assert_eq!(out.status_code, STATUS_FAILURE);
                assert_eq!(out.payload, "rejected by operator");
            }
            other => panic!("expected tool result, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_sequences_contiguous_and_results_paired() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(6)
            .actor(
                Actor::new("Admin", Role::Admin).with_tools(["echo", "read_context"]),
                scripted(vec![
                    Action::text("start"),
                    call("echo", serde_json::json!({"text": "ping"})),
                    call("read_context", serde_json::json!({})),
                ]),
            )
            .actor(
                Actor::new("QA", Role::Verifier).with_tools(["echo"]),
                scripted(vec![
                    call("echo", serde_json::json!({"text": 3})),
                    Action::text("checked"),
                ]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        let seqs: Vec<u64> = summary.transcript.iter().map(|m| m.sequence).collect();
        let expected: Vec<u64> = (1..=summary.transcript.len() as u64).collect();
        assert_eq!(seqs, expected);

        for (i, m) in summary.transcript.iter().enumerate() {
            if let MessageBody::ToolResult(out) = &m.body {
                let prev = &summary.transcript[i - 1];
                match &prev.body {
                    MessageBody::ToolRequest(inv) => {
                        assert_eq!(inv.id, out.invocation_id);
                        assert_eq!(prev.sender, m.sender);
                    }
                    other => panic!("result not preceded by its request: {:?}", other),
                }
            }
        }
        let kinds: Vec<MessageKind> = summary.transcript.iter().map(|m| m.kind()).collect();
        assert_eq!(kinds.iter().filter(|k| **k == MessageKind::ToolResult).count(), 3);
        // echo 的 text 类型不对，参数校验失败
        assert!(summary.transcript.iter().any(|m| matches!(
            &m.body,
            MessageBody::ToolResult(out) if out.payload.starts_with("invalid arguments")
        )));
    }

    #[tokio::test]
    async fn test_update_context_merges_and_persists() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(2)
            .actor(
                Actor::new("PM", Role::Planner).with_tools(["update_context"]),
                scripted(vec![
                    call(
                        "update_context",
                        serde_json::json!({"name": "todo", "tech_stack": ["rust", "axum"]}),
                    ),
                    call("update_context", serde_json::json!({"features": ["login"]})),
                ]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();
        assert_eq!(summary.reason, TerminationReason::MaxRoundsReached);

        let path = SharedContextStore::path_for(dir.path());
        let ctx = SharedContextStore::load(&path).await.unwrap();
        assert_eq!(ctx.name, "todo");
        assert!(ctx.tech_stack.contains("axum"));
        assert!(ctx.features.contains("login"));

        // 新会话在同一工作目录下看到持久化的值
        let reopened = SharedContextStore::open(dir.path()).await.unwrap();
        assert_eq!(reopened.get().name, "todo");
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_decision() {
        let dir = TempDir::new().unwrap();
        let slow = Arc::new(ScriptedDecider::new());
        slow.push_stall(Duration::from_secs(30), Action::text("too late"));
        let token = CancellationToken::new();

        let orch = SessionBuilder::new(dir.path())
            .cancel_token(token.clone())
            .actor(Actor::new("Admin", Role::Admin), scripted(vec![Action::text("hello")]))
            .actor(Actor::new("PM", Role::Planner), slow)
            .build()
            .await
            .unwrap();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        let summary = orch.run(None).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(summary.reason, TerminationReason::OperatorCancelled);
        assert_eq!(summary.transcript.len(), 1);
        assert!(dir.path().join("chat_results.json").exists());
    }

    #[tokio::test]
    async fn test_decider_failure_recorded_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let flaky = Arc::new(ScriptedDecider::new());
        flaky.push_failure("backend unavailable");
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(3)
            .actor(Actor::new("A", Role::Admin), flaky)
            .actor(Actor::new("B", Role::Planner), scripted(vec![Action::text("still here")]))
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(summary.round_count, 3);
        let first = summary.transcript[0].text().unwrap();
        assert!(first.starts_with("(no response:"));
        assert!(first.contains("backend unavailable"));
        assert_eq!(summary.transcript[1].text(), Some("still here"));
    }

    #[tokio::test]
    async fn test_decision_timeout_recorded_and_loop_continues() {
        let dir = TempDir::new().unwrap();
        let slow = Arc::new(ScriptedDecider::new());
        slow.push_stall(Duration::from_secs(30), Action::text("too late"));
        let summary = SessionBuilder::new(dir.path())
            .config(SessionConfig {
                max_rounds: 3,
                actor_timeout: Some(Duration::from_millis(50)),
                ..SessionConfig::default()
            })
            .actor(Actor::new("A", Role::Admin), slow)
            .actor(Actor::new("B", Role::Planner), scripted(vec![Action::text("still here")]))
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(summary.reason, TerminationReason::MaxRoundsReached);
        assert_eq!(summary.round_count, 3);
        assert!(summary.transcript[0]
            .text()
            .unwrap()
            .starts_with("(no response: timed out"));
        assert_eq!(summary.transcript[1].text(), Some("still here"));
        assert_eq!(senders(&summary), ["A", "B", "A"]);
    }

    #[tokio::test]
    async fn test_zero_round_limit_ignores_initial_task() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(0)
            .actor(Actor::new("Admin", Role::Admin), scripted(vec![]))
            .build()
            .await
            .unwrap()
            .run(Some("build a todo app"))
            .await
            .unwrap();

        assert_eq!(summary.reason, TerminationReason::MaxRoundsReached);
        assert_eq!(summary.round_count, 0);
        assert!(summary.transcript.is_empty());
    }

    #[tokio::test]
    async fn test_handoff_directive_and_initial_task() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(3)
            .actor(Actor::new("Admin", Role::Admin), scripted(vec![]))
            .actor(
                Actor::new("Project_Manager", Role::Planner),
                scripted(vec![Action::text("Plan ready.\nNEXT: tester_agent")]),
            )
            .actor(Actor::new("Coder_Agent", Role::Executor), scripted(vec![]))
            .actor(Actor::new("Tester_Agent", Role::Verifier), scripted(vec![]))
            .build()
            .await
            .unwrap()
            .run(Some("build a todo app"))
            .await
            .unwrap();

        assert_eq!(summary.transcript[0].sender, "Admin");
        assert_eq!(summary.transcript[0].text(), Some("build a todo app"));
        assert_eq!(senders(&summary), ["Admin", "Project_Manager", "Tester_Agent"]);
    }

    #[tokio::test]
    async fn test_handoff_to_spaced_name() {
        let dir = TempDir::new().unwrap();
        let summary = SessionBuilder::new(dir.path())
            .max_rounds(2)
            .actor(
                Actor::new("Admin", Role::Admin),
                scripted(vec![Action::text("go\nNEXT: Tester Agent")]),
            )
            .actor(Actor::new("Project Manager", Role::Planner), scripted(vec![]))
            .actor(Actor::new("Tester Agent", Role::Verifier), scripted(vec![]))
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        assert_eq!(senders(&summary), ["Admin", "Tester Agent"]);
    }

    #[tokio::test]
    async fn test_storage_failure_terminates_with_annotated_summary() {
        let dir = TempDir::new().unwrap();
        let orch = SessionBuilder::new(dir.path())
            .max_rounds(5)
            .actor(
                Actor::new("PM", Role::Planner).with_tools(["update_context"]),
                scripted(vec![call("update_context", serde_json::json!({"name": "todo"}))]),
            )
            .build()
            .await
            .unwrap();
        // docs 被一个普通文件占用，上下文目录无法创建
        std::fs::write(dir.path().join("docs"), b"not a directory").unwrap();

        let summary = orch.run(None).await.unwrap();
        assert!(matches!(summary.reason, TerminationReason::StorageFailure(_)));
        assert!(summary.fatal.is_some());
        assert_eq!(summary.round_count, 1);
        match &summary.transcript[1].body {
            MessageBody::ToolResult(out) => assert_eq!(out.status_code, STATUS_FAILURE),
            other => panic!("expected tool result, got {:?}", other),
        }
        let text = std::fs::read_to_string(dir.path().join("chat_results.txt")).unwrap();
        assert!(text.contains("Fatal: "));
    }

    #[tokio::test]
    async fn test_concurrent_sessions_are_isolated() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let registry = Arc::new(builtin_registry());

        let session = |dir: &TempDir, name: &str| {
            SessionBuilder::new(dir.path())
                .max_rounds(1)
                .registry(registry.clone())
                .actor(
                    Actor::new("PM", Role::Planner).with_tools(["update_context"]),
                    scripted(vec![call("update_context", serde_json::json!({"name": name}))])
                        as Arc<dyn Decider>,
                )
        };
        let oa = session(&a, "alpha").build().await.unwrap();
        let ob = session(&b, "beta").build().await.unwrap();
        assert_ne!(oa.session_id(), ob.session_id());

        let (ra, rb) = tokio::join!(oa.run(None), ob.run(None));
        assert!(ra.unwrap().fatal.is_none());
        assert!(rb.unwrap().fatal.is_none());

        let ca = SharedContextStore::load(&SharedContextStore::path_for(a.path())).await.unwrap();
        let cb = SharedContextStore::load(&SharedContextStore::path_for(b.path())).await.unwrap();
        assert_eq!(ca.name, "alpha");
        assert_eq!(cb.name, "beta");
    }

    #[tokio::test]
    async fn test_events_stream_ends_with_terminated() {
        let dir = TempDir::new().unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        SessionBuilder::new(dir.path())
            .max_rounds(1)
            .events(tx)
            .actor(
                Actor::new("Admin", Role::Admin).with_tools(["echo"]),
                scripted(vec![call("echo", serde_json::json!({"text": "hi"}))]),
            )
            .build()
            .await
            .unwrap()
            .run(None)
            .await
            .unwrap();

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert!(matches!(events.first(), Some(SessionEvent::TurnStarted { round: 1, .. })));
        assert!(events.iter().any(|e| matches!(e, SessionEvent::ToolCall { .. })));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::Terminated {
                reason: TerminationReason::MaxRoundsReached,
                rounds: 1
            })
        ));
    }
}
