//! 任务主循环集成测试：MockLlmClient + MockDriver + ScriptedHuman，无需网络与 Chrome

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;
    use webpilot::browser::{BrowserDriver, DriverCall, MockDriver, PageSummarizer, RawElement};
    use webpilot::config::AppConfig;
    use webpilot::core::AgentError;
    use webpilot::human::{HumanPort, ScriptedHuman};
    use webpilot::llm::MockLlmClient;
    use webpilot::memory::{ActionResult, ConversationState, Turn};
    use webpilot::react::{
        AgentEvent, LlmReasoner, Orchestrator, RunOutcome, CANCELLED_BY_USER, DEFAULT_DIRECTIVE,
        SKIPPED_AFTER_DONE,
    };
    use webpilot::run_with_driver;
    use webpilot::tools::{ActionRouter, SafetyGate};

    fn orchestrator(
        llm: Arc<MockLlmClient>,
        driver: Arc<MockDriver>,
        human: Arc<dyn HumanPort>,
    ) -> Orchestrator {
        let router = ActionRouter::new(driver, PageSummarizer::new(), Arc::clone(&human), 5);
        Orchestrator::new(
            Arc::new(LlmReasoner::new(llm, 5)),
            router,
            SafetyGate::default(),
            human,
        )
    }

    fn search_page() -> MockDriver {
        let input = RawElement {
            tag: "input".into(),
            name: Some("q".into()),
            input_type: Some("text".into()),
            placeholder: Some("Search".into()),
            width: 400.0,
            height: 30.0,
            visibility: "visible".into(),
            nth_of_type: 1,
            ..RawElement::default()
        };
        let button = RawElement {
            tag: "button".into(),
            id: Some("search-button".into()),
            text: Some("Search".into()),
            width: 80.0,
            height: 30.0,
            visibility: "visible".into(),
            nth_of_type: 1,
            ..RawElement::default()
        };
        MockDriver::new().with_page("Example", vec![input, button], "Search the web")
    }

    fn result_turns(conv: &ConversationState) -> Vec<Vec<ActionResult>> {
        conv.turns()
            .iter()
            .filter_map(|t| match t {
                Turn::ActionResults { results } => Some(results.clone()),
                _ => None,
            })
            .collect()
    }

    /// ask_user 永远等不到答复
    struct SilentHuman;

    #[async_trait]
    impl HumanPort for SilentHuman {
        async fn ask(&self, _prompt: &str) -> Result<String, AgentError> {
            std::future::pending().await
        }

        async fn confirm(&self, _prompt: &str) -> Result<bool, AgentError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_search_task_completes() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"thought": "open the site", "actions": [{"id": "a1", "action": "goto", "args": {"url": "https://example.com"}}, {"id": "a2", "action": "analyze_page"}]}"#,
            r##"{"thought": "type the query", "actions": [{"id": "b1", "action": "fill", "args": {"selector": "input[name=\"q\"]", "text": "cats"}}, {"id": "b2", "action": "click", "args": {"selector": "#search-button"}}]}"##,
            r#"{"thought": "results are shown", "actions": [{"id": "c1", "action": "done", "args": {"summary": "searched for cats"}}]}"#,
        ]));
        let driver = Arc::new(search_page());
        let human = Arc::new(ScriptedHuman::new());
        let orch = orchestrator(llm.clone(), driver.clone(), human.clone());

        let run = orch
            .run("search for cats on example.com", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            run.outcome,
            RunOutcome::Completed {
                summary: "searched for cats".into()
            }
        );
        assert_eq!(run.turns, 3);
        assert_eq!(llm.call_count(), 3);
        assert!(llm.requests()[0][0].content.starts_with(DEFAULT_DIRECTIVE));
        // 任务 + 3 个 Reasoner 轮 + 3 个结果轮
        assert_eq!(run.conversation.len(), 7);

        let results = result_turns(&run.conversation);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0][0].id, "a1");
        assert_eq!(results[0][0].content, "navigated to https://example.com");
        assert_eq!(results[0][1].id, "a2");
        assert!(results[0][1].content.contains("input[name=\"q\"]"));
        assert!(results[0][1].content.contains("#search-button"));
        assert!(results[0][1].content.contains("Search the web"));
        assert_eq!(results[1][0].content, "entered text into input[name=\"q\"]");
        assert_eq!(results[1][1].content, "clicked element: #search-button");
        assert_eq!(results[2][0].content, "searched for cats");
        // 搜索按钮不含危险关键词，不需要确认
        assert!(human.prompts().is_empty());

        assert_eq!(
            driver.interactions(),
            vec![
                DriverCall::Navigate("https://example.com".into()),
                DriverCall::Fill("input[name=\"q\"]".into(), "cats".into()),
                DriverCall::Click("#search-button".into()),
            ]
        );
    }

    #[tokio::test]
    async fn test_results_follow_request_order() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"actions": [{"id": "x", "action": "press", "args": {"key": "Tab"}}, {"id": "y", "action": "teleport"}, {"id": "z", "action": "scroll", "args": {"direction": "down", "amount": 200}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let orch = orchestrator(llm, driver, Arc::new(ScriptedHuman::new()));

        let run = orch.run("poke around", CancellationToken::new()).await.unwrap();
        let results = result_turns(&run.conversation);
        let ids: Vec<&str> = results[0].iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
        assert_eq!(results[0][1].content, "unknown tool: teleport");
        assert_eq!(results[0][2].content, "scrolled down by 200px");
        // 第二轮脚本耗尽，纯文本回答
        assert!(matches!(run.outcome, RunOutcome::Answered { .. }));
    }

    #[tokio::test]
    async fn test_dangerous_click_declined() {
        let llm = Arc::new(MockLlmClient::scripted([
            r##"{"actions": [{"id": "k1", "action": "click", "args": {"selector": "#delete-account"}}]}"##,
            r#"{"actions": [{"id": "k2", "action": "done", "args": {"summary": "left the account alone"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let human = Arc::new(ScriptedHuman::new().confirm_with(false));
        let orch = orchestrator(llm, driver.clone(), human.clone());

        let run = orch.run("tidy my profile", CancellationToken::new()).await.unwrap();
        let results = result_turns(&run.conversation);
        assert_eq!(results[0], vec![ActionResult::new("k1", CANCELLED_BY_USER)]);
        assert!(driver.interactions().is_empty());
        assert_eq!(human.prompts().len(), 1);
        assert!(human.prompts()[0].contains("delete"));
    }

    #[tokio::test]
    async fn test_dangerous_click_approved() {
        let llm = Arc::new(MockLlmClient::scripted([
            r##"{"actions": [{"id": "p1", "action": "click", "args": {"selector": "#buy-now"}}]}"##,
            r#"{"actions": [{"id": "p2", "action": "done", "args": {"summary": "ordered"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let human = Arc::new(ScriptedHuman::new().confirm_with(true));
        let orch = orchestrator(llm, driver.clone(), human);

        let run = orch.run("buy the book", CancellationToken::new()).await.unwrap();
        assert_eq!(driver.interactions(), vec![DriverCall::Click("#buy-now".into())]);
        assert_eq!(
            result_turns(&run.conversation)[0][0].content,
            "clicked element: #buy-now"
        );
    }

    #[tokio::test]
    async fn test_safe_click_needs_no_confirmation() {
        let llm = Arc::new(MockLlmClient::scripted([
            r##"{"actions": [{"id": "s1", "action": "click", "args": {"selector": "#next-page"}}]}"##,
        ]));
        let driver = Arc::new(MockDriver::new());
        // 没有预设确认：若被询问会返回 HumanInput 错误
        let human = Arc::new(ScriptedHuman::new());
        let orch = orchestrator(llm, driver.clone(), human.clone());

        orch.run("next page", CancellationToken::new()).await.unwrap();
        assert!(human.prompts().is_empty());
        assert_eq!(driver.interactions(), vec![DriverCall::Click("#next-page".into())]);
    }

    #[tokio::test]
    async fn test_turn_budget_is_hard_stop() {
        let scroll = r#"{"actions": [{"action": "scroll", "args": {"direction": "down"}}]}"#;
        let llm = Arc::new(MockLlmClient::scripted([scroll, scroll, scroll, scroll]));
        let driver = Arc::new(MockDriver::new());
        let orch = orchestrator(llm.clone(), driver.clone(), Arc::new(ScriptedHuman::new()))
            .with_max_turns(2);

        let err = orch.run("scroll forever", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::TurnBudgetExhausted(2)));
        assert_eq!(llm.call_count(), 2);
        assert_eq!(driver.interactions().len(), 2);
    }

    #[tokio::test]
    async fn test_plain_reply_ends_with_answer() {
        let llm = Arc::new(MockLlmClient::scripted([
            "The page you asked about does not exist anymore.",
        ]));
        let driver = Arc::new(MockDriver::new());
        let orch = orchestrator(llm.clone(), driver.clone(), Arc::new(ScriptedHuman::new()))
            .with_directive("Only read pages, never type.");

        let run = orch.run("check the page", CancellationToken::new()).await.unwrap();
        let system = &llm.requests()[0][0].content;
        assert!(system.starts_with("Only read pages, never type."));
        assert!(system.contains("analyze_page"));
        assert_eq!(
            run.outcome,
            RunOutcome::Answered {
                text: "The page you asked about does not exist anymore.".into()
            }
        );
        assert_eq!(run.turns, 1);
        assert_eq!(run.conversation.len(), 2);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_reasoner_errors_are_fatal() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error("connection refused");
        let orch = orchestrator(llm, Arc::new(MockDriver::new()), Arc::new(ScriptedHuman::new()));
        let err = orch.run("anything", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ReasonerTransport(_)));

        let llm = Arc::new(MockLlmClient::scripted([r#"{"actions": [{"action": }]}"#]));
        let orch = orchestrator(llm.clone(), Arc::new(MockDriver::new()), Arc::new(ScriptedHuman::new()));
        let err = orch.run("anything", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::MalformedReasonerResponse(_)));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_actions_after_done_are_skipped() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"actions": [{"id": "d1", "action": "done", "args": {"summary": "finished early"}}, {"id": "d2", "action": "goto", "args": {"url": "https://late.example"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let orch = orchestrator(llm, driver.clone(), Arc::new(ScriptedHuman::new()));

        let run = orch.run("quick one", CancellationToken::new()).await.unwrap();
        let results = result_turns(&run.conversation);
        assert_eq!(
            results[0],
            vec![
                ActionResult::new("d1", "finished early"),
                ActionResult::new("d2", SKIPPED_AFTER_DONE),
            ]
        );
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_closed_browser_aborts_task() {
        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"actions": [{"action": "goto", "args": {"url": "https://example.com"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        driver.close().await.unwrap();
        let orch = orchestrator(llm, driver, Arc::new(ScriptedHuman::new()));

        let err = orch.run("open example", CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AgentError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_cancel_before_start() {
        let llm = Arc::new(MockLlmClient::scripted(["unused"]));
        let orch = orchestrator(llm.clone(), Arc::new(MockDriver::new()), Arc::new(ScriptedHuman::new()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = orch.run("never runs", cancel).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_user_closes_browser() {
        let llm: Arc<MockLlmClient> = Arc::new(MockLlmClient::scripted([
            r#"{"actions": [{"id": "q1", "action": "ask_user", "args": {"question": "Which size?"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = run_with_driver(
            &AppConfig::default(),
            "order a shirt",
            llm,
            driver.clone(),
            Arc::new(SilentHuman),
            None,
            cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
        assert!(driver.is_closed());
    }

    #[tokio::test]
    async fn test_run_with_driver_closes_and_screenshots() {
        let dir = tempfile::tempdir().unwrap();
        let shot = dir.path().join("final.png");
        let mut cfg = AppConfig::default();
        cfg.browser.final_screenshot = Some(shot.clone());

        let llm = Arc::new(MockLlmClient::scripted([
            r#"{"actions": [{"action": "done", "args": {"summary": "nothing to do"}}]}"#,
        ]));
        let driver = Arc::new(MockDriver::new());
        let run = run_with_driver(
            &cfg,
            "idle",
            llm,
            driver.clone(),
            Arc::new(ScriptedHuman::new()),
            None,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(
            run.outcome,
            RunOutcome::Completed {
                summary: "nothing to do".into()
            }
        );
        assert_eq!(driver.calls(), vec![DriverCall::Screenshot, DriverCall::Close]);
        assert!(driver.is_closed());
        assert!(shot.exists());
    }

    #[tokio::test]
    async fn test_events_report_progress() {
        let llm = Arc::new(MockLlmClient::scripted([
            r##"{"thought": "press submit", "actions": [{"id": "e1", "action": "click", "args": {"selector": "#submit"}}]}"##,
            r#"{"actions": [{"id": "e2", "action": "done", "args": {"summary": "form sent"}}]}"#,
        ]));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let orch = orchestrator(
            llm,
            Arc::new(MockDriver::new()),
            Arc::new(ScriptedHuman::new().confirm_with(true)),
        )
        .with_event_tx(tx);

        orch.run("send the form", CancellationToken::new()).await.unwrap();
        drop(orch);

        let mut events = Vec::new();
        while let Some(ev) = rx.recv().await {
            events.push(ev);
        }
        assert!(matches!(events.first(), Some(AgentEvent::TurnStarted { turn: 1, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ReasonerText { text } if text == "press submit")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ConfirmationRequired { id, .. } if id == "e1")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::Finished { summary } if summary == "form sent")));
    }
}
