//! ActionRouter：校验并分发单个动作
//!
//! 参数不全或未知动作名时直接生成描述校验失败的结果，不触碰任何协作者。
//! 合法动作一一映射到 BrowserDriver 调用、PageSummarizer、人工提问或终止信号。
//! 每个驱动调用都加超时，失败转为文本结果交回 Reasoner；只有浏览器不可用会作为 AgentError 向上返回。
//! 超时只放弃等待，不会中断驱动内部的操作；驱动自身负责串行化（见 ChromeDriver）。
//! 每次分发输出一条结构化审计日志（JSON）。

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::browser::{BrowserDriver, DriverError, PageSummarizer};
use crate::core::AgentError;
use crate::human::HumanPort;
use crate::memory::{ActionRequest, ActionResult};
use crate::tools::{ActionKind, BrowserAction};

/// 分发后循环应继续还是结束
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    /// done 动作：携带任务总结
    Finished(String),
}

/// 单次分发的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub result: ActionResult,
    pub outcome: Outcome,
}

/// 动作路由器：持有浏览器驱动、页面摘要器与人工端口
pub struct ActionRouter {
    driver: Arc<dyn BrowserDriver>,
    summarizer: PageSummarizer,
    human: Arc<dyn HumanPort>,
    timeout: Duration,
}

impl ActionRouter {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        summarizer: PageSummarizer,
        human: Arc<dyn HumanPort>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            driver,
            summarizer,
            human,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 校验并执行一个动作；校验失败与驱动失败都编码为文本结果
    pub async fn dispatch(&self, request: &ActionRequest) -> Result<Dispatch, AgentError> {
        let start = Instant::now();

        let (content, outcome, status) = match BrowserAction::parse(&request.name, &request.args) {
            Ok(action) => self.execute(action).await?,
            Err(e) => (e.to_string(), Outcome::Continue, "invalid"),
        };

        let audit = serde_json::json!({
            "event": "action_audit",
            "id": request.id,
            "action": request.name,
            "ok": status == "ok",
            "outcome": status,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(request),
        });
        tracing::info!(audit = %audit.to_string(), "action");

        Ok(Dispatch {
            result: ActionResult::new(request.id.clone(), content),
            outcome,
        })
    }

    async fn execute(
        &self,
        action: BrowserAction,
    ) -> Result<(String, Outcome, &'static str), AgentError> {
        let kind = action.kind();
        let result = match action {
            BrowserAction::Goto { url } => self
                .guarded(self.driver.navigate(&url))
                .await
                .map(|final_url| format!("navigated to {}", final_url)),
            BrowserAction::Click { selector } => self
                .guarded(self.driver.click(&selector))
                .await
                .map(|_| format!("clicked element: {}", selector)),
            BrowserAction::Fill { selector, text } => self
                .guarded(self.driver.fill(&selector, &text))
                .await
                .map(|_| format!("entered text into {}", selector)),
            BrowserAction::Press { key } => self
                .guarded(self.driver.press_key(&key))
                .await
                .map(|_| format!("pressed key: {}", key)),
            BrowserAction::Scroll { direction, amount } => self
                .guarded(self.driver.scroll(direction, amount))
                .await
                .map(|_| format!("scrolled {} by {}px", direction.as_str(), amount)),
            BrowserAction::AnalyzePage => self
                .guarded(self.summarizer.summarize(self.driver.as_ref()))
                .await
                .map(|snapshot| self.summarizer.render(&snapshot)),
            BrowserAction::AskUser { question } => {
                let answer = self.human.ask(&format!("Agent asks: {}", question)).await?;
                return Ok((format!("user answered: {}", answer), Outcome::Continue, "ok"));
            }
            BrowserAction::Done { summary } => {
                return Ok((summary.clone(), Outcome::Finished(summary), "ok"));
            }
        };

        match result {
            Ok(text) => Ok((text, Outcome::Continue, "ok")),
            Err(DriverError::Unavailable(msg)) => Err(AgentError::ResourceUnavailable(msg)),
            Err(e) => {
                tracing::warn!(action = %kind, error = %e, "driver call failed");
                let status = if matches!(e, DriverError::Timeout(_)) {
                    "timeout"
                } else {
                    "error"
                };
                Ok((failure_text(kind, &e), Outcome::Continue, status))
            }
        }
    }

    /// 给驱动调用加超时
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, DriverError>>,
    ) -> Result<T, DriverError> {
        match timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Timeout(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

fn failure_text(kind: ActionKind, e: &DriverError) -> String {
    format!("error executing {}: {}", kind, e)
}

fn args_preview(request: &ActionRequest) -> String {
    let s = serde_json::Value::Object(request.args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{DriverCall, MockDriver, ScrollDirection};
    use crate::human::ScriptedHuman;
    use serde_json::json;

    fn router_with(driver: Arc<MockDriver>, human: ScriptedHuman) -> ActionRouter {
        ActionRouter::new(driver, PageSummarizer::new(), Arc::new(human), 5)
    }

    #[tokio::test]
    async fn test_fill_missing_text_makes_no_driver_call() {
        let driver = Arc::new(MockDriver::new());
        let router = router_with(driver.clone(), ScriptedHuman::new());
        let d = router
            .dispatch(&ActionRequest::new("1", "fill", json!({"selector": "#x"})))
            .await
            .unwrap();
        assert_eq!(d.result.id, "1");
        assert!(d.result.content.contains("missing required argument 'text'"));
        assert_eq!(d.outcome, Outcome::Continue);
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let driver = Arc::new(MockDriver::new());
        let router = router_with(driver.clone(), ScriptedHuman::new());
        let d = router
            .dispatch(&ActionRequest::new("1", "teleport", json!({})))
            .await
            .unwrap();
        assert_eq!(d.result.content, "unknown tool: teleport");
        assert!(driver.calls().is_empty());
    }

    #[tokio::test]
    async fn test_result_texts() {
        let driver = Arc::new(MockDriver::new());
        let router = router_with(driver.clone(), ScriptedHuman::new());

        let goto = router
            .dispatch(&ActionRequest::new("a", "goto", json!({"url": "https://example.com"})))
            .await
            .unwrap();
        assert_eq!(goto.result.content, "navigated to https://example.com");

        let press = router
            .dispatch(&ActionRequest::new("b", "press", json!({"key": "Enter"})))
            .await
            .unwrap();
        assert_eq!(press.result.content, "pressed key: Enter");

        let scroll = router
            .dispatch(&ActionRequest::new("c", "scroll", json!({"direction": "up"})))
            .await
            .unwrap();
        assert_eq!(scroll.result.content, "scrolled up by 500px");

        assert_eq!(
            driver.calls(),
            vec![
                DriverCall::Navigate("https://example.com".into()),
                DriverCall::PressKey("Enter".into()),
                DriverCall::Scroll(ScrollDirection::Up, 500),
            ]
        );
    }

    #[tokio::test]
    async fn test_driver_failure_becomes_text() {
        let driver = Arc::new(MockDriver::new().with_missing_selector("#gone"));
        let router = router_with(driver, ScriptedHuman::new());
        let d = router
            .dispatch(&ActionRequest::new("1", "click", json!({"selector": "#gone"})))
            .await
            .unwrap();
        assert_eq!(d.result.content, "error executing click: element not found: #gone");
        assert_eq!(d.outcome, Outcome::Continue);
    }

    #[tokio::test]
    async fn test_navigation_failure_becomes_text() {
        let driver = Arc::new(MockDriver::new().with_failing_navigation());
        let router = router_with(driver, ScriptedHuman::new());
        let d = router
            .dispatch(&ActionRequest::new("1", "goto", json!({"url": "https://nowhere.invalid"})))
            .await
            .unwrap();
        assert!(d.result.content.starts_with("error executing goto: navigation failed"));
    }

    #[tokio::test]
    async fn test_closed_browser_is_fatal() {
        let driver = Arc::new(MockDriver::new());
        driver.close().await.unwrap();
        let router = router_with(driver, ScriptedHuman::new());
        let err = router
            .dispatch(&ActionRequest::new("1", "press", json!({"key": "Tab"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ResourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_ask_user_and_done() {
        let driver = Arc::new(MockDriver::new());
        let router = router_with(driver.clone(), ScriptedHuman::new().answer_with("42"));
        let ask = router
            .dispatch(&ActionRequest::new("q", "ask_user", json!({"question": "Which order?"})))
            .await
            .unwrap();
        assert_eq!(ask.result.content, "user answered: 42");

        let done = router
            .dispatch(&ActionRequest::new("d", "done", json!({"summary": "all set"})))
            .await
            .unwrap();
        assert_eq!(done.result.content, "all set");
        assert_eq!(done.outcome, Outcome::Finished("all set".into()));
        assert!(driver.calls().is_empty());
    }
}
