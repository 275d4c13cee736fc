//! 任务运行时
//!
//! run_task：启动浏览器 -> 组装 Orchestrator -> run（与取消令牌竞争）-> 可选的最终截图 -> 关闭浏览器。
//! 只要驱动已创建，无论成功、失败还是取消，都会执行 driver.close()。

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::browser::{BrowserDriver, PageSummarizer};
use crate::config::AppConfig;
use crate::core::AgentError;
use crate::human::HumanPort;
use crate::llm::{LlmClient, MockLlmClient, OpenAiClient, DEEPSEEK_CHAT};
use crate::react::{AgentEvent, LlmReasoner, Orchestrator, RunResult};
use crate::tools::{ActionRouter, SafetyGate};

/// 按 [llm] 配置创建客户端。
/// 只有 provider = "mock" 才使用 Mock；缺少 API Key 或 provider 未知时返回错误，任务不会启动。
pub fn create_llm_from_config(cfg: &AppConfig) -> Result<Arc<dyn LlmClient>, AgentError> {
    create_llm_with_keys(cfg, |name| std::env::var(name).ok().filter(|v| !v.is_empty()))
}

fn create_llm_with_keys(
    cfg: &AppConfig,
    key: impl Fn(&str) -> Option<String>,
) -> Result<Arc<dyn LlmClient>, AgentError> {
    let provider = cfg.llm.provider.to_lowercase();

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Ok(Arc::new(MockLlmClient::new()))
        }
        "openai" => {
            let api_key = key("OPENAI_API_KEY").ok_or_else(|| missing_key("OPENAI_API_KEY"))?;
            let model = cfg.llm.model.as_deref().unwrap_or("gpt-4o-mini");
            tracing::info!("Using OpenAI LLM ({})", model);
            Ok(Arc::new(OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                model,
                Some(&api_key),
            )))
        }
        "deepseek" => {
            let api_key = key("DEEPSEEK_API_KEY")
                .or_else(|| key("OPENAI_API_KEY"))
                .ok_or_else(|| missing_key("DEEPSEEK_API_KEY"))?;
            let model = cfg.llm.model.as_deref().unwrap_or(DEEPSEEK_CHAT);
            tracing::info!("Using DeepSeek LLM ({})", model);
            Ok(Arc::new(OpenAiClient::deepseek(Some(model), &api_key)))
        }
        other => Err(AgentError::ConfigError(format!(
            "unknown llm provider '{}' (expected deepseek, openai or mock)",
            other
        ))),
    }
}

fn missing_key(var: &str) -> AgentError {
    AgentError::ReasonerTransport(format!("{} is not set", var))
}

/// 启动 Chrome 并执行一个任务
#[cfg(feature = "browser")]
pub async fn run_task(
    cfg: &AppConfig,
    task: &str,
    human: Arc<dyn HumanPort>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
    cancel: CancellationToken,
) -> Result<RunResult, AgentError> {
    let llm = create_llm_from_config(cfg)?;
    let driver = crate::browser::ChromeDriver::launch(&cfg.browser)
        .await
        .map_err(|e| AgentError::ResourceUnavailable(e.to_string()))?;
    run_with_driver(cfg, task, llm, Arc::new(driver), human, events, cancel).await
}

#[cfg(not(feature = "browser"))]
pub async fn run_task(
    _cfg: &AppConfig,
    _task: &str,
    _human: Arc<dyn HumanPort>,
    _events: Option<mpsc::UnboundedSender<AgentEvent>>,
    _cancel: CancellationToken,
) -> Result<RunResult, AgentError> {
    Err(AgentError::ConfigError(
        "built without the `browser` feature".to_string(),
    ))
}

/// 用给定的 LLM 与驱动执行一个任务；结束时（任何路径）关闭驱动
pub async fn run_with_driver(
    cfg: &AppConfig,
    task: &str,
    llm: Arc<dyn LlmClient>,
    driver: Arc<dyn BrowserDriver>,
    human: Arc<dyn HumanPort>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
    cancel: CancellationToken,
) -> Result<RunResult, AgentError> {
    let reasoner = Arc::new(LlmReasoner::new(llm, cfg.llm.timeouts.request));
    let router = ActionRouter::new(
        Arc::clone(&driver),
        PageSummarizer::from_config(&cfg.summarizer),
        Arc::clone(&human),
        cfg.browser.action_timeout_secs,
    );
    let mut orchestrator =
        Orchestrator::new(reasoner, router, SafetyGate::from_config(&cfg.safety), human)
            .with_max_turns(cfg.app.max_turns);
    if let Some(tx) = events {
        orchestrator = orchestrator.with_event_tx(tx);
    }

    let result = orchestrator.run(task, cancel).await;

    if let Some(path) = &cfg.browser.final_screenshot {
        save_screenshot(driver.as_ref(), path).await;
    }
    if let Err(e) = driver.close().await {
        tracing::warn!(error = %e, "browser close failed");
    }
    result
}

async fn save_screenshot(driver: &dyn BrowserDriver, path: &Path) {
    match driver.screenshot().await {
        Ok(png) => match tokio::fs::write(path, png).await {
            Ok(()) => tracing::info!(path = %path.display(), "final screenshot saved"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "screenshot write failed"),
        },
        Err(e) => tracing::warn!(error = %e, "final screenshot failed"),
    }
}
