//! 人工交互端口
//!
//! Orchestrator / SafetyGate / ActionRouter 通过 HumanPort 提问与确认，而不是直接读写控制台。
//! ConsoleHuman 读 stdin，ScriptedHuman 按预设队列作答（测试用）。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use crate::core::AgentError;

/// 人工交互端口：提问得到文本、确认得到布尔值；两者都阻塞直到得到答复
#[async_trait]
pub trait HumanPort: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, AgentError>;

    async fn confirm(&self, prompt: &str) -> Result<bool, AgentError>;
}

/// 解析确认答复；无法识别时返回 None（需重新询问）
pub fn parse_confirmation(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "д" | "да" => Some(true),
        "n" | "no" | "н" | "нет" => Some(false),
        _ => None,
    }
}

/// 控制台实现：提示写到 stdout，答复逐行读 stdin
pub struct ConsoleHuman {
    lines: tokio::sync::Mutex<Lines<BufReader<Stdin>>>,
}

impl Default for ConsoleHuman {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleHuman {
    pub fn new() -> Self {
        Self {
            lines: tokio::sync::Mutex::new(BufReader::new(tokio::io::stdin()).lines()),
        }
    }

    async fn prompt_line(&self, prompt: &str) -> Result<String, AgentError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(format!("{} ", prompt).as_bytes())
            .await
            .map_err(|e| AgentError::HumanInput(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| AgentError::HumanInput(e.to_string()))?;

        let mut lines = self.lines.lock().await;
        match lines.next_line().await {
            Ok(Some(line)) => Ok(line),
            Ok(None) => Err(AgentError::HumanInput("stdin closed".to_string())),
            Err(e) => Err(AgentError::HumanInput(e.to_string())),
        }
    }
}

#[async_trait]
impl HumanPort for ConsoleHuman {
    async fn ask(&self, prompt: &str) -> Result<String, AgentError> {
        let answer = self.prompt_line(&format!("{}\n>", prompt)).await?;
        Ok(answer.trim().to_string())
    }

    async fn confirm(&self, prompt: &str) -> Result<bool, AgentError> {
        let mut question = format!("{} (y/n):", prompt);
        loop {
            let answer = self.prompt_line(&question).await?;
            if let Some(decision) = parse_confirmation(&answer) {
                return Ok(decision);
            }
            question = "Please answer y or n (да/нет):".to_string();
        }
    }
}

/// 脚本化实现：按队列依次给出答复，并记录收到的提示
#[derive(Debug, Default)]
pub struct ScriptedHuman {
    answers: Mutex<VecDeque<String>>,
    confirmations: Mutex<VecDeque<bool>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedHuman {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer_with(self, answer: impl Into<String>) -> Self {
        if let Ok(mut q) = self.answers.lock() {
            q.push_back(answer.into());
        }
        self
    }

    pub fn confirm_with(self, decision: bool) -> Self {
        if let Ok(mut q) = self.confirmations.lock() {
            q.push_back(decision);
        }
        self
    }

    /// 收到的全部提示（ask 与 confirm 共用，按顺序）
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn record(&self, prompt: &str) {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(prompt.to_string());
        }
    }
}

#[async_trait]
impl HumanPort for ScriptedHuman {
    async fn ask(&self, prompt: &str) -> Result<String, AgentError> {
        self.record(prompt);
        self.answers
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| AgentError::HumanInput("no scripted answer left".to_string()))
    }

    async fn confirm(&self, prompt: &str) -> Result<bool, AgentError> {
        self.record(prompt);
        self.confirmations
            .lock()
            .ok()
            .and_then(|mut q| q.pop_front())
            .ok_or_else(|| AgentError::HumanInput("no scripted confirmation left".to_string()))
    }
}
