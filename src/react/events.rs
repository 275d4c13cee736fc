//! 任务过程事件：用于控制台 / 前端展示思考、动作、确认与结果

use serde::Serialize;

/// Orchestrator 状态机的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Reasoning,
    Dispatching,
    AwaitingConfirmation,
    AwaitingUserText,
    Terminated,
}

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 第几轮 Reasoner 调用
    TurnStarted { turn: usize, max_turns: usize },
    StateChanged { state: LoopState },
    /// Reasoner 给出的文本（思考或最终回答）
    ReasonerText { text: String },
    ActionRequested {
        id: String,
        action: String,
        args: serde_json::Value,
    },
    /// 危险动作等待人工确认
    ConfirmationRequired { id: String, action: String, reason: String },
    ActionDeclined { id: String, action: String },
    /// 动作结果（预览，避免过长）
    ActionCompleted {
        id: String,
        action: String,
        preview: String,
    },
    /// done 被调用
    Finished { summary: String },
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Error { text: String },
}

impl AgentEvent {
    /// 控制台展示行；没有可展示内容时返回 None。
    /// ConfirmationRequired 不单独输出：SafetyGate 的确认提示里已经带有动作、参数与原因，
    /// 由事件打印任务再输出一遍可能落在 (y/n) 提示之后。
    pub fn console_line(&self) -> Option<String> {
        match self {
            AgentEvent::TurnStarted { turn, max_turns } => {
                Some(format!("\n--- step {}/{} ---", turn, max_turns))
            }
            AgentEvent::ReasonerText { text } => Some(format!("Thinking: {}", text)),
            AgentEvent::ActionRequested { action, args, .. } => {
                Some(format!("Action: {} {}", action, args))
            }
            AgentEvent::ActionDeclined { action, .. } => Some(format!("Declined: {}", action)),
            AgentEvent::ActionCompleted { preview, .. } => Some(format!("Result: {}", preview)),
            AgentEvent::Finished { summary } => Some(format!("\nDone: {}", summary)),
            AgentEvent::Error { text } => Some(format!("Error: {}", text)),
            AgentEvent::ConfirmationRequired { .. }
            | AgentEvent::StateChanged { .. }
            | AgentEvent::TokenUsage { .. } => None,
        }
    }
}
