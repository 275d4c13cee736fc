//! Agent 错误类型
//!
//! 只有循环内无法恢复的错误才进入 AgentError：Reasoner 传输/格式错误、浏览器不可用、
//! 步数耗尽、取消、人工输入中断、配置错误。参数校验与驱动失败都在 ActionRouter 内转为文本结果。

use thiserror::Error;

/// 终止一次任务运行的错误
#[derive(Error, Debug)]
pub enum AgentError {
    /// 鉴权失败、网络失败、请求超时
    #[error("Reasoner transport error: {0}")]
    ReasonerTransport(String),

    /// Reasoner 返回了无法解析的动作 JSON
    #[error("Malformed reasoner response: {0}")]
    MalformedReasonerResponse(String),

    /// 浏览器未启动或已关闭
    #[error("Browser unavailable: {0}")]
    ResourceUnavailable(String),

    #[error("Turn budget exhausted after {0} turns")]
    TurnBudgetExhausted(usize),

    #[error("Cancelled by user")]
    Cancelled,

    /// 等待人工输入时输入流关闭或读取失败
    #[error("Human input failed: {0}")]
    HumanInput(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}
