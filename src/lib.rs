//! WebPilot - 由 LLM 驱动的浏览器自动化智能体
//!
//! 模块划分：
//! - **agent**: 任务运行时（启动浏览器、组装 Orchestrator、收尾关闭）
//! - **browser**: BrowserDriver 接口、Chrome / Mock 驱动、页面摘要
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与优雅关闭
//! - **human**: 人工交互端口（提问、确认）
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 任务内对话记录
//! - **react**: Reasoner 适配与任务主循环
//! - **tools**: 动作目录、安全闸门、动作分发

pub mod agent;
pub mod browser;
pub mod config;
pub mod core;
pub mod human;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

pub use agent::{run_task, run_with_driver};
pub use react::{Orchestrator, RunOutcome, RunResult};
