//! BrowserDriver：浏览器能力接口
//!
//! 所有实现（Chrome / Mock）只暴露原语：导航、点击、输入、按键、滚动、截图、脚本求值与 URL/标题读取。
//! 每个调用都返回显式的 Result<_, DriverError>，调用方无需捕获任意异常。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// 驱动调用失败的种类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("timed out: {0}")]
    Timeout(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("interaction failed: {0}")]
    Interaction(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    /// 浏览器未启动或已关闭；唯一不能转为文本结果的驱动错误
    #[error("browser unavailable: {0}")]
    Unavailable(String),
}

/// 滚动方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }

    /// 带符号的纵向位移
    pub fn delta(&self, amount: u32) -> i64 {
        match self {
            ScrollDirection::Up => -(amount as i64),
            ScrollDirection::Down => amount as i64,
        }
    }
}

/// 浏览器能力接口
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    /// 导航并等待加载，返回最终 URL
    async fn navigate(&self, url: &str) -> Result<String, DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// 清空并写入输入框
    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    async fn press_key(&self, key: &str) -> Result<(), DriverError>;

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DriverError>;

    /// PNG 截图
    async fn screenshot(&self) -> Result<Vec<u8>, DriverError>;

    /// 在页面中执行脚本并返回结果值
    async fn evaluate(&self, script: &str) -> Result<Value, DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn current_title(&self) -> Result<String, DriverError>;

    /// 释放浏览器资源；之后的任何调用都返回 Unavailable
    async fn close(&self) -> Result<(), DriverError>;
}
