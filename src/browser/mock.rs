//! Mock 浏览器驱动（用于测试，无需 Chrome）
//!
//! 记录每一次驱动调用；页面内容（URL、标题、可交互元素、正文）由测试预先设定，
//! evaluate 按脚本常量返回对应的 JSON，供 PageSummarizer 直接解析。

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::browser::summarizer::{RawElement, BODY_TEXT_SCRIPT, INTERACTIVE_ELEMENTS_SCRIPT};
use crate::browser::{BrowserDriver, DriverError, ScrollDirection};

/// Mock 记录的一次驱动调用
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Navigate(String),
    Click(String),
    Fill(String, String),
    PressKey(String),
    Scroll(ScrollDirection, u32),
    Screenshot,
    Evaluate,
    Close,
}

#[derive(Debug, Default)]
struct MockPage {
    url: String,
    title: String,
    elements: Vec<RawElement>,
    body_text: String,
}

/// Mock 驱动：记录调用，可指定找不到的选择器与导航失败
#[derive(Debug, Default)]
pub struct MockDriver {
    page: Mutex<MockPage>,
    calls: Mutex<Vec<DriverCall>>,
    missing_selectors: HashSet<String>,
    fail_navigation: bool,
    closed: Mutex<bool>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            page: Mutex::new(MockPage {
                url: "about:blank".to_string(),
                ..MockPage::default()
            }),
            ..Self::default()
        }
    }

    /// 设置页面标题、可交互元素与正文（URL 由 navigate 决定）
    pub fn with_page(self, title: &str, elements: Vec<RawElement>, body_text: &str) -> Self {
        if let Ok(mut page) = self.page.lock() {
            page.title = title.to_string();
            page.elements = elements;
            page.body_text = body_text.to_string();
        }
        self
    }

    /// 对该选择器的 click / fill 返回 ElementNotFound
    pub fn with_missing_selector(mut self, selector: &str) -> Self {
        self.missing_selectors.insert(selector.to_string());
        self
    }

    pub fn with_failing_navigation(mut self) -> Self {
        self.fail_navigation = true;
        self
    }

    /// 已记录的调用（按发生顺序）
    pub fn calls(&self) -> Vec<DriverCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 除 Evaluate 之外的调用，即会改变页面状态的操作
    pub fn interactions(&self) -> Vec<DriverCall> {
        self.calls()
            .into_iter()
            .filter(|c| !matches!(c, DriverCall::Evaluate))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.lock().map(|c| *c).unwrap_or(false)
    }

    fn record(&self, call: DriverCall) -> Result<(), DriverError> {
        if self.is_closed() {
            return Err(DriverError::Unavailable("browser already closed".to_string()));
        }
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        Ok(())
    }

    fn check_selector(&self, selector: &str) -> Result<(), DriverError> {
        if self.missing_selectors.contains(selector) {
            return Err(DriverError::ElementNotFound(selector.to_string()));
        }
        Ok(())
    }

    fn page<T>(&self, f: impl FnOnce(&mut MockPage) -> T) -> Result<T, DriverError> {
        let mut page = self
            .page
            .lock()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        Ok(f(&mut page))
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<String, DriverError> {
        self.record(DriverCall::Navigate(url.to_string()))?;
        if self.fail_navigation {
            return Err(DriverError::Navigation(format!("net::ERR_NAME_NOT_RESOLVED at {}", url)));
        }
        self.page(|p| {
            p.url = url.to_string();
            p.url.clone()
        })
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Click(selector.to_string()))?;
        self.check_selector(selector)
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.record(DriverCall::Fill(selector.to_string(), text.to_string()))?;
        self.check_selector(selector)
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        self.record(DriverCall::PressKey(key.to_string()))
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DriverError> {
        self.record(DriverCall::Scroll(direction, amount))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.record(DriverCall::Screenshot)?;
        Ok(b"\x89PNG\r\n\x1a\n".to_vec())
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        self.record(DriverCall::Evaluate)?;
        if script == INTERACTIVE_ELEMENTS_SCRIPT {
            let json = self.page(|p| serde_json::to_string(&p.elements))?
                .map_err(|e| DriverError::Script(e.to_string()))?;
            Ok(Value::String(json))
        } else if script == BODY_TEXT_SCRIPT {
            self.page(|p| Value::String(p.body_text.clone()))
        } else {
            Ok(Value::Null)
        }
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Unavailable("browser already closed".to_string()));
        }
        self.page(|p| p.url.clone())
    }

    async fn current_title(&self) -> Result<String, DriverError> {
        if self.is_closed() {
            return Err(DriverError::Unavailable("browser already closed".to_string()));
        }
        self.page(|p| p.title.clone())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.record(DriverCall::Close)?;
        if let Ok(mut closed) = self.closed.lock() {
            *closed = true;
        }
        Ok(())
    }
}
