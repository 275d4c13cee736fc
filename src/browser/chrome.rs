//! Chrome 驱动：基于 headless_chrome 的 BrowserDriver 实现
//!
//! headless_chrome 的调用都是阻塞的，统一放进 spawn_blocking，并由一把异步锁串行化。
//! 锁随阻塞任务一起移交，直到阻塞调用真正返回才释放：调用方超时放弃后，下一个调用仍要排队。
//! 只持有一个标签页；`tag:has-text("...")` 这类文本锚定选择器不是 CSS，转成 XPath 再查找。
//! close 之后任何调用都返回 DriverError::Unavailable。

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use serde_json::Value;

use crate::browser::{BrowserDriver, DriverError, ScrollDirection};
use crate::config::BrowserSection;

const CLEAR_VALUE_FN: &str = r#"function() {
    if ('value' in this) { this.value = ''; } else { this.textContent = ''; }
    this.dispatchEvent(new Event('input', { bubbles: true }));
}"#;

struct ChromeSession {
    _browser: Browser,
    tab: Arc<Tab>,
}

/// 动作后的等待时间
#[derive(Debug, Clone, Copy)]
struct SettleDelays {
    navigation: Duration,
    click: Duration,
    scroll: Duration,
}

/// 真实 Chrome 驱动
pub struct ChromeDriver {
    session: Mutex<Option<ChromeSession>>,
    ops: Arc<tokio::sync::Mutex<()>>,
    settle: SettleDelays,
}

impl ChromeDriver {
    /// 启动 Chrome 并打开一个空白标签页
    pub async fn launch(cfg: &BrowserSection) -> Result<Self, DriverError> {
        let headless = cfg.headless;
        let window = (cfg.window_width, cfg.window_height);
        let element_timeout = Duration::from_secs(cfg.action_timeout_secs);

        let session = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions {
                headless,
                window_size: Some(window),
                ..Default::default()
            };
            let browser = Browser::new(options)
                .map_err(|e| DriverError::Unavailable(format!("Chrome launch failed: {}", e)))?;
            let tab = browser
                .new_tab()
                .map_err(|e| DriverError::Unavailable(format!("Browser tab failed: {}", e)))?;
            tab.set_default_timeout(element_timeout);
            Ok::<_, DriverError>(ChromeSession {
                _browser: browser,
                tab,
            })
        })
        .await
        .map_err(|e| DriverError::Unavailable(format!("Task join: {}", e)))??;

        tracing::info!(headless, width = window.0, height = window.1, "browser launched");
        Ok(Self {
            session: Mutex::new(Some(session)),
            ops: Arc::new(tokio::sync::Mutex::new(())),
            settle: SettleDelays {
                navigation: Duration::from_millis(cfg.navigation_settle_ms),
                click: Duration::from_millis(cfg.click_settle_ms),
                scroll: Duration::from_millis(cfg.scroll_settle_ms),
            },
        })
    }

    fn tab(&self) -> Result<Arc<Tab>, DriverError> {
        let guard = self
            .session
            .lock()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?;
        guard
            .as_ref()
            .map(|s| Arc::clone(&s.tab))
            .ok_or_else(|| DriverError::Unavailable("browser is closed".to_string()))
    }

    /// 在阻塞线程池上对当前标签页执行操作
    async fn with_tab<T, F>(&self, op: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = self.tab()?;
        run_exclusive(&self.ops, move || op(&tab)).await
    }
}

/// 持锁执行阻塞操作；锁的所有权移入阻塞线程
async fn run_exclusive<T, F>(ops: &Arc<tokio::sync::Mutex<()>>, op: F) -> Result<T, DriverError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, DriverError> + Send + 'static,
{
    let permit = Arc::clone(ops).lock_owned().await;
    tokio::task::spawn_blocking(move || {
        let _permit = permit;
        op()
    })
    .await
    .map_err(|e| DriverError::Unavailable(format!("Task join: {}", e)))?
}

/// 解析 `tag:has-text("text")`，返回 (tag, text)
pub fn parse_has_text(selector: &str) -> Option<(&str, String)> {
    let (tag, rest) = selector.split_once(":has-text(\"")?;
    let quoted = rest.strip_suffix("\")")?;
    if tag.is_empty() {
        return None;
    }
    Some((tag, quoted.replace("\\\"", "\"").replace("\\\\", "\\")))
}

/// 构造 XPath 字符串字面量；同时含单双引号时用 concat 拼接
pub fn xpath_literal(text: &str) -> String {
    if !text.contains('"') {
        return format!("\"{}\"", text);
    }
    if !text.contains('\'') {
        return format!("'{}'", text);
    }
    let parts: Vec<String> = text
        .split('"')
        .map(|p| format!("\"{}\"", p))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

fn find<'a>(tab: &'a Tab, selector: &str) -> Result<Element<'a>, DriverError> {
    let found = match parse_has_text(selector) {
        Some((tag, text)) => {
            let xpath = format!(
                "//{}[contains(normalize-space(.), {})]",
                tag,
                xpath_literal(&text)
            );
            tab.find_element_by_xpath(&xpath)
        }
        None => tab.find_element(selector),
    };
    found.map_err(|e| {
        tracing::debug!(selector = %selector, error = %e, "element lookup failed");
        DriverError::ElementNotFound(selector.to_string())
    })
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<String, DriverError> {
        let target = url.to_string();
        self.with_tab(move |tab| {
            tab.navigate_to(&target)
                .and_then(|t| t.wait_until_navigated())
                .map_err(|e| DriverError::Navigation(format!("{}: {}", target, e)))?;
            Ok(())
        })
        .await?;
        tokio::time::sleep(self.settle.navigation).await;
        self.current_url().await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        self.with_tab(move |tab| {
            let element = find(tab, &selector)?;
            element
                .scroll_into_view()
                .and_then(|el| el.click())
                .map_err(|e| DriverError::Interaction(e.to_string()))?;
            Ok(())
        })
        .await?;
        tokio::time::sleep(self.settle.click).await;
        Ok(())
    }

    async fn fill(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let selector = selector.to_string();
        let text = text.to_string();
        self.with_tab(move |tab| {
            let element = find(tab, &selector)?;
            element
                .call_js_fn(CLEAR_VALUE_FN, vec![], false)
                .map_err(|e| DriverError::Interaction(e.to_string()))?;
            element
                .type_into(&text)
                .map_err(|e| DriverError::Interaction(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn press_key(&self, key: &str) -> Result<(), DriverError> {
        let key = key.to_string();
        self.with_tab(move |tab| {
            tab.press_key(&key)
                .map_err(|e| DriverError::Interaction(format!("{}: {}", key, e)))?;
            Ok(())
        })
        .await
    }

    async fn scroll(&self, direction: ScrollDirection, amount: u32) -> Result<(), DriverError> {
        let js = format!("window.scrollBy(0, {})", direction.delta(amount));
        self.with_tab(move |tab| {
            tab.evaluate(&js, false)
                .map_err(|e| DriverError::Interaction(e.to_string()))?;
            Ok(())
        })
        .await?;
        tokio::time::sleep(self.settle.scroll).await;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, DriverError> {
        self.with_tab(|tab| {
            tab.capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
                .map_err(|e| DriverError::Interaction(format!("screenshot: {}", e)))
        })
        .await
    }

    async fn evaluate(&self, script: &str) -> Result<Value, DriverError> {
        let script = script.to_string();
        self.with_tab(move |tab| {
            let remote = tab
                .evaluate(&script, false)
                .map_err(|e| DriverError::Script(e.to_string()))?;
            Ok(remote.value.unwrap_or(Value::Null))
        })
        .await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.with_tab(|tab| Ok(tab.get_url())).await
    }

    async fn current_title(&self) -> Result<String, DriverError> {
        self.with_tab(|tab| {
            tab.get_title()
                .map_err(|e| DriverError::Script(format!("title: {}", e)))
        })
        .await
    }

    async fn close(&self) -> Result<(), DriverError> {
        let session = self
            .session
            .lock()
            .map_err(|e| DriverError::Unavailable(e.to_string()))?
            .take();
        if let Some(session) = session {
            // Browser 的 Drop 会结束 Chrome 进程，可能阻塞；等进行中的调用结束后再关
            run_exclusive(&self.ops, move || {
                drop(session);
                Ok(())
            })
            .await?;
            tracing::info!("browser closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_has_text() {
        assert_eq!(
            parse_has_text(r#"button:has-text("Sign in")"#),
            Some(("button", "Sign in".to_string()))
        );
        assert_eq!(
            parse_has_text(r#"a:has-text("say \"hi\"")"#),
            Some(("a", "say \"hi\"".to_string()))
        );
        assert_eq!(parse_has_text("#login"), None);
        assert_eq!(parse_has_text("div:nth-of-type(2)"), None);
    }

    #[tokio::test]
    async fn test_abandoned_call_still_blocks_next_one() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let ops = Arc::new(tokio::sync::Mutex::new(()));
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let slow = run_exclusive(&ops, move || {
            std::thread::sleep(Duration::from_millis(200));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), slow)
            .await
            .is_err());

        let flag = Arc::clone(&finished);
        let seen = run_exclusive(&ops, move || Ok(flag.load(Ordering::SeqCst)))
            .await
            .unwrap();
        assert!(seen);
    }

    #[test]
    fn test_xpath_literal() {
        assert_eq!(xpath_literal("plain"), "\"plain\"");
        assert_eq!(xpath_literal("say \"hi\""), "'say \"hi\"'");
        assert_eq!(
            xpath_literal("it's \"x\""),
            "concat(\"it's \", '\"', \"x\", '\"', \"\")"
        );
    }
}
