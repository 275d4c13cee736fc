//! PageSummarizer：把实时 DOM 压缩为有界的页面快照文本
//!
//! 1. 页面内脚本按文档顺序收集可交互节点（链接、按钮、表单控件、role="button"、onclick、tabindex="0"）
//!    的原始属性，另一段脚本提取去掉 script/style/noscript/iframe/svg 后的正文。
//! 2. Rust 侧过滤不可见节点、截取前 N 个、推导显示文本与选择器、压缩并截断正文。
//! 3. render 生成发给 Reasoner 的确定性文本。
//!
//! 截断是有损的：目的是限制 Reasoner 的 token 开销与延迟。快照不跨轮次缓存。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::browser::{BrowserDriver, DriverError};
use crate::config::SummarizerSection;

/// 收集可交互节点原始属性的页面脚本（返回 JSON 字符串）
pub const INTERACTIVE_ELEMENTS_SCRIPT: &str = r#"
(() => {
  const selectors = 'a, button, input, select, textarea, [role="button"], [onclick], [tabindex="0"]';
  const out = [];
  document.querySelectorAll(selectors).forEach((el) => {
    const rect = el.getBoundingClientRect();
    const style = window.getComputedStyle(el);
    let nth = 1;
    for (let s = el.previousElementSibling; s; s = s.previousElementSibling) {
      if (s.tagName === el.tagName) nth++;
    }
    out.push({
      tag: el.tagName.toLowerCase(),
      id: el.id || null,
      name: el.getAttribute('name') || null,
      classes: typeof el.className === 'string' ? el.className : '',
      text: (el.innerText || '').slice(0, 200),
      text_content: (el.textContent || '').slice(0, 500),
      value: typeof el.value === 'string' ? el.value.slice(0, 200) : null,
      placeholder: el.getAttribute('placeholder') || null,
      aria_label: el.getAttribute('aria-label') || null,
      type: typeof el.type === 'string' && el.type ? el.type : null,
      href: typeof el.href === 'string' && el.href ? el.href : null,
      width: rect.width,
      height: rect.height,
      visibility: style.visibility,
      nth_of_type: nth,
    });
  });
  return JSON.stringify(out);
})()
"#;

/// 提取页面正文的脚本（在 body 副本上移除非正文子树）
pub const BODY_TEXT_SCRIPT: &str = r#"
(() => {
  if (!document.body) return '';
  const clone = document.body.cloneNode(true);
  ['script', 'style', 'noscript', 'iframe', 'svg'].forEach((tag) => {
    clone.querySelectorAll(tag).forEach((el) => el.remove());
  });
  return clone.innerText || clone.textContent || '';
})()
"#;

/// 选择器中 class token 的最大长度
const MAX_CLASS_TOKEN_CHARS: usize = 30;
/// 文本锚定选择器取显示文本的前 N 个字符
const TEXT_ANCHOR_CHARS: usize = 30;
/// render 中元素文本与链接的展示长度
const RENDER_TEXT_CHARS: usize = 50;
const RENDER_HREF_CHARS: usize = 60;

/// 页面脚本返回的单个节点原始属性
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    pub tag: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub text: Option<String>,
    /// textContent，即 XPath 字符串值；文本锚点基于它生成
    #[serde(default)]
    pub text_content: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub aria_label: Option<String>,
    #[serde(default, rename = "type")]
    pub input_type: Option<String>,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub visibility: String,
    #[serde(default = "default_nth_of_type")]
    pub nth_of_type: usize,
}

fn default_nth_of_type() -> usize {
    1
}

impl RawElement {
    /// 渲染尺寸非零且 visibility 不为 hidden
    fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0 && self.visibility != "hidden"
    }
}

/// 快照中的可交互元素；index 仅在本快照内有效
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveElement {
    pub index: usize,
    pub tag: String,
    pub selector: String,
    pub text: String,
    #[serde(rename = "type")]
    pub input_type: Option<String>,
    pub href: Option<String>,
}

/// 某一时刻的页面快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSnapshot {
    pub url: String,
    pub title: String,
    pub text: String,
    pub elements: Vec<InteractiveElement>,
}

/// 页面摘要器：持有各项截断上限
#[derive(Debug, Clone)]
pub struct PageSummarizer {
    max_elements: usize,
    element_text_chars: usize,
    raw_text_chars: usize,
    rendered_text_chars: usize,
}

impl Default for PageSummarizer {
    fn default() -> Self {
        Self::from_config(&SummarizerSection::default())
    }
}

impl PageSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(cfg: &SummarizerSection) -> Self {
        Self {
            max_elements: cfg.max_elements,
            element_text_chars: cfg.element_text_chars,
            raw_text_chars: cfg.raw_text_chars,
            rendered_text_chars: cfg.rendered_text_chars,
        }
    }

    /// 从实时页面生成快照。
    /// 元素或正文脚本失败时降级为空（记录 warn），只有 Unavailable 会向上返回。
    pub async fn summarize(&self, driver: &dyn BrowserDriver) -> Result<PageSnapshot, DriverError> {
        let url = driver.current_url().await?;
        let title = driver.current_title().await?;

        let raw = match driver.evaluate(INTERACTIVE_ELEMENTS_SCRIPT).await {
            Ok(value) => parse_raw_elements(value).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "interactive element payload unreadable");
                Vec::new()
            }),
            Err(e @ DriverError::Unavailable(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "interactive element extraction failed");
                Vec::new()
            }
        };

        let body = match driver.evaluate(BODY_TEXT_SCRIPT).await {
            Ok(Value::String(s)) => s,
            Ok(_) => String::new(),
            Err(e @ DriverError::Unavailable(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "body text extraction failed");
                String::new()
            }
        };

        let elements = self.select_elements(raw);
        let text = truncate_chars(&collapse_whitespace(&body), self.raw_text_chars);
        tracing::info!(url = %url, elements = elements.len(), text_chars = text.chars().count(), "page summarized");

        Ok(PageSnapshot {
            url,
            title,
            text,
            elements,
        })
    }

    /// 过滤不可见节点，保留前 max_elements 个并推导显示文本与选择器
    pub fn select_elements(&self, raw: Vec<RawElement>) -> Vec<InteractiveElement> {
        raw.into_iter()
            .filter(RawElement::is_visible)
            .take(self.max_elements)
            .enumerate()
            .map(|(index, el)| {
                let text = truncate_chars(&display_text(&el), self.element_text_chars);
                let selector = derive_selector(&el);
                InteractiveElement {
                    index,
                    tag: el.tag,
                    selector,
                    text,
                    input_type: el.input_type.filter(|t| !t.is_empty()),
                    href: el.href.filter(|h| !h.is_empty()),
                }
            })
            .collect()
    }

    /// 渲染为发给 Reasoner 的文本；相同快照总是得到相同输出
    pub fn render(&self, snapshot: &PageSnapshot) -> String {
        let mut lines = vec![
            format!("URL: {}", snapshot.url),
            format!("Title: {}", snapshot.title),
            String::new(),
            "=== Interactive elements ===".to_string(),
        ];

        if snapshot.elements.is_empty() {
            lines.push("(none)".to_string());
        }
        for el in &snapshot.elements {
            let mut line = format!("[{}] <{}> {}", el.index, el.tag, el.selector);
            if !el.text.is_empty() {
                let text = normalize_space(&el.text);
                line.push_str(&format!(" \"{}\"", truncate_chars(&text, RENDER_TEXT_CHARS)));
            }
            if let Some(ref href) = el.href {
                line.push_str(&format!(" -> {}", truncate_chars(href, RENDER_HREF_CHARS)));
            }
            if let Some(ref t) = el.input_type {
                line.push_str(&format!(" (type={})", t));
            }
            lines.push(line);
        }

        lines.push(String::new());
        lines.push("=== Page text ===".to_string());
        lines.push(truncate_chars(&snapshot.text, self.rendered_text_chars));

        lines.join("\n")
    }
}

fn parse_raw_elements(value: Value) -> Result<Vec<RawElement>, serde_json::Error> {
    match value {
        Value::String(s) => serde_json::from_str(&s),
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other),
    }
}

/// 显示文本优先级：渲染文本 > value > placeholder > aria-label，压成单行
fn display_text(el: &RawElement) -> String {
    [&el.text, &el.value, &el.placeholder, &el.aria_label]
        .into_iter()
        .filter_map(|s| s.as_deref())
        .map(normalize_space)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// 选择器优先级：#id > tag[name] > tag.class1.class2 > tag:has-text("...")
/// > tag[placeholder="..."] > tag[aria-label="..."] > tag:nth-of-type(n)
///
/// 文本锚点只取节点自身的文本（textContent，缺失时用 innerText），按 XPath normalize-space
/// 的规则压缩空白，保证 `contains(normalize-space(.), ...)` 能在实时 DOM 中命中。
/// value / placeholder / aria-label 不属于节点文本，不能用作文本锚点。
pub fn derive_selector(el: &RawElement) -> String {
    let tag = el.tag.as_str();

    if let Some(id) = el.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        return if is_css_identifier(id) {
            format!("#{}", id)
        } else {
            format!("{}[id=\"{}\"]", tag, escape_quoted(id))
        };
    }

    if let Some(name) = el.name.as_deref().filter(|s| !s.is_empty()) {
        return format!("{}[name=\"{}\"]", tag, escape_quoted(name));
    }

    let classes: Vec<&str> = el
        .classes
        .split_whitespace()
        .filter(|c| {
            !c.contains(':') && c.chars().count() <= MAX_CLASS_TOKEN_CHARS && is_css_identifier(c)
        })
        .take(2)
        .collect();
    if !classes.is_empty() {
        return format!("{}.{}", tag, classes.join("."));
    }

    let own_text = el
        .text_content
        .as_deref()
        .or(el.text.as_deref())
        .map(normalize_space)
        .unwrap_or_default();
    if !own_text.is_empty() {
        let anchor = truncate_chars(&own_text, TEXT_ANCHOR_CHARS);
        return format!("{}:has-text(\"{}\")", tag, escape_quoted(anchor.trim_end()));
    }

    for (attr, value) in [("placeholder", &el.placeholder), ("aria-label", &el.aria_label)] {
        if let Some(v) = value.as_deref().filter(|v| is_exact_attr_value(v)) {
            return format!("{}[{}=\"{}\"]", tag, attr, escape_quoted(v));
        }
    }

    format!("{}:nth-of-type({})", tag, el.nth_of_type.max(1))
}

/// 可直接用于 `#x` / `.x` 的 CSS 标识符（保守判断）
fn is_css_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some('-') => {
            if matches!(chars.clone().next(), Some(c) if c.is_ascii_digit()) {
                return false;
            }
        }
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 属性值原样用于 `[attr="..."]` 精确匹配：非空且不含控制字符
fn is_exact_attr_value(v: &str) -> bool {
    !v.trim().is_empty() && !v.chars().any(char::is_control)
}

fn escape_quoted(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn blank_lines_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").ok()).as_ref()
}

fn spaces_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r" {2,}").ok()).as_ref()
}

/// 3 个以上连续换行压为 2 个，2 个以上连续空格压为 1 个，去首尾空白
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = text.to_string();
    if let Some(re) = blank_lines_re() {
        out = re.replace_all(&out, "\n\n").into_owned();
    }
    if let Some(re) = spaces_re() {
        out = re.replace_all(&out, " ").into_owned();
    }
    out.trim().to_string()
}

/// 与 XPath normalize-space 一致：只把空格、制表、回车、换行视为空白
pub fn normalize_space(s: &str) -> String {
    s.split([' ', '\t', '\r', '\n'])
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// 按字符（而非字节）截断
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
