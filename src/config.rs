//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WEBPILOT__*` 覆盖（双下划线表示嵌套，如 `WEBPILOT__LLM__PROVIDER=openai`）。

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub browser: BrowserSection,
    pub safety: SafetySection,
    pub summarizer: SummarizerSection,
}

/// [app] 段：任务轮数上限
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 单个任务最多调用 Reasoner 的次数
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

fn default_max_turns() -> usize {
    30
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：deepseek / openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [browser] 段：启动参数、单次动作超时与各动作后的等待时间
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSection {
    #[serde(default)]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_navigation_settle_ms")]
    pub navigation_settle_ms: u64,
    #[serde(default = "default_click_settle_ms")]
    pub click_settle_ms: u64,
    #[serde(default = "default_scroll_settle_ms")]
    pub scroll_settle_ms: u64,
    /// 关闭浏览器前保存截图的路径（PNG）
    pub final_screenshot: Option<PathBuf>,
}

impl Default for BrowserSection {
    fn default() -> Self {
        Self {
            headless: false,
            window_width: default_window_width(),
            window_height: default_window_height(),
            action_timeout_secs: default_action_timeout_secs(),
            navigation_settle_ms: default_navigation_settle_ms(),
            click_settle_ms: default_click_settle_ms(),
            scroll_settle_ms: default_scroll_settle_ms(),
            final_screenshot: None,
        }
    }
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    800
}

fn default_action_timeout_secs() -> u64 {
    30
}

fn default_navigation_settle_ms() -> u64 {
    500
}

fn default_click_settle_ms() -> u64 {
    500
}

fn default_scroll_settle_ms() -> u64 {
    300
}

/// [safety] 段：需要确认的动作与危险关键词
#[derive(Debug, Clone, Deserialize)]
pub struct SafetySection {
    #[serde(default = "default_guarded_actions")]
    pub guarded_actions: Vec<String>,
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            guarded_actions: default_guarded_actions(),
            keywords: default_keywords(),
        }
    }
}

fn default_guarded_actions() -> Vec<String> {
    vec!["click".into()]
}

fn default_keywords() -> Vec<String> {
    [
        "delete", "remove", "pay", "buy", "confirm", "send", "submit", "удалить", "оплатить",
        "купить", "подтвердить", "отправить",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// [summarizer] 段：页面摘要的各项上限
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerSection {
    #[serde(default = "default_max_elements")]
    pub max_elements: usize,
    #[serde(default = "default_element_text_chars")]
    pub element_text_chars: usize,
    #[serde(default = "default_raw_text_chars")]
    pub raw_text_chars: usize,
    #[serde(default = "default_rendered_text_chars")]
    pub rendered_text_chars: usize,
}

impl Default for SummarizerSection {
    fn default() -> Self {
        Self {
            max_elements: default_max_elements(),
            element_text_chars: default_element_text_chars(),
            raw_text_chars: default_raw_text_chars(),
            rendered_text_chars: default_rendered_text_chars(),
        }
    }
}

fn default_max_elements() -> usize {
    100
}

fn default_element_text_chars() -> usize {
    100
}

fn default_raw_text_chars() -> usize {
    15000
}

fn default_rendered_text_chars() -> usize {
    8000
}

/// 从 config 目录加载配置，环境变量 WEBPILOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WEBPILOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WEBPILOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
