//! 动作集合：封闭的 BrowserAction 变体 + 各动作的类型化参数
//!
//! Reasoner 给出的是「动作名 + 未类型化参数表」；BrowserAction::parse 先检查必填键，
//! 再反序列化为对应参数结构。参数结构同时用 schemars 生成注入 prompt 的 JSON Schema。

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::browser::ScrollDirection;

/// 默认滚动距离（像素）
pub const DEFAULT_SCROLL_AMOUNT: u32 = 500;

/// 参数校验错误（ValidationError）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("unknown tool: {0}")]
    UnknownAction(String),

    #[error("invalid arguments for {action}: missing required argument '{key}'")]
    MissingArgument { action: &'static str, key: &'static str },

    #[error("invalid arguments for {action}: {reason}")]
    InvalidArgument { action: &'static str, reason: String },
}

/// 动作名（无参数），用于 schema、校验表与安全闸门配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Goto,
    Click,
    Fill,
    Press,
    Scroll,
    AnalyzePage,
    AskUser,
    Done,
}

impl ActionKind {
    pub const ALL: [ActionKind; 8] = [
        ActionKind::Goto,
        ActionKind::Click,
        ActionKind::Fill,
        ActionKind::Press,
        ActionKind::Scroll,
        ActionKind::AnalyzePage,
        ActionKind::AskUser,
        ActionKind::Done,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Goto => "goto",
            ActionKind::Click => "click",
            ActionKind::Fill => "fill",
            ActionKind::Press => "press",
            ActionKind::Scroll => "scroll",
            ActionKind::AnalyzePage => "analyze_page",
            ActionKind::AskUser => "ask_user",
            ActionKind::Done => "done",
        }
    }

    /// 必填参数键
    pub fn required_args(&self) -> &'static [&'static str] {
        match self {
            ActionKind::Goto => &["url"],
            ActionKind::Click => &["selector"],
            ActionKind::Fill => &["selector", "text"],
            ActionKind::Press => &["key"],
            ActionKind::Scroll => &["direction"],
            ActionKind::AnalyzePage => &[],
            ActionKind::AskUser => &["question"],
            ActionKind::Done => &["summary"],
        }
    }

    /// 供 Reasoner 理解的功能描述
    pub fn description(&self) -> &'static str {
        match self {
            ActionKind::Goto => "Navigate to a URL and wait for the page to load.",
            ActionKind::Click => {
                "Click an element by CSS selector. Take selectors from analyze_page, never invent them."
            }
            ActionKind::Fill => "Replace the value of an input field with the given text.",
            ActionKind::Press => "Press a keyboard key (Enter, Tab, Escape, ...).",
            ActionKind::Scroll => "Scroll the page up or down by a number of pixels (default 500).",
            ActionKind::AnalyzePage => {
                "Read the current page: URL, title, interactive elements with selectors, visible text."
            }
            ActionKind::AskUser => "Ask the user a question when more information is needed.",
            ActionKind::Done => "Finish the task and report the result.",
        }
    }

    /// 该动作参数的 JSON Schema
    pub fn parameters_schema(&self) -> Value {
        let schema = match self {
            ActionKind::Goto => schema_for!(GotoArgs),
            ActionKind::Click => schema_for!(ClickArgs),
            ActionKind::Fill => schema_for!(FillArgs),
            ActionKind::Press => schema_for!(PressArgs),
            ActionKind::Scroll => schema_for!(ScrollArgs),
            ActionKind::AnalyzePage => schema_for!(AnalyzePageArgs),
            ActionKind::AskUser => schema_for!(AskUserArgs),
            ActionKind::Done => schema_for!(DoneArgs),
        };
        serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}))
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct GotoArgs {
    /// Absolute URL to open
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ClickArgs {
    /// CSS selector taken from analyze_page
    pub selector: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct FillArgs {
    /// CSS selector of the input field
    pub selector: String,
    /// Text to enter
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct PressArgs {
    /// Key name, e.g. Enter
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct ScrollArgs {
    pub direction: ScrollDirection,
    /// Pixels to scroll, default 500
    #[serde(default, deserialize_with = "lenient_amount")]
    #[schemars(with = "Option<u32>")]
    pub amount: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct AnalyzePageArgs {}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct AskUserArgs {
    /// Question for the user
    pub question: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, JsonSchema)]
pub struct DoneArgs {
    /// Final report of what was done
    pub summary: String,
}

/// LLM 常把数字写成字符串，这里两种都接受
fn lenient_amount<'de, D>(de: D) -> Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error;
    match Option::<Value>::deserialize(de)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("amount must be a positive integer, got {}", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<u32>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("amount must be a positive integer, got {:?}", s))),
        Some(other) => Err(D::Error::custom(format!(
            "amount must be a positive integer, got {}",
            other
        ))),
    }
}

/// 校验通过的动作：每个变体携带自己的类型化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserAction {
    Goto { url: String },
    Click { selector: String },
    Fill { selector: String, text: String },
    Press { key: String },
    Scroll { direction: ScrollDirection, amount: u32 },
    AnalyzePage,
    AskUser { question: String },
    Done { summary: String },
}

impl BrowserAction {
    /// 从动作名与参数表解析；缺键、类型不符或未知动作名均返回 ActionError
    pub fn parse(name: &str, args: &Map<String, Value>) -> Result<Self, ActionError> {
        let kind =
            ActionKind::from_name(name).ok_or_else(|| ActionError::UnknownAction(name.to_string()))?;

        if let Some(key) = kind
            .required_args()
            .iter()
            .find(|k| args.get(**k).map_or(true, Value::is_null))
        {
            return Err(ActionError::MissingArgument {
                action: kind.as_str(),
                key: *key,
            });
        }

        let value = Value::Object(args.clone());
        let invalid = |e: serde_json::Error| ActionError::InvalidArgument {
            action: kind.as_str(),
            reason: e.to_string(),
        };

        let action = match kind {
            ActionKind::Goto => {
                let a: GotoArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Goto { url: a.url }
            }
            ActionKind::Click => {
                let a: ClickArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Click { selector: a.selector }
            }
            ActionKind::Fill => {
                let a: FillArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Fill {
                    selector: a.selector,
                    text: a.text,
                }
            }
            ActionKind::Press => {
                let a: PressArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Press { key: a.key }
            }
            ActionKind::Scroll => {
                let a: ScrollArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Scroll {
                    direction: a.direction,
                    amount: a.amount.unwrap_or(DEFAULT_SCROLL_AMOUNT),
                }
            }
            ActionKind::AnalyzePage => BrowserAction::AnalyzePage,
            ActionKind::AskUser => {
                let a: AskUserArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::AskUser { question: a.question }
            }
            ActionKind::Done => {
                let a: DoneArgs = serde_json::from_value(value).map_err(invalid)?;
                BrowserAction::Done { summary: a.summary }
            }
        };
        Ok(action)
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            BrowserAction::Goto { .. } => ActionKind::Goto,
            BrowserAction::Click { .. } => ActionKind::Click,
            BrowserAction::Fill { .. } => ActionKind::Fill,
            BrowserAction::Press { .. } => ActionKind::Press,
            BrowserAction::Scroll { .. } => ActionKind::Scroll,
            BrowserAction::AnalyzePage => ActionKind::AnalyzePage,
            BrowserAction::AskUser { .. } => ActionKind::AskUser,
            BrowserAction::Done { .. } => ActionKind::Done,
        }
    }
}

/// 注入 system prompt 的动作目录
#[derive(Debug, Clone, Serialize)]
pub struct ActionSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

/// 全部动作的目录（固定顺序）
pub fn action_catalog() -> Vec<ActionSpec> {
    ActionKind::ALL
        .iter()
        .map(|k| ActionSpec {
            name: k.as_str(),
            description: k.description(),
            parameters: k.parameters_schema(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_fill_missing_text() {
        let err = BrowserAction::parse("fill", &args(json!({"selector": "#x"}))).unwrap_err();
        assert_eq!(
            err,
            ActionError::MissingArgument {
                action: "fill",
                key: "text"
            }
        );
        assert!(err.to_string().contains("missing required argument 'text'"));
    }

    #[test]
    fn test_unknown_action() {
        let err = BrowserAction::parse("hover", &Map::new()).unwrap_err();
        assert_eq!(err.to_string(), "unknown tool: hover");
    }

    #[test]
    fn test_scroll_defaults_and_lenient_amount() {
        let a = BrowserAction::parse("scroll", &args(json!({"direction": "down"}))).unwrap();
        assert_eq!(
            a,
            BrowserAction::Scroll {
                direction: ScrollDirection::Down,
                amount: 500
            }
        );
        let b = BrowserAction::parse("scroll", &args(json!({"direction": "up", "amount": "120"})))
            .unwrap();
        assert_eq!(
            b,
            BrowserAction::Scroll {
                direction: ScrollDirection::Up,
                amount: 120
            }
        );
    }

    #[test]
    fn test_scroll_bad_direction() {
        let err =
            BrowserAction::parse("scroll", &args(json!({"direction": "left"}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument { action: "scroll", .. }));
    }

    #[test]
    fn test_null_counts_as_missing() {
        let err = BrowserAction::parse("goto", &args(json!({"url": null}))).unwrap_err();
        assert!(matches!(err, ActionError::MissingArgument { key: "url", .. }));
    }

    #[test]
    fn test_wrong_type_is_invalid() {
        let err = BrowserAction::parse("press", &args(json!({"key": 13}))).unwrap_err();
        assert!(matches!(err, ActionError::InvalidArgument { action: "press", .. }));
    }

    #[test]
    fn test_catalog_covers_all_actions() {
        let catalog = action_catalog();
        let names: Vec<&str> = catalog.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["goto", "click", "fill", "press", "scroll", "analyze_page", "ask_user", "done"]
        );
        let fill = &catalog[2].parameters;
        let required = fill["required"].as_array().unwrap();
        assert!(required.contains(&json!("selector")));
        assert!(required.contains(&json!("text")));
    }
}
