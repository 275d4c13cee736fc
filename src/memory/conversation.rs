//! 短期记忆：单次任务的对话轮次
//!
//! ConversationState 记录 UserText / ReasonerTurn / ActionResultTurn 三类轮次，
//! 只由 Orchestrator 追加，任务结束即丢弃（不跨任务持久化）。
//! Message / Role 为发往 LLM 的扁平消息格式。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Reasoner 请求的一次动作：id 由 Reasoner 分配（不透明），参数为未类型化的键值表
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: String,
    #[serde(rename = "action")]
    pub name: String,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl ActionRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// 动作结果：永远是文本，失败也编码为文本交回 Reasoner
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub id: String,
    pub content: String,
}

impl ActionResult {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// ReasonerTurn 中的内容块
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Action(ActionRequest),
}

/// 对话中的一轮
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    UserText { text: String },
    Reasoner { blocks: Vec<ContentBlock> },
    ActionResults { results: Vec<ActionResult> },
}

impl Turn {
    /// 本轮请求的动作（按出现顺序）
    pub fn action_requests(&self) -> Vec<&ActionRequest> {
        match self {
            Turn::Reasoner { blocks } => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Action(req) => Some(req),
                    ContentBlock::Text { .. } => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// 本轮所有文本块，按顺序以换行拼接
    pub fn text(&self) -> String {
        match self {
            Turn::UserText { text } => text.clone(),
            Turn::Reasoner { blocks } => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    ContentBlock::Action(_) => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Turn::ActionResults { .. } => String::new(),
        }
    }
}

/// 单次任务的对话状态：有序轮次日志
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    /// 以任务文本作为首个 UserText 轮次创建
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            turns: vec![Turn::UserText { text: task.into() }],
        }
    }

    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
