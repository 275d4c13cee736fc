//! Reasoner：给定对话与动作目录，返回文本块与动作请求
//!
//! LlmReasoner 把任意 LlmClient 适配为 Reasoner：拼 system（固定指令 + 动作 Schema + 回复格式），
//! 把 ConversationState 展平为消息，再用 parse_reply 从模型输出中提取 JSON 动作列表。
//! 无 JSON 的回复视为纯文本（终止轮）；JSON 无法解析视为格式错误，直接终止任务，不重试。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::{ActionRequest, ActionResult, ContentBlock, ConversationState, Message, Turn};
use crate::tools::ActionSpec;

/// 追加在 system prompt 末尾的回复格式说明
const REPLY_FORMAT: &str = r#"Reply with exactly ONE JSON object and nothing else:
{"thought": "<one or two sentences>", "actions": [{"id": "<unique id>", "action": "<action name>", "args": {...}}]}
- You may request several actions; they run in order and you get every result back.
- Call "done" with a summary when the task is complete.
- An empty "actions" list ends the task immediately."#;

/// 一次 Reasoner 调用的输入
#[derive(Debug, Clone, Copy)]
pub struct ReasonerRequest<'a> {
    /// 固定的系统指令
    pub directive: &'a str,
    /// 可用动作目录
    pub actions: &'a [ActionSpec],
    pub conversation: &'a ConversationState,
}

/// 外部推理服务：返回一个 ReasonerTurn 的内容块
#[async_trait]
pub trait Reasoner: Send + Sync {
    async fn respond(&self, request: ReasonerRequest<'_>) -> Result<Vec<ContentBlock>, AgentError>;

    /// 累计 token：(prompt, completion, total)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 模型回复中的单个动作（id 可缺省，由 LlmReasoner 分配）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReplyAction {
    #[serde(default)]
    id: Option<String>,
    #[serde(alias = "tool", alias = "name")]
    action: String,
    #[serde(default)]
    args: Option<Value>,
}

/// 模型回复格式
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Reply {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    actions: Vec<ReplyAction>,
}

/// 基于 LlmClient 的 Reasoner
pub struct LlmReasoner {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl LlmReasoner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// system + 展平后的对话
    pub fn build_messages(request: &ReasonerRequest<'_>) -> Vec<Message> {
        let schema =
            serde_json::to_string_pretty(request.actions).unwrap_or_else(|_| "[]".to_string());
        let system = format!(
            "{}\n\nAvailable actions (JSON Schema of args):\n{}\n\n{}",
            request.directive, schema, REPLY_FORMAT
        );

        let mut messages = vec![Message::system(system)];
        for turn in request.conversation.turns() {
            messages.push(match turn {
                Turn::UserText { text } => Message::user(text.clone()),
                Turn::Reasoner { blocks } => Message::assistant(reply_json(blocks)),
                Turn::ActionResults { results } => Message::user(render_results(results)),
            });
        }
        messages
    }
}

#[async_trait]
impl Reasoner for LlmReasoner {
    async fn respond(&self, request: ReasonerRequest<'_>) -> Result<Vec<ContentBlock>, AgentError> {
        let messages = Self::build_messages(&request);
        let output = match timeout(self.timeout, self.llm.complete(&messages)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(AgentError::ReasonerTransport(e)),
            Err(_) => {
                return Err(AgentError::ReasonerTransport(format!(
                    "request timed out after {}s",
                    self.timeout.as_secs()
                )))
            }
        };
        tracing::debug!(output = %output, "reasoner output");
        parse_reply(&output)
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }
}

/// 把 ReasonerTurn 还原为模型自己的回复格式，保持多轮一致
fn reply_json(blocks: &[ContentBlock]) -> String {
    let mut thought = Vec::new();
    let mut actions = Vec::new();
    for block in blocks {
        match block {
            ContentBlock::Text { text } => thought.push(text.as_str()),
            ContentBlock::Action(req) => actions.push(ReplyAction {
                id: Some(req.id.clone()),
                action: req.name.clone(),
                args: Some(Value::Object(req.args.clone())),
            }),
        }
    }
    let reply = Reply {
        thought: if thought.is_empty() {
            None
        } else {
            Some(thought.join("\n"))
        },
        actions,
    };
    serde_json::to_string(&reply).unwrap_or_default()
}

fn render_results(results: &[ActionResult]) -> String {
    let body = results
        .iter()
        .map(|r| format!("[{}] {}", r.id, r.content))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("Action results:\n{}", body)
}

/// 从模型输出中定位 JSON：```json 代码块优先，否则取首个 '{' 到末个 '}'
fn locate_json(output: &str) -> Option<(usize, &str)> {
    if let Some(start) = output.find("```json") {
        let rest = &output[start + 7..];
        let body = rest.find("```").map(|end| &rest[..end]).unwrap_or(rest);
        return Some((start, body.trim()));
    }
    let start = output.find('{')?;
    let end = output.rfind('}')?;
    if end < start {
        return None;
    }
    Some((start, &output[start..=end]))
}

fn fresh_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 解析模型输出为内容块
pub fn parse_reply(output: &str) -> Result<Vec<ContentBlock>, AgentError> {
    let trimmed = output.trim();
    let plain = |text: &str| {
        if text.is_empty() {
            Vec::new()
        } else {
            vec![ContentBlock::Text {
                text: text.to_string(),
            }]
        }
    };

    let Some((start, json)) = locate_json(trimmed) else {
        return Ok(plain(trimmed));
    };

    let reply: Reply = serde_json::from_str(json)
        .map_err(|e| AgentError::MalformedReasonerResponse(format!("{}: {}", e, json)))?;

    let thought = reply.thought.as_deref().map(str::trim).unwrap_or("");
    if reply.actions.is_empty() && thought.is_empty() {
        return Ok(plain(trimmed));
    }

    let mut blocks = Vec::new();
    let prose = trimmed[..start].trim();
    if !thought.is_empty() {
        blocks.push(ContentBlock::Text {
            text: thought.to_string(),
        });
    } else if !prose.is_empty() {
        blocks.push(ContentBlock::Text {
            text: prose.to_string(),
        });
    }

    let mut seen = HashSet::new();
    for action in reply.actions {
        let id = match action.id.filter(|id| !id.trim().is_empty()) {
            Some(id) if !seen.contains(&id) => id,
            _ => fresh_id(),
        };
        seen.insert(id.clone());
        let args = match action.args {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        };
        blocks.push(ContentBlock::Action(ActionRequest {
            id,
            name: action.action,
            args,
        }));
    }
    Ok(blocks)
}
