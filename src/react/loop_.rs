//! Orchestrator：任务主循环
//!
//! Reasoning -> (无动作则终止) -> 逐个动作：SafetyGate 判断 -> 必要时等待确认 -> ActionRouter 分发
//! -> 结果按请求顺序汇成一个 ActionResultTurn -> 下一轮 Reasoning。
//! 严格串行：任一时刻只有一个 Reasoner 调用、驱动调用或人工等待在进行。
//! 最大轮数为硬上限；取消令牌触发时立即终止，本轮已收集的结果直接丢弃。

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::human::HumanPort;
use crate::memory::{ActionRequest, ActionResult, ConversationState, Turn};
use crate::react::{AgentEvent, LoopState, Reasoner, ReasonerRequest};
use crate::tools::{action_catalog, ActionKind, ActionRouter, ActionSpec, Dispatch, Outcome, SafetyGate};

/// 默认最大 Reasoner 轮数
pub const DEFAULT_MAX_TURNS: usize = 30;
/// 用户拒绝危险动作时的结果文本
pub const CANCELLED_BY_USER: &str = "cancelled by user";
/// 同一轮中排在 done 之后的动作不再执行
pub const SKIPPED_AFTER_DONE: &str = "skipped: task already finished";
/// 动作结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 固定系统指令
pub const DEFAULT_DIRECTIVE: &str = "You are an agent that operates a real web browser to complete the user's task.

Rules:
1. Use analyze_page to learn what is on the current page.
2. Take selectors from the interactive element list of analyze_page. Never make selectors up.
3. Work step by step and check the outcome of every action.
4. If an action fails, read the error and try a different approach.
5. If you need information only the user has, use ask_user.
6. When the task is complete, call done with a short report.

Be careful with destructive actions (deleting, paying, submitting): make sure they are what the user asked for.";

/// 任务的正常结束方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// done 被调用
    Completed { summary: String },
    /// Reasoner 某一轮没有请求任何动作，其文本即回答
    Answered { text: String },
}

/// 任务执行结果：结束方式、完整对话与 Reasoner 轮数
#[derive(Debug)]
pub struct RunResult {
    pub outcome: RunOutcome,
    pub conversation: ConversationState,
    pub turns: usize,
}

/// 任务编排器
pub struct Orchestrator {
    reasoner: Arc<dyn Reasoner>,
    router: ActionRouter,
    gate: SafetyGate,
    human: Arc<dyn HumanPort>,
    directive: String,
    catalog: Vec<ActionSpec>,
    max_turns: usize,
    event_tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl Orchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        router: ActionRouter,
        gate: SafetyGate,
        human: Arc<dyn HumanPort>,
    ) -> Self {
        Self {
            reasoner,
            router,
            gate,
            human,
            directive: DEFAULT_DIRECTIVE.to_string(),
            catalog: action_catalog(),
            max_turns: DEFAULT_MAX_TURNS,
            event_tx: None,
        }
    }

    /// 设置最大轮数
    pub fn with_max_turns(mut self, max_turns: usize) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// 覆盖系统指令
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directive = directive.into();
        self
    }

    fn send_event(&self, ev: AgentEvent) {
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(ev);
        }
    }

    fn set_state(&self, state: LoopState) {
        tracing::debug!(?state, "loop state");
        self.send_event(AgentEvent::StateChanged { state });
    }

    /// 执行一个任务，直到 done、无动作轮、致命错误、轮数耗尽或被取消
    pub async fn run(&self, task: &str, cancel: CancellationToken) -> Result<RunResult, AgentError> {
        tracing::info!(task = %task, max_turns = self.max_turns, "task started");
        let mut conversation = ConversationState::new(task);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            r = self.drive(&mut conversation) => r,
        };

        match result {
            Ok((outcome, turns)) => {
                tracing::info!(turns, ?outcome, "task finished");
                Ok(RunResult {
                    outcome,
                    conversation,
                    turns,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, "task aborted");
                self.send_event(AgentEvent::Error { text: e.to_string() });
                self.set_state(LoopState::Terminated);
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        conversation: &mut ConversationState,
    ) -> Result<(RunOutcome, usize), AgentError> {
        let mut turn = 0;

        loop {
            if turn >= self.max_turns {
                return Err(AgentError::TurnBudgetExhausted(self.max_turns));
            }
            turn += 1;
            self.send_event(AgentEvent::TurnStarted {
                turn,
                max_turns: self.max_turns,
            });
            self.set_state(LoopState::Reasoning);

            let blocks = self
                .reasoner
                .respond(ReasonerRequest {
                    directive: &self.directive,
                    actions: &self.catalog,
                    conversation,
                })
                .await?;

            let (prompt_tokens, completion_tokens, total_tokens) = self.reasoner.token_usage();
            if total_tokens > 0 {
                self.send_event(AgentEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens,
                });
            }

            let reasoner_turn = Turn::Reasoner { blocks };
            let text = reasoner_turn.text();
            if !text.is_empty() {
                self.send_event(AgentEvent::ReasonerText { text: text.clone() });
            }
            let requests: Vec<ActionRequest> =
                reasoner_turn.action_requests().into_iter().cloned().collect();
            conversation.push(reasoner_turn);

            if requests.is_empty() {
                tracing::info!(turn, "reasoner requested no actions");
                self.set_state(LoopState::Terminated);
                return Ok((RunOutcome::Answered { text }, turn));
            }

            tracing::info!(turn, actions = requests.len(), "dispatching actions");
            self.set_state(LoopState::Dispatching);

            let mut results = Vec::with_capacity(requests.len());
            let mut finished: Option<String> = None;
            for request in &requests {
                if finished.is_some() {
                    results.push(ActionResult::new(request.id.clone(), SKIPPED_AFTER_DONE));
                    continue;
                }
                let dispatch = self.handle(request).await?;
                if let Outcome::Finished(summary) = dispatch.outcome {
                    finished = Some(summary);
                }
                results.push(dispatch.result);
            }
            conversation.push(Turn::ActionResults { results });

            if let Some(summary) = finished {
                self.send_event(AgentEvent::Finished {
                    summary: summary.clone(),
                });
                self.set_state(LoopState::Terminated);
                return Ok((RunOutcome::Completed { summary }, turn));
            }
        }
    }

    /// 单个动作：安全闸门 -> 可能的确认 -> 分发
    async fn handle(&self, request: &ActionRequest) -> Result<Dispatch, AgentError> {
        let args = serde_json::Value::Object(request.args.clone());
        tracing::info!(id = %request.id, action = %request.name, args = %args, "action requested");
        self.send_event(AgentEvent::ActionRequested {
            id: request.id.clone(),
            action: request.name.clone(),
            args: args.clone(),
        });

        let verdict = self.gate.classify(&request.name, &request.args);
        if verdict.dangerous {
            self.set_state(LoopState::AwaitingConfirmation);
            self.send_event(AgentEvent::ConfirmationRequired {
                id: request.id.clone(),
                action: request.name.clone(),
                reason: verdict.reason.clone(),
            });
            let approved = self
                .gate
                .confirm(self.human.as_ref(), &request.name, &args.to_string(), &verdict.reason)
                .await?;
            self.set_state(LoopState::Dispatching);
            if !approved {
                self.send_event(AgentEvent::ActionDeclined {
                    id: request.id.clone(),
                    action: request.name.clone(),
                });
                return Ok(Dispatch {
                    result: ActionResult::new(request.id.clone(), CANCELLED_BY_USER),
                    outcome: Outcome::Continue,
                });
            }
        }

        let asks_user = ActionKind::from_name(&request.name) == Some(ActionKind::AskUser);
        if asks_user {
            self.set_state(LoopState::AwaitingUserText);
        }
        let dispatch = self.router.dispatch(request).await?;
        if asks_user {
            self.set_state(LoopState::Dispatching);
        }

        let content = &dispatch.result.content;
        let mut preview: String = content.chars().take(RESULT_PREVIEW_CHARS).collect();
        if content.chars().count() > RESULT_PREVIEW_CHARS {
            preview.push_str("...");
        }
        self.send_event(AgentEvent::ActionCompleted {
            id: request.id.clone(),
            action: request.name.clone(),
            preview,
        });
        Ok(dispatch)
    }
}
