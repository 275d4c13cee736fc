//! 认知层：Reasoner 适配、任务主循环与过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::{AgentEvent, LoopState};
pub use loop_::{
    Orchestrator, RunOutcome, RunResult, CANCELLED_BY_USER, DEFAULT_DIRECTIVE, DEFAULT_MAX_TURNS,
    SKIPPED_AFTER_DONE,
};
pub use planner::{parse_reply, LlmReasoner, Reasoner, ReasonerRequest};
