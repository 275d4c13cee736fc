//! 动作层：动作目录与参数校验、安全闸门、动作分发

pub mod action;
pub mod router;
pub mod safety;

pub use action::{
    action_catalog, ActionError, ActionKind, ActionSpec, BrowserAction, DEFAULT_SCROLL_AMOUNT,
};
pub use router::{ActionRouter, Dispatch, Outcome};
pub use safety::{SafetyGate, Verdict};
