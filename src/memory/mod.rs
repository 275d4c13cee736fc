//! 记忆层：任务内的对话记录（只追加）

pub mod conversation;

pub use conversation::{
    ActionRequest, ActionResult, ContentBlock, ConversationState, Message, Role, Turn,
};
