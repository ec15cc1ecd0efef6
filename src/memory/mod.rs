//! 记忆层：短期记忆（有界对话历史）

pub mod conversation;

pub use conversation::{ConversationMemory, Message, Role};
