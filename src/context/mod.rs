//! 上下文层：消息类型、单轮上下文拼装、调用方持有的会话

pub mod builder;
pub mod conversation;
pub mod session;

pub use builder::{ContextBuilder, RoundInput, FETCHED_INFO_PREFIX};
pub use conversation::{ConversationMemory, Message, Role};
pub use session::Session;
