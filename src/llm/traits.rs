//! 模型调用桥抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 LlmClient：给定模型名、消息历史与输出 Schema，返回一段文本。
//! 引擎不关心后端细节，也不在此层重试。

use async_trait::async_trait;
use thiserror::Error;

use crate::context::Message;

/// 一次模型调用请求
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    /// 输出格式的 JSON Schema（字符串）；为空时不约束
    pub schema: String,
}

/// 后端调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode backend response: {0}")]
    Decode(String),
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回模型输出的原始文本
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError>;

    /// 后端名（日志用）
    fn backend(&self) -> &str;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
