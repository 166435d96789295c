//! Mock LLM 客户端（用于测试，无需模型服务）
//!
//! 按顺序返回预设回复；预设用尽后若设置了 repeating 则一直返回它，否则把最后一条 User 消息回显为 display_text 动作。
//! 每次调用的请求都会被记录，便于断言上下文内容。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::context::Role;
use crate::llm::{ChatRequest, LlmClient, LlmError};

/// 单条预设回复
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(String),
}

#[derive(Debug, Default)]
pub struct MockLlmClient {
    script: Mutex<VecDeque<MockReply>>,
    repeating: Option<String>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定文本
    pub fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            script: Mutex::new(replies.into_iter().map(|r| MockReply::Text(r.into())).collect()),
            ..Self::default()
        }
    }

    /// 每次都返回同一段文本
    pub fn repeating(reply: impl Into<String>) -> Self {
        Self {
            repeating: Some(reply.into()),
            ..Self::default()
        }
    }

    pub fn push(&self, reply: MockReply) {
        self.script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// 已收到的请求（按调用顺序）
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn echo(request: &ChatRequest) -> String {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");
        serde_json::json!({
            "summary": "Echo",
            "actions": [{
                "id": "display_text",
                "description": "Echo the command",
                "content": format!("Echo from Mock: {last_user}"),
            }]
        })
        .to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let next = self
            .script
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(reason)) => Err(LlmError::Request(reason)),
            None => Ok(self
                .repeating
                .clone()
                .unwrap_or_else(|| Self::echo(request))),
        }
    }

    fn backend(&self) -> &str {
        "mock"
    }
}
