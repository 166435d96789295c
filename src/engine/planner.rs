//! Planner：调用模型桥并把返回文本校验为 ActionResponse
//!
//! 单次调用受超时与取消令牌约束；空回复视为调用失败，不符合 Schema 的回复视为校验失败，二者都不重试。

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::actions::{response_schema_json, validate, ActionResponse};
use crate::context::Message;
use crate::core::EngineError;
use crate::llm::{ChatRequest, LlmClient};

pub struct Planner {
    llm: Arc<dyn LlmClient>,
    schema: String,
    timeout: Duration,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self {
            llm,
            schema: response_schema_json(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn backend(&self) -> &str {
        self.llm.backend()
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    /// 调用模型并校验输出
    pub async fn plan(
        &self,
        model: &str,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<ActionResponse, EngineError> {
        let raw = self.invoke(model, messages, cancel).await?;
        validate(&raw).inspect_err(|e| {
            if let EngineError::Validation {
                reason,
                raw_preview,
            } = e
            {
                tracing::warn!(%reason, raw = %raw_preview, "model output rejected");
            }
        })
    }

    /// 只调用模型，返回原始文本
    pub async fn invoke(
        &self,
        model: &str,
        messages: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<String, EngineError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages,
            schema: self.schema.clone(),
        };
        let secs = self.timeout.as_secs();
        let reply = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            r = tokio::time::timeout(self.timeout, self.llm.complete(&request)) => r,
        };
        let text = reply
            .map_err(|_| EngineError::Timeout { secs })?
            .map_err(|e| EngineError::Invocation(e.to_string()))?;
        if text.trim().is_empty() {
            return Err(EngineError::Invocation("model returned an empty reply".to_string()));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply};

    fn planner(mock: MockLlmClient) -> (Planner, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        (Planner::new(mock.clone(), 5), mock)
    }

    #[tokio::test]
    async fn test_plan_sends_schema_and_model() {
        let (p, mock) = planner(MockLlmClient::scripted([
            r#"{"summary":"s","actions":[]}"#,
        ]));
        let resp = p
            .plan("m1", vec![Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(resp.summary, "s");
        let req = &mock.requests()[0];
        assert_eq!(req.model, "m1");
        assert!(req.schema.contains("create_file"));
    }

    #[tokio::test]
    async fn test_empty_reply_is_invocation_failure() {
        let (p, _) = planner(MockLlmClient::scripted(["   "]));
        let err = p
            .plan("m", vec![Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Invocation(_)));
    }

    #[tokio::test]
    async fn test_backend_error_is_invocation_failure() {
        let mock = MockLlmClient::new();
        mock.push(MockReply::Fail("connection refused".into()));
        let (p, _) = planner(mock);
        let err = p
            .plan("m", vec![Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::Invocation("request failed: connection refused".into())
        );
    }

    #[tokio::test]
    async fn test_bad_json_is_validation_failure() {
        let (p, _) = planner(MockLlmClient::scripted(["I will open youtube for you"]));
        let err = p
            .plan("m", vec![Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_before_call() {
        let (p, mock) = planner(MockLlmClient::new());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = p
            .plan("m", vec![Message::user("hi")], &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        assert_eq!(mock.call_count(), 0);
    }

    /// 迟迟不返回的模型
    struct StalledLlm;

    #[async_trait::async_trait]
    impl LlmClient for StalledLlm {
        async fn complete(&self, _request: &ChatRequest) -> Result<String, crate::llm::LlmError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(r#"{"summary":"late","actions":[]}"#.to_string())
        }

        fn backend(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_slow_model_times_out() {
        let p = Planner::new(Arc::new(StalledLlm), 1);
        let started = std::time::Instant::now();
        let err = p
            .plan("m", vec![Message::user("hi")], &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, EngineError::Timeout { secs: 1 });
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
