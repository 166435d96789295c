//! 引擎错误类型
//!
//! 规划阶段的终止性错误（调用失败、校验失败、轮数超限、超时、取消、配置错误）统一为 EngineError；
//! 单个动作的执行失败不在此处，见 dispatch::ActionError（按动作隔离，不中止整批）。

use thiserror::Error;

/// 规划 / 执行过程中导致当前命令终止的错误；任何一种都不会自动重试
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 模型桥返回传输错误或空文本
    #[error("Model invocation failed: {0}")]
    Invocation(String),

    /// 模型返回了文本，但无法解析或不符合动作 Schema
    #[error("Model output rejected: {reason}")]
    Validation {
        reason: String,
        /// 原始输出预览（截断），仅用于诊断
        raw_preview: String,
    },

    #[error("Round limit exceeded ({max_rounds} rounds)")]
    RoundLimitExceeded { max_rounds: usize },

    #[error("Model invocation timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("Cancelled")]
    Cancelled,

    /// 配置或环境缺陷（如无法解析 home 目录、max_rounds = 0）
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// 供 UI 直接展示的一句话
    pub fn user_message(&self) -> String {
        match self {
            EngineError::Invocation(_) | EngineError::Timeout { .. } => {
                format!("The language model could not be reached: {self}")
            }
            EngineError::Validation { .. } => {
                format!("The language model returned an unusable plan: {self}")
            }
            EngineError::RoundLimitExceeded { .. } => {
                format!("Gave up after gathering information repeatedly: {self}")
            }
            EngineError::Cancelled => "The command was cancelled.".to_string(),
            EngineError::Configuration(_) => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_mentions_cause() {
        let err = EngineError::RoundLimitExceeded { max_rounds: 3 };
        assert!(err.user_message().contains("3 rounds"));

        let err = EngineError::Cancelled;
        assert_eq!(err.user_message(), "The command was cancelled.");
    }
}
