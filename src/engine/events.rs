//! 编排过程事件：供 CLI / 前端展示阶段变化、规划结果与动作执行情况

use serde::Serialize;

use crate::core::EnginePhase;
use crate::dispatch::ActionOutcome;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 新一轮开始（第几轮 / 上限）
    RoundStarted { round: usize, max_rounds: usize },
    /// 阶段切换
    Phase { phase: EnginePhase },
    /// 模型给出的规划（摘要 + 动作 id 列表）
    Planned {
        round: usize,
        summary: String,
        actions: Vec<String>,
    },
    /// 单个动作的执行结果
    Outcome { outcome: ActionOutcome },
    /// 取回的信息已拼入下一轮上下文
    Reprompt { fetched: usize },
    /// Token 使用统计（累计）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    /// 终止性错误
    Failed { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let ev = EngineEvent::Phase {
            phase: EnginePhase::AwaitingModel,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "phase");
        assert_eq!(json["phase"], "awaiting_model");

        let ev = EngineEvent::RoundStarted {
            round: 2,
            max_rounds: 4,
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "round_started");
        assert_eq!(json["round"], 2);
    }
}
