//! 编排循环阶段
//!
//! Idle -> AwaitingModel -> Validating -> Dispatching -> {Terminal | Reprompting}

use serde::Serialize;

/// 单条命令在编排循环中所处的阶段（用于事件推送与日志）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnginePhase {
    Idle,
    AwaitingModel,
    Validating,
    Dispatching,
    Reprompting,
    Terminal,
}

impl EnginePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnginePhase::Idle => "idle",
            EnginePhase::AwaitingModel => "awaiting_model",
            EnginePhase::Validating => "validating",
            EnginePhase::Dispatching => "dispatching",
            EnginePhase::Reprompting => "reprompting",
            EnginePhase::Terminal => "terminal",
        }
    }

    /// 是否为合法的状态迁移
    pub fn can_transition_to(&self, next: EnginePhase) -> bool {
        use EnginePhase::*;
        matches!(
            (self, next),
            (Idle, AwaitingModel)
                | (AwaitingModel, Validating)
                | (Validating, Dispatching)
                | (Dispatching, Reprompting)
                | (Dispatching, Terminal)
                | (Reprompting, AwaitingModel)
                // 执行器续跑：已终止的 PlanResult 被调用方触发后再次进入派发
                | (Terminal, Dispatching)
                // 任何阶段都可能因错误终止
                | (_, Terminal)
        )
    }
}

impl std::fmt::Display for EnginePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reprompt_cycle_transitions() {
        assert!(EnginePhase::Idle.can_transition_to(EnginePhase::AwaitingModel));
        assert!(EnginePhase::Dispatching.can_transition_to(EnginePhase::Reprompting));
        assert!(EnginePhase::Reprompting.can_transition_to(EnginePhase::AwaitingModel));
        assert!(!EnginePhase::Idle.can_transition_to(EnginePhase::Dispatching));
        assert!(!EnginePhase::Reprompting.can_transition_to(EnginePhase::Validating));
    }
}
