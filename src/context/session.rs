//! 会话对象：由调用方持有，替代进程级全局历史
//!
//! persist_history = false 时每条命令都从空上下文开始；为 true 时记录「命令 + 规划摘要」，
//! 以先前上下文的形式提供给同一会话的后续命令。

use uuid::Uuid;

use crate::config::SessionSection;
use crate::context::{ConversationMemory, Message};

#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    history: ConversationMemory,
    persist_history: bool,
}

impl Session {
    pub fn new(persist_history: bool, max_turns: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            history: ConversationMemory::new(max_turns),
            persist_history,
        }
    }

    pub fn from_config(cfg: &SessionSection) -> Self {
        Self::new(cfg.persist_history, cfg.max_context_turns)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn persists_history(&self) -> bool {
        self.persist_history
    }

    /// 渲染为 ContextBuilder 可用的先前上下文行
    pub fn prior_context(&self) -> Vec<String> {
        if !self.persist_history {
            return Vec::new();
        }
        self.history
            .messages()
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect()
    }

    /// 记录一条已完成规划的命令
    pub fn record(&mut self, command: &str, summary: &str) {
        if !self.persist_history {
            return;
        }
        self.history.push(Message::user(command.to_string()));
        self.history.push(Message::assistant(summary.to_string()));
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reset_per_command_by_default() {
        let mut session = Session::new(false, 10);
        session.record("open youtube", "Opening YouTube");
        assert!(session.prior_context().is_empty());
    }

    #[test]
    fn test_persisted_history_is_rendered() {
        let mut session = Session::new(true, 10);
        session.record("open youtube", "Opening YouTube");
        assert_eq!(
            session.prior_context(),
            vec![
                "user: open youtube".to_string(),
                "assistant: Opening YouTube".to_string()
            ]
        );
        session.clear();
        assert!(session.prior_context().is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut a = Session::new(true, 10);
        let b = Session::new(true, 10);
        a.record("x", "y");
        assert!(b.prior_context().is_empty());
        assert_ne!(a.id(), b.id());
    }
}
