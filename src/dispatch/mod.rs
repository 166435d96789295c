//! 派发层：路径归一化、动作处理器、批次结果
//!
//! Dispatcher 对一批已校验动作并发执行；效果类动作只产生状态，请求类动作额外产生 FetchedInfo，
//! 供编排循环拼入下一轮上下文。

pub mod executor;
pub mod paths;

use serde::Serialize;

pub use crate::desktop::{ActionError, FileEntry, PathInfo};
pub use executor::Dispatcher;
pub use paths::{resolve_home, resolve_path};

/// request_list_files 的结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileListResult {
    pub files: Vec<FileEntry>,
    pub total_count: usize,
}

/// 请求类动作取回的内容；失败也作为事实交给模型
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchedPayload {
    FileList(FileListResult),
    PathInfo(PathInfo),
    Error(String),
}

/// 一个请求类动作的输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchedInfo {
    /// 在批次中的位置
    pub index: usize,
    pub action_id: &'static str,
    pub description: String,
    /// 归一化后的绝对路径
    pub path: String,
    pub payload: FetchedPayload,
}

impl FetchedInfo {
    /// 渲染为给模型看的一段文本
    pub fn render(&self) -> String {
        let payload = serde_json::to_string(&self.payload)
            .unwrap_or_else(|e| format!("{{\"error\":\"unserializable payload: {e}\"}}"));
        format!(
            "Result of {} ({}) for '{}':\n{}",
            self.action_id, self.description, self.path, payload
        )
    }
}

/// 单个动作的执行状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Succeeded,
    /// 未执行也不算失败（如 create_file 目标已存在且 overwrite=false）
    Skipped { reason: String },
    Failed { error: String },
}

/// 单个动作的执行结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionOutcome {
    pub index: usize,
    pub id: &'static str,
    pub description: String,
    #[serde(flatten)]
    pub status: ActionStatus,
    /// 需要展示给用户的文本（display_text）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

impl ActionOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, ActionStatus::Failed { .. })
    }
}

/// 一批动作的执行报告；outcomes 与 fetched 都按输入顺序排列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub outcomes: Vec<ActionOutcome>,
    pub fetched: Vec<FetchedInfo>,
}

impl DispatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &ActionOutcome> {
        self.outcomes.iter().filter(|o| o.is_failure())
    }
}
