//! 动作词表：模型输出的封闭 Schema
//!
//! Action 以 `id` 字段为判别标签（serde internally tagged），每个变体都带 `description`；
//! 其余字段由 `id` 唯一决定。schemars 从同一组类型生成发给模型的 JSON Schema。

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

/// `request_` 前缀：约定上表示「先取系统信息、再规划」的请求类动作
pub const REQUEST_PREFIX: &str = "request_";

/// 动作类别：效果类（为用户改变或查询外部世界）与请求类（为下一轮规划收集事实）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionClass {
    Effect,
    Request,
}

/// 模型可以输出的全部动作
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum Action {
    /// Displays a body of text to the user
    DisplayText {
        description: String,
        /// The body of text to display
        content: String,
    },
    /// Open a URL in the user's default browser
    OpenUrl {
        description: String,
        /// A fully qualified URL
        url: String,
    },
    /// Open a file with its default linked program
    ExecuteFile {
        description: String,
        /// A path in the user's file system
        path: String,
    },
    /// Reveal the specified folder or file in the user's file explorer
    RevealPath {
        description: String,
        /// A path in the user's file system
        path: String,
    },
    /// Create a file, optionally with initial content
    CreateFile {
        description: String,
        /// A path in the user's file system
        path: String,
        /// The content that the file should be initialized with, nullable
        #[serde(deserialize_with = "required_nullable")]
        #[schemars(with = "Option<String>")]
        content: Option<String>,
        /// Whether the file should be overwritten if it already exists; should typically be false
        overwrite: bool,
    },
    /// Copy text to the system clipboard
    CopyToClipboard {
        description: String,
        /// The text to place on the clipboard
        content: String,
    },
    /// List files and directories in a specified path
    RequestListFiles {
        description: String,
        /// A path in the user's file system
        path: String,
        /// File pattern to match (e.g. '*.txt', '*.js')
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pattern: Option<String>,
    },
    /// Request whether a path exists, its type, size and modification time
    RequestStatPath {
        description: String,
        /// A path in the user's file system
        path: String,
    },
}

/// `content: null` 合法，但键本身必须出现（带 deserialize_with 且无 default 的字段缺失即报错）
fn required_nullable<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl Action {
    /// 线上 `id` 值
    pub fn id(&self) -> &'static str {
        match self {
            Action::DisplayText { .. } => "display_text",
            Action::OpenUrl { .. } => "open_url",
            Action::ExecuteFile { .. } => "execute_file",
            Action::RevealPath { .. } => "reveal_path",
            Action::CreateFile { .. } => "create_file",
            Action::CopyToClipboard { .. } => "copy_to_clipboard",
            Action::RequestListFiles { .. } => "request_list_files",
            Action::RequestStatPath { .. } => "request_stat_path",
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Action::DisplayText { description, .. }
            | Action::OpenUrl { description, .. }
            | Action::ExecuteFile { description, .. }
            | Action::RevealPath { description, .. }
            | Action::CreateFile { description, .. }
            | Action::CopyToClipboard { description, .. }
            | Action::RequestListFiles { description, .. }
            | Action::RequestStatPath { description, .. } => description,
        }
    }

    /// 穷尽匹配的类别划分；与 REQUEST_PREFIX 约定一致（见测试）
    pub fn class(&self) -> ActionClass {
        match self {
            Action::DisplayText { .. }
            | Action::OpenUrl { .. }
            | Action::ExecuteFile { .. }
            | Action::RevealPath { .. }
            | Action::CreateFile { .. }
            | Action::CopyToClipboard { .. } => ActionClass::Effect,
            Action::RequestListFiles { .. } | Action::RequestStatPath { .. } => {
                ActionClass::Request
            }
        }
    }

    pub fn is_request(&self) -> bool {
        self.class() == ActionClass::Request
    }

    /// 带路径参数的动作返回模型给出的原始路径
    pub fn path(&self) -> Option<&str> {
        match self {
            Action::ExecuteFile { path, .. }
            | Action::RevealPath { path, .. }
            | Action::CreateFile { path, .. }
            | Action::RequestListFiles { path, .. }
            | Action::RequestStatPath { path, .. } => Some(path),
            Action::DisplayText { .. } | Action::OpenUrl { .. } | Action::CopyToClipboard { .. } => {
                None
            }
        }
    }
}

/// 模型的顶层输出：一句摘要 + 动作列表
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ActionResponse {
    /// A brief summary of the actions that are to be executed
    pub summary: String,
    /// A list of the actions to execute
    pub actions: Vec<Action>,
}

/// 一次响应的整体形态，决定编排循环是直接续跑还是交给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    /// 没有任何动作
    Empty,
    /// 只有请求类动作
    RequestOnly,
    /// 至少含一个效果类动作（混合响应也归于此，整体等待调用方执行）
    Effects,
}

impl ActionResponse {
    pub fn plan_kind(&self) -> PlanKind {
        if self.actions.is_empty() {
            PlanKind::Empty
        } else if self.actions.iter().all(Action::is_request) {
            PlanKind::RequestOnly
        } else {
            PlanKind::Effects
        }
    }
}
