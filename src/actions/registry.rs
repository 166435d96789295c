//! Schema 注册表：模型输出校验、词表描述与 JSON Schema 生成
//!
//! 模型文本到 Action 的唯一入口是 validate：要么得到完整的 ActionResponse，要么得到 Validation 错误，
//! 不存在「部分接受」。

use schemars::schema_for;

use crate::actions::{ActionClass, ActionResponse};
use crate::core::EngineError;

/// 校验失败时保留的原始输出预览长度
const RAW_PREVIEW_CHARS: usize = 500;

/// 词表条目：(id, 类别, 给模型看的说明)
pub struct VocabularyEntry {
    pub id: &'static str,
    pub class: ActionClass,
    pub summary: &'static str,
    pub fields: &'static str,
}

/// 封闭词表；顺序即 system prompt 中的展示顺序
pub const VOCABULARY: &[VocabularyEntry] = &[
    VocabularyEntry {
        id: "open_url",
        class: ActionClass::Effect,
        summary: "Open a URL in the user's default browser",
        fields: "url",
    },
    VocabularyEntry {
        id: "execute_file",
        class: ActionClass::Effect,
        summary: "Open a file with its default linked program",
        fields: "path",
    },
    VocabularyEntry {
        id: "reveal_path",
        class: ActionClass::Effect,
        summary: "Reveal a folder or file in the user's file explorer",
        fields: "path",
    },
    VocabularyEntry {
        id: "create_file",
        class: ActionClass::Effect,
        summary: "Create a file; content may be null; overwrite should be false unless necessary",
        fields: "path, content, overwrite",
    },
    VocabularyEntry {
        id: "copy_to_clipboard",
        class: ActionClass::Effect,
        summary: "Copy text to the clipboard",
        fields: "content",
    },
    VocabularyEntry {
        id: "display_text",
        class: ActionClass::Effect,
        summary: "Display a body of text to the user",
        fields: "content",
    },
    VocabularyEntry {
        id: "request_list_files",
        class: ActionClass::Request,
        summary: "List files and directories in a path, optionally filtered by a glob pattern",
        fields: "path, pattern (optional)",
    },
    VocabularyEntry {
        id: "request_stat_path",
        class: ActionClass::Request,
        summary: "Check whether a path exists and get its type, size and modification time",
        fields: "path",
    },
];

/// 把模型原始文本解析为 ActionResponse（严格模式）
///
/// 仅允许去掉一层包裹整个回复的 Markdown 代码块；其余任何偏差（未知 id、缺字段、类型不符、
/// 顶层不是对象）都返回 EngineError::Validation。
pub fn validate(raw: &str) -> Result<ActionResponse, EngineError> {
    let body = strip_code_fence(raw.trim());
    serde_json::from_str::<ActionResponse>(body).map_err(|e| EngineError::Validation {
        reason: e.to_string(),
        raw_preview: preview(raw),
    })
}

/// ```json ... ``` 或 ``` ... ``` 包裹整个回复时取出内部文本
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return text;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

fn preview(raw: &str) -> String {
    if raw.chars().count() > RAW_PREVIEW_CHARS {
        format!("{}...", raw.chars().take(RAW_PREVIEW_CHARS).collect::<String>())
    } else {
        raw.to_string()
    }
}

/// 按 id 查类别；未知 id 返回 None
pub fn classify_id(id: &str) -> Option<ActionClass> {
    VOCABULARY.iter().find(|e| e.id == id).map(|e| e.class)
}

/// ActionResponse 的 JSON Schema（发给模型作为输出格式约束）
pub fn response_schema_json() -> String {
    let schema = schema_for!(ActionResponse);
    serde_json::to_string(&schema).unwrap_or_else(|_| String::new())
}

/// 渲染进 system prompt 的词表段落
pub fn vocabulary_section() -> String {
    let mut out = String::from("Available actions (every action also requires \"description\"):\n");
    for entry in VOCABULARY {
        let class = match entry.class {
            ActionClass::Effect => "effect",
            ActionClass::Request => "request",
        };
        out.push_str(&format!(
            "- {} [{}]: {}. Fields: {}\n",
            entry.id, class, entry.summary, entry.fields
        ));
    }
    out
}
