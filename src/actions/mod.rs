//! 动作层：封闭词表、模型输出校验、类别划分

pub mod registry;
pub mod schema;

pub use registry::{
    classify_id, response_schema_json, validate, vocabulary_section, VocabularyEntry, VOCABULARY,
};
pub use schema::{Action, ActionClass, ActionResponse, PlanKind, REQUEST_PREFIX};
