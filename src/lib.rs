//! Parrot - 自然语言桌面命令编排引擎
//!
//! 模块划分：
//! - **actions**: 封闭动作词表、模型输出校验、效果类 / 请求类划分
//! - **agent**: 运行时装配（按配置构建模型后端与编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 消息类型、单轮上下文拼装、调用方持有的会话
//! - **core**: 引擎错误与编排阶段
//! - **desktop**: 桌面自动化边界（打开 URL / 路径、剪贴板、文件系统、已安装程序）
//! - **dispatch**: 路径归一化与动作派发
//! - **engine**: Planner、编排主循环、PlanResult 执行器
//! - **llm**: 模型调用桥抽象与实现（Ollama / OpenAI 兼容 / DeepSeek / Mock）

pub mod actions;
pub mod agent;
pub mod config;
pub mod context;
pub mod core;
pub mod desktop;
pub mod dispatch;
pub mod engine;
pub mod llm;
pub mod observability;

pub use actions::{Action, ActionResponse};
pub use core::EngineError;
pub use engine::{CommandRequest, Orchestrator, PlanResult};
