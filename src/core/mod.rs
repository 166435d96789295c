//! 核心类型：引擎错误与编排阶段

pub mod error;
pub mod state;

pub use error::EngineError;
pub use state::EnginePhase;
