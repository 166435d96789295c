//! 编排层：Planner、过程事件、编排主循环与 PlanResult 执行器

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::EngineEvent;
pub use loop_::{CommandRequest, LoopSettings, Orchestrator, PlanResult};
pub use planner::Planner;
