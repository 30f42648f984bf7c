//! Engine Context - 推理引擎限界上下文
//!
//! 职责:
//! - 引擎静态配置（调用方式、参数模板、输出路径）
//! - 配置校验与按名称查找

mod catalog;
mod definition;
mod errors;

pub use catalog::EngineCatalog;
pub use definition::{ApiMethod, EngineDefinition, EngineMode, OutputKind};
pub use errors::EngineConfigError;
