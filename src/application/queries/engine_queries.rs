//! Engine Queries

/// 列出所有已配置的推理引擎
#[derive(Debug, Clone)]
pub struct ListEngines;
