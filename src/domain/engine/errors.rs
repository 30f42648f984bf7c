//! Engine Context - Errors

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineConfigError {
    #[error("无效的引擎名称: {0}（仅允许小写字母、数字，以单个 - 连接，最多 5 个 -）")]
    InvalidName(String),

    #[error("引擎 {engine} 缺少配置项 {field}")]
    MissingField { engine: String, field: &'static str },

    #[error("引擎名称重复: {0}")]
    Duplicate(String),
}
