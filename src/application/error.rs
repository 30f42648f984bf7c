//! 应用层错误定义
//!
//! 统一的命令/查询错误类型。下层错误在捕获处记录完整细节，
//! 这里只保留对调用方有意义的信息。

use thiserror::Error;

use crate::application::ports::{ArchiveError, EngineError};
use crate::application::services::RetrievalError;

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 请求格式或内容无效
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Engine not found: {0}")]
    EngineNotFound(String),

    /// 归档不可达
    #[error("Archive unavailable: {0}")]
    ArchiveUnavailable(String),

    /// 归档拒绝请求
    #[error("Archive rejected request (HTTP {status}): {message}")]
    ArchiveRejected { status: u16, message: String },

    #[error("Retrieval failed: {0}")]
    RetrievalFailed(String),

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    /// 引擎执行失败，细节只写日志
    #[error("Engine execution failed")]
    EngineExecutionFailed,

    /// 推理完成但没有产生预期输出
    #[error("Inference produced no output: {0}")]
    OutputMissing(String),

    #[error("Inference cancelled")]
    Cancelled,

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建验证错误
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

impl From<RetrievalError> for ApplicationError {
    fn from(err: RetrievalError) -> Self {
        match err {
            RetrievalError::InvalidRequest(message) => Self::InvalidRequest(message),
            RetrievalError::Fetch { source, .. } => match source {
                ArchiveError::InvalidRequest(message) => Self::InvalidRequest(message),
                ArchiveError::Unavailable(message) => Self::ArchiveUnavailable(message),
                ArchiveError::Rejected { status, message } => {
                    Self::ArchiveRejected { status, message }
                }
                other => Self::RetrievalFailed(other.to_string()),
            },
            other => Self::RetrievalFailed(other.to_string()),
        }
    }
}

impl From<EngineError> for ApplicationError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::EnvironmentNotFound(name) => Self::EnvironmentNotFound(name),
            EngineError::Cancelled => Self::Cancelled,
            _ => Self::EngineExecutionFailed,
        }
    }
}
