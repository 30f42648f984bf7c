//! Archive Port - DICOMweb 影像归档抽象
//!
//! 按 Study / Series / Instance 层级检索对象，以及回传存储

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// 归档错误
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// 缺少必需的 UID 等调用约定错误
    #[error("Invalid archive request: {0}")]
    InvalidRequest(String),

    /// 网络不可达、超时
    #[error("Archive unavailable: {0}")]
    Unavailable(String),

    /// 归档返回 4xx / 5xx
    #[error("Archive rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// 响应无法解码
    #[error("Invalid archive response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// Archive Port
///
/// 实现只持有连接配置，不做任何重试
#[async_trait]
pub trait ArchivePort: Send + Sync {
    /// 检索整个 Study，返回每个实例的原始字节
    async fn retrieve_study(&self, study_uid: &str) -> Result<Vec<Vec<u8>>, ArchiveError>;

    /// 检索整个 Series
    async fn retrieve_series(
        &self,
        study_uid: &str,
        series_uid: &str,
    ) -> Result<Vec<Vec<u8>>, ArchiveError>;

    /// 检索单个 Instance
    async fn retrieve_instance(
        &self,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> Result<Vec<u8>, ArchiveError>;

    /// 存储本地 DICOM 文件到归档
    async fn store_instance(&self, local_file: &Path) -> Result<(), ArchiveError>;
}

/// 检查必需 UID 非空
pub fn require_uid(value: &str, name: &str) -> Result<(), ArchiveError> {
    if value.trim().is_empty() {
        return Err(ArchiveError::InvalidRequest(format!("{} is required", name)));
    }
    Ok(())
}
