//! Object Store Port - 本地 DICOM 文件存储
//!
//! 按对象自身的 UID 三元组计算确定性的本地路径

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("Invalid DICOM object: {0}")]
    InvalidObject(String),

    #[error("IO error: {0}")]
    IoError(String),
}

#[async_trait]
pub trait ObjectStorePort: Send + Sync {
    /// 本地存储根目录
    fn temp_root(&self) -> &Path;

    /// 写入单个对象，返回本地路径
    ///
    /// 路径形如 `temp/hash(study)/hash(series)/hash(instance).dcm`
    async fn store_object(&self, buffer: &[u8]) -> Result<PathBuf, ObjectStoreError>;

    /// 逐个写入，保持顺序
    async fn store_objects(&self, buffers: &[Vec<u8>]) -> Result<Vec<PathBuf>, ObjectStoreError> {
        let mut paths = Vec::with_capacity(buffers.len());
        for buffer in buffers {
            paths.push(self.store_object(buffer).await?);
        }
        Ok(paths)
    }

    /// 递归列出前缀目录下已存储的文件
    async fn list_stored_objects(&self, dir_prefix: &Path) -> Result<Vec<PathBuf>, ObjectStoreError>;
}
