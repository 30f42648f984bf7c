//! File Storage - 文件系统 DICOM 对象存储实现
//!
//! 实现 ObjectStorePort trait

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::application::ports::{ObjectStoreError, ObjectStorePort};
use crate::domain::dicom::read_uids;

/// 短哈希长度（十六进制字符）
const SHORT_HASH_LEN: usize = 8;

/// UID 的短哈希，用作目录名
pub fn short_hash(uid: &str) -> String {
    let digest = format!("{:x}", md5::compute(uid.as_bytes()));
    digest[..SHORT_HASH_LEN].to_string()
}

/// 文件系统对象存储
pub struct FileObjectStore {
    /// 存储根目录
    base_dir: PathBuf,
}

impl FileObjectStore {
    /// 创建新的文件存储
    pub async fn new(base_dir: impl AsRef<Path>) -> Result<Self, ObjectStoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();

        // 确保目录存在
        fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| ObjectStoreError::IoError(e.to_string()))?;

        Ok(Self { base_dir })
    }

    /// 对象的确定性本地路径
    pub fn object_path(&self, study: &str, series: &str, sop: &str) -> PathBuf {
        self.base_dir
            .join(short_hash(study))
            .join(short_hash(series))
            .join(format!("{}.dcm", short_hash(sop)))
    }
}

#[async_trait]
impl ObjectStorePort for FileObjectStore {
    fn temp_root(&self) -> &Path {
        &self.base_dir
    }

    async fn store_object(&self, buffer: &[u8]) -> Result<PathBuf, ObjectStoreError> {
        let uids = read_uids(buffer).map_err(|e| ObjectStoreError::InvalidObject(e.to_string()))?;
        let (Some(series), Some(sop)) = (uids.series_instance_uid(), uids.sop_instance_uid())
        else {
            return Err(ObjectStoreError::InvalidObject(format!(
                "incomplete UIDs: {}",
                uids
            )));
        };

        let path = self.object_path(uids.study_instance_uid(), series, sop);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ObjectStoreError::IoError(e.to_string()))?;
        }

        // 同一对象再次写入时直接覆盖
        fs::write(&path, buffer)
            .await
            .map_err(|e| ObjectStoreError::IoError(e.to_string()))?;

        tracing::debug!(
            path = %path.display(),
            size = buffer.len(),
            "Stored DICOM object"
        );

        Ok(path)
    }

    async fn list_stored_objects(&self, dir_prefix: &Path) -> Result<Vec<PathBuf>, ObjectStoreError> {
        let mut files = Vec::new();
        let mut pending = vec![dir_prefix.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ObjectStoreError::IoError(e.to_string())),
            };

            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| ObjectStoreError::IoError(e.to_string()))?
            {
                let file_type = entry
                    .file_type()
                    .await
                    .map_err(|e| ObjectStoreError::IoError(e.to_string()))?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                } else if file_type.is_file() {
                    files.push(entry.path());
                }
            }
        }

        files.sort();
        Ok(files)
    }
}
