//! Retrieval Cache Port - 推理请求缓存
//!
//! 请求指纹 -> 已下载文件列表 / 已产生的推理输出。
//! 不加锁，后写覆盖；条目有效性在读取时按文件存在性惰性检查。

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::dicom::{DicomUidTriplet, InferenceRequest};

/// Retrieval Cache 错误
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// 缓存条目
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub source_uids: Vec<DicomUidTriplet>,
    pub local_file_list: Vec<PathBuf>,
    pub produced_outputs: Vec<DicomUidTriplet>,
    /// 产生 `produced_outputs` 的引擎
    pub inference_engine: Option<String>,
    pub has_inference_result: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CacheEntry {
    /// 推理结果是否由该引擎产生
    pub fn has_result_from(&self, engine: &str) -> bool {
        self.has_inference_result && self.inference_engine.as_deref() == Some(engine)
    }
}

/// 缓存统计信息
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub total_entries: usize,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Retrieval Cache Port
#[async_trait]
pub trait RetrievalCachePort: Send + Sync {
    /// 按指纹查找
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// 记录下载文件（upsert）
    ///
    /// 已存在时只覆盖 `source_uids` / `local_file_list`，推理输出字段保持不变
    async fn record_files(
        &self,
        fingerprint: &str,
        source_uids: &[DicomUidTriplet],
        local_file_list: &[PathBuf],
    ) -> Result<(), CacheError>;

    /// 记录推理输出，只对已存在的条目生效，并置 `has_inference_result`
    ///
    /// 同一请求换用其他引擎时覆盖之前的引擎名。返回条目是否存在
    async fn record_outputs(
        &self,
        fingerprint: &str,
        engine: &str,
        output_uids: &[DicomUidTriplet],
    ) -> Result<bool, CacheError>;

    /// 所有文件仍存在于磁盘时有效
    async fn is_valid(&self, entry: &CacheEntry) -> bool {
        for path in &entry.local_file_list {
            if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                tracing::debug!(
                    fingerprint = %entry.fingerprint,
                    missing = %path.display(),
                    "Cached file missing"
                );
                return false;
            }
        }
        true
    }

    /// 获取缓存统计信息
    async fn stats(&self) -> CacheStats;
}

/// 生成请求指纹
///
/// md5(规范化 JSON)。非密码学用途，碰撞风险可接受
pub fn generate_fingerprint(request: &InferenceRequest) -> String {
    let digest = md5::compute(request.canonical_json().as_bytes());
    format!("{:x}", digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let request = InferenceRequest::new(vec![DicomUidTriplet::series("S1", "SE1")]);
        let a = generate_fingerprint(&request);
        let b = generate_fingerprint(&request.clone());
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_fingerprint_ignores_params_key_order() {
        let a: InferenceRequest = serde_json::from_str(
            r#"{"dicomUidsList":[{"studyInstanceUID":"S1"}],"params":{"x":1,"y":{"b":2,"a":1}}}"#,
        )
        .unwrap();
        let b: InferenceRequest = serde_json::from_str(
            r#"{"params":{"y":{"a":1,"b":2},"x":1},"dicomUidsList":[{"studyInstanceUID":"S1"}]}"#,
        )
        .unwrap();
        assert_eq!(generate_fingerprint(&a), generate_fingerprint(&b));
    }

    #[test]
    fn test_result_belongs_to_recording_engine() {
        let mut entry = CacheEntry {
            fingerprint: "fp".into(),
            source_uids: vec![DicomUidTriplet::study("S1")],
            local_file_list: vec![],
            produced_outputs: vec![],
            inference_engine: None,
            has_inference_result: false,
            created_at: 0,
            updated_at: 0,
        };
        assert!(!entry.has_result_from("seg"));

        entry.inference_engine = Some("seg".into());
        entry.has_inference_result = true;
        assert!(entry.has_result_from("seg"));
        assert!(!entry.has_result_from("score"));
    }

    #[test]
    fn test_fingerprint_differs_for_different_uids() {
        let a = InferenceRequest::new(vec![DicomUidTriplet::study("S1")]);
        let b = InferenceRequest::new(vec![DicomUidTriplet::study("S2")]);
        assert_ne!(generate_fingerprint(&a), generate_fingerprint(&b));
    }
}
