//! Sled-based Retrieval Cache Implementation

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{CacheEntry, CacheError, CacheStats, RetrievalCachePort};
use crate::domain::dicom::DicomUidTriplet;

/// 数据库文件名
pub const CACHE_DB_NAME: &str = "inference-cache.sled";

/// Sled 缓存配置
#[derive(Debug, Clone)]
pub struct SledCacheConfig {
    /// 数据库路径
    pub db_path: PathBuf,
}

impl Default for SledCacheConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/cache").join(CACHE_DB_NAME),
        }
    }
}

impl SledCacheConfig {
    /// 缓存目录下的默认数据库
    pub fn in_dir(cache_dir: impl AsRef<Path>) -> Self {
        Self {
            db_path: cache_dir.as_ref().join(CACHE_DB_NAME),
        }
    }
}

/// 内部存储的 UID（bincode 不支持跳过字段，单独定义）
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredUid {
    study: String,
    series: Option<String>,
    sop: Option<String>,
}

impl From<&DicomUidTriplet> for StoredUid {
    fn from(uids: &DicomUidTriplet) -> Self {
        Self {
            study: uids.study_instance_uid().to_string(),
            series: uids.series_instance_uid().map(str::to_string),
            sop: uids.sop_instance_uid().map(str::to_string),
        }
    }
}

impl From<StoredUid> for DicomUidTriplet {
    fn from(stored: StoredUid) -> Self {
        DicomUidTriplet::from_parts(stored.study, stored.series, stored.sop)
    }
}

/// 内部缓存条目
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InternalCacheEntry {
    source_uids: Vec<StoredUid>,
    local_file_list: Vec<PathBuf>,
    produced_outputs: Vec<StoredUid>,
    inference_engine: Option<String>,
    has_inference_result: bool,
    created_at: i64,
    updated_at: i64,
}

impl InternalCacheEntry {
    fn into_entry(self, fingerprint: &str) -> CacheEntry {
        CacheEntry {
            fingerprint: fingerprint.to_string(),
            source_uids: self.source_uids.into_iter().map(Into::into).collect(),
            local_file_list: self.local_file_list,
            produced_outputs: self.produced_outputs.into_iter().map(Into::into).collect(),
            inference_engine: self.inference_engine,
            has_inference_result: self.has_inference_result,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

fn cache_key(fingerprint: &str) -> String {
    format!("cache:{}", fingerprint)
}

/// Sled 推理缓存
pub struct SledRetrievalCache {
    db: Db,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl SledRetrievalCache {
    /// 创建新的缓存实例
    pub fn new(config: &SledCacheConfig) -> Result<Self, CacheError> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CacheError::IoError(e.to_string()))?;
        }

        let db = sled::open(&config.db_path)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;

        tracing::info!(
            db_path = %config.db_path.display(),
            entries = db.scan_prefix("cache:").count(),
            "SledRetrievalCache initialized"
        );

        Ok(Self {
            db,
            hit_count: AtomicU64::new(0),
            miss_count: AtomicU64::new(0),
        })
    }

    /// 打开现有缓存
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CacheError> {
        Self::new(&SledCacheConfig {
            db_path: path.as_ref().to_path_buf(),
        })
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn read(&self, fingerprint: &str) -> Result<Option<InternalCacheEntry>, CacheError> {
        match self.db.get(cache_key(fingerprint)) {
            Ok(Some(data)) => bincode::deserialize(&data)
                .map(Some)
                .map_err(|e| CacheError::SerializationError(e.to_string())),
            Ok(None) => Ok(None),
            Err(e) => Err(CacheError::DatabaseError(e.to_string())),
        }
    }

    fn write(&self, fingerprint: &str, entry: &InternalCacheEntry) -> Result<(), CacheError> {
        let entry_bytes =
            bincode::serialize(entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;
        self.db
            .insert(cache_key(fingerprint), entry_bytes)
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }

    /// 刷新数据库
    pub fn flush(&self) -> Result<(), CacheError> {
        self.db
            .flush()
            .map_err(|e| CacheError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl RetrievalCachePort for SledRetrievalCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        match self.read(fingerprint)? {
            Some(entry) => {
                self.hit_count.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.into_entry(fingerprint)))
            }
            None => {
                self.miss_count.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn record_files(
        &self,
        fingerprint: &str,
        source_uids: &[DicomUidTriplet],
        local_file_list: &[PathBuf],
    ) -> Result<(), CacheError> {
        let now = Utc::now().timestamp();
        let source_uids = source_uids.iter().map(StoredUid::from).collect();

        let entry = match self.read(fingerprint)? {
            Some(existing) => InternalCacheEntry {
                source_uids,
                local_file_list: local_file_list.to_vec(),
                updated_at: now,
                ..existing
            },
            None => InternalCacheEntry {
                source_uids,
                local_file_list: local_file_list.to_vec(),
                produced_outputs: Vec::new(),
                inference_engine: None,
                has_inference_result: false,
                created_at: now,
                updated_at: now,
            },
        };

        self.write(fingerprint, &entry)?;

        tracing::debug!(
            fingerprint = %fingerprint,
            files = local_file_list.len(),
            "Retrieval cached"
        );

        Ok(())
    }

    async fn record_outputs(
        &self,
        fingerprint: &str,
        engine: &str,
        output_uids: &[DicomUidTriplet],
    ) -> Result<bool, CacheError> {
        let Some(mut entry) = self.read(fingerprint)? else {
            return Ok(false);
        };

        entry.produced_outputs = output_uids.iter().map(StoredUid::from).collect();
        entry.inference_engine = Some(engine.to_string());
        entry.has_inference_result = true;
        entry.updated_at = Utc::now().timestamp();
        self.write(fingerprint, &entry)?;

        tracing::debug!(
            fingerprint = %fingerprint,
            engine = %engine,
            outputs = output_uids.len(),
            "Inference outputs cached"
        );

        Ok(true)
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.db.scan_prefix("cache:").count(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_and_lookup() {
        let dir = tempdir().unwrap();
        let cache = SledRetrievalCache::new(&SledCacheConfig::in_dir(dir.path())).unwrap();

        let uids = vec![
            DicomUidTriplet::series("1", "1.1"),
            DicomUidTriplet::instance("1", "1.2", "1.2.1"),
        ];
        let files = vec![PathBuf::from("/tmp/a.dcm"), PathBuf::from("/tmp/b.dcm")];

        assert!(cache.lookup("fp").await.unwrap().is_none());
        cache.record_files("fp", &uids, &files).await.unwrap();

        let entry = cache.lookup("fp").await.unwrap().unwrap();
        assert_eq!(entry.fingerprint, "fp");
        assert_eq!(entry.source_uids, uids);
        assert_eq!(entry.local_file_list, files);
        assert!(!entry.has_inference_result);

        let stats = cache.stats().await;
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.hit_count, 1);
        assert_eq!(stats.miss_count, 1);
    }

    #[tokio::test]
    async fn test_record_files_keeps_outputs() {
        let dir = tempdir().unwrap();
        let cache = SledRetrievalCache::new(&SledCacheConfig::in_dir(dir.path())).unwrap();
        let uids = vec![DicomUidTriplet::study("1")];

        cache
            .record_files("fp", &uids, &[PathBuf::from("a")])
            .await
            .unwrap();
        let outputs = vec![DicomUidTriplet::instance("1", "9", "9.1")];
        assert!(cache.record_outputs("fp", "lung-seg", &outputs).await.unwrap());

        cache
            .record_files("fp", &uids, &[PathBuf::from("b")])
            .await
            .unwrap();

        let entry = cache.lookup("fp").await.unwrap().unwrap();
        assert_eq!(entry.local_file_list, vec![PathBuf::from("b")]);
        assert_eq!(entry.produced_outputs, outputs);
        assert_eq!(entry.inference_engine.as_deref(), Some("lung-seg"));
        assert!(entry.has_result_from("lung-seg"));
    }

    #[tokio::test]
    async fn test_record_outputs_requires_entry() {
        let dir = tempdir().unwrap();
        let cache = SledRetrievalCache::new(&SledCacheConfig::in_dir(dir.path())).unwrap();
        assert!(!cache.record_outputs("absent", "lung-seg", &[]).await.unwrap());
        assert_eq!(cache.stats().await.total_entries, 0);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.sled");
        {
            let cache = SledRetrievalCache::open(&path).unwrap();
            cache
                .record_files("fp", &[DicomUidTriplet::study("1")], &[PathBuf::from("a")])
                .await
                .unwrap();
            cache.flush().unwrap();
        }

        let cache = SledRetrievalCache::open(&path).unwrap();
        assert!(cache.lookup("fp").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_is_valid_checks_files() {
        let dir = tempdir().unwrap();
        let cache = SledRetrievalCache::new(&SledCacheConfig::in_dir(dir.path())).unwrap();
        let file = dir.path().join("x.dcm");
        std::fs::write(&file, b"x").unwrap();

        cache
            .record_files("fp", &[DicomUidTriplet::study("1")], &[file.clone()])
            .await
            .unwrap();
        let entry = cache.lookup("fp").await.unwrap().unwrap();
        assert!(cache.is_valid(&entry).await);

        std::fs::remove_file(&file).unwrap();
        assert!(!cache.is_valid(&entry).await);
    }
}
