//! Retriever - 将请求中的 UID 列表转换为本地文件列表
//!
//! 开启缓存时，整个请求只做一次缓存检查：命中且文件仍在则完全跳过归档访问。
//! 未命中时逐个对象按请求顺序检索并落盘，任一对象失败即中止（已写入的文件不回滚）。

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::application::ports::{
    generate_fingerprint, ArchiveError, ArchivePort, ObjectStoreError, ObjectStorePort,
    RetrievalCachePort,
};
use crate::domain::dicom::{DicomLevel, DicomUidTriplet, InferenceRequest, RetrievalResult};

/// 检索错误
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Retrieval failed for {level} {uids}: {source}")]
    Fetch {
        level: DicomLevel,
        uids: String,
        #[source]
        source: ArchiveError,
    },

    #[error("Failed to store retrieved object: {0}")]
    Store(#[from] ObjectStoreError),

    #[error("Archive returned no objects for request")]
    Empty,
}

/// Retriever
pub struct Retriever {
    archive: Arc<dyn ArchivePort>,
    store: Arc<dyn ObjectStorePort>,
    cache: Arc<dyn RetrievalCachePort>,
}

impl Retriever {
    pub fn new(
        archive: Arc<dyn ArchivePort>,
        store: Arc<dyn ObjectStorePort>,
        cache: Arc<dyn RetrievalCachePort>,
    ) -> Self {
        Self {
            archive,
            store,
            cache,
        }
    }

    /// 检索请求中的全部对象
    pub async fn retrieve(
        &self,
        request: &InferenceRequest,
        use_cache: bool,
    ) -> Result<RetrievalResult, RetrievalError> {
        request
            .validate()
            .map_err(|e| RetrievalError::InvalidRequest(e.to_string()))?;

        let fingerprint = use_cache.then(|| generate_fingerprint(request));

        if let Some(fp) = &fingerprint {
            if let Some(files) = self.cached_files(fp).await {
                if let Some(result) =
                    RetrievalResult::from_instance_files(files, self.store.temp_root())
                {
                    tracing::info!(
                        fingerprint = %fp,
                        files = result.instance_files.len(),
                        "Retrieval served from cache"
                    );
                    return Ok(result);
                }
            }
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for uids in &request.dicom_uids_list {
            files.extend(self.fetch(uids).await?);
        }

        let result = RetrievalResult::from_instance_files(files, self.store.temp_root())
            .ok_or(RetrievalError::Empty)?;

        if let Some(fp) = &fingerprint {
            if let Err(e) = self
                .cache
                .record_files(fp, &request.dicom_uids_list, &result.instance_files)
                .await
            {
                tracing::warn!(fingerprint = %fp, error = %e, "Failed to record cache entry");
            }
        }

        tracing::info!(
            objects = request.dicom_uids_list.len(),
            files = result.instance_files.len(),
            series = result.series_dirs.len(),
            "Retrieval completed"
        );

        Ok(result)
    }

    /// 查询缓存，仅在条目存在且文件完整时返回文件列表
    async fn cached_files(&self, fingerprint: &str) -> Option<Vec<PathBuf>> {
        let entry = match self.cache.lookup(fingerprint).await {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(fingerprint = %fingerprint, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(fingerprint = %fingerprint, error = %e, "Cache lookup failed");
                return None;
            }
        };

        if !self.cache.is_valid(&entry).await {
            // 记录的文件已被外部清理，当作未命中
            tracing::warn!(
                fingerprint = %fingerprint,
                files = entry.local_file_list.len(),
                "Cache inconsistent: recorded files missing, refetching"
            );
            return None;
        }

        Some(entry.local_file_list)
    }

    /// 按层级检索单个对象并落盘
    async fn fetch(&self, uids: &DicomUidTriplet) -> Result<Vec<PathBuf>, RetrievalError> {
        let level = uids.level();
        let study = uids.study_instance_uid();
        let series = uids.series_instance_uid().unwrap_or_default();
        let sop = uids.sop_instance_uid().unwrap_or_default();

        tracing::debug!(level = %level, uids = %uids, "Fetching from archive");

        let buffers = match level {
            DicomLevel::Study => self.archive.retrieve_study(study).await,
            DicomLevel::Series => self.archive.retrieve_series(study, series).await,
            DicomLevel::Instance => self
                .archive
                .retrieve_instance(study, series, sop)
                .await
                .map(|buffer| vec![buffer]),
        }
        .map_err(|source| RetrievalError::Fetch {
            level,
            uids: uids.to_string(),
            source,
        })?;

        Ok(self.store.store_objects(&buffers).await?)
    }
}
