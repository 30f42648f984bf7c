//! Fake Archive - 用于测试的内存归档
//!
//! 不访问网络，按 UID 返回预先登记的最小 DICOM 对象

use async_trait::async_trait;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::application::ports::{require_uid, ArchiveError, ArchivePort};
use crate::domain::dicom::encode_part10;

type InstanceKey = (String, String, String);

/// Fake Archive
#[derive(Default)]
pub struct FakeArchive {
    instances: DashMap<InstanceKey, Vec<u8>>,
    stored: DashMap<PathBuf, usize>,
    retrieve_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl FakeArchive {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一个实例，`body` 作为像素数据写入
    pub fn add_instance(&self, study: &str, series: &str, sop: &str, body: &[u8]) {
        self.instances.insert(
            (study.to_string(), series.to_string(), sop.to_string()),
            encode_part10(study, series, sop, body),
        );
    }

    /// 模拟归档不可达
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    /// 检索调用次数（三种层级合计）
    pub fn retrieve_calls(&self) -> usize {
        self.retrieve_calls.load(Ordering::Relaxed)
    }

    /// 已通过 store_instance 回传的文件
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.stored.iter().map(|e| e.key().clone()).collect();
        files.sort();
        files
    }

    fn begin_call(&self) -> Result<(), ArchiveError> {
        self.retrieve_calls.fetch_add(1, Ordering::Relaxed);
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(ArchiveError::Unavailable("fake archive offline".into()));
        }
        Ok(())
    }

    /// 按 UID 排序返回匹配的对象，无匹配时返回 404
    fn matching(
        &self,
        filter: impl Fn(&InstanceKey) -> bool,
        what: String,
    ) -> Result<Vec<Vec<u8>>, ArchiveError> {
        let mut found: Vec<(InstanceKey, Vec<u8>)> = self
            .instances
            .iter()
            .filter(|e| filter(e.key()))
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        if found.is_empty() {
            return Err(ArchiveError::Rejected {
                status: 404,
                message: format!("{} not found", what),
            });
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, data)| data).collect())
    }
}

#[async_trait]
impl ArchivePort for FakeArchive {
    async fn retrieve_study(&self, study_uid: &str) -> Result<Vec<Vec<u8>>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        self.begin_call()?;
        self.matching(|k| k.0 == study_uid, format!("study {}", study_uid))
    }

    async fn retrieve_series(
        &self,
        study_uid: &str,
        series_uid: &str,
    ) -> Result<Vec<Vec<u8>>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        require_uid(series_uid, "Series Instance UID")?;
        self.begin_call()?;
        self.matching(
            |k| k.0 == study_uid && k.1 == series_uid,
            format!("series {}", series_uid),
        )
    }

    async fn retrieve_instance(
        &self,
        study_uid: &str,
        series_uid: &str,
        sop_uid: &str,
    ) -> Result<Vec<u8>, ArchiveError> {
        require_uid(study_uid, "Study Instance UID")?;
        require_uid(series_uid, "Series Instance UID")?;
        require_uid(sop_uid, "SOP Instance UID")?;
        self.begin_call()?;
        let mut found = self.matching(
            |k| k.0 == study_uid && k.1 == series_uid && k.2 == sop_uid,
            format!("instance {}", sop_uid),
        )?;
        Ok(found.remove(0))
    }

    async fn store_instance(&self, local_file: &Path) -> Result<(), ArchiveError> {
        let data = tokio::fs::read(local_file)
            .await
            .map_err(|e| ArchiveError::IoError(e.to_string()))?;
        self.stored.insert(local_file.to_path_buf(), data.len());
        tracing::debug!(file = %local_file.display(), "FakeArchive: stored instance");
        Ok(())
    }
}
