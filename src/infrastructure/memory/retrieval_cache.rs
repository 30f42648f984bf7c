//! In-Memory Retrieval Cache Implementation

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::application::ports::{CacheEntry, CacheError, CacheStats, RetrievalCachePort};
use crate::domain::dicom::DicomUidTriplet;

/// 内存推理缓存，进程退出即丢失
#[derive(Default)]
pub struct InMemoryRetrievalCache {
    /// fingerprint -> CacheEntry
    entries: DashMap<String, CacheEntry>,
    hit_count: AtomicU64,
    miss_count: AtomicU64,
}

impl InMemoryRetrievalCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

#[async_trait]
impl RetrievalCachePort for InMemoryRetrievalCache {
    async fn lookup(&self, fingerprint: &str) -> Result<Option<CacheEntry>, CacheError> {
        let entry = self.entries.get(fingerprint).map(|e| e.value().clone());
        let counter = if entry.is_some() {
            &self.hit_count
        } else {
            &self.miss_count
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(entry)
    }

    async fn record_files(
        &self,
        fingerprint: &str,
        source_uids: &[DicomUidTriplet],
        local_file_list: &[PathBuf],
    ) -> Result<(), CacheError> {
        let now = Utc::now().timestamp();
        self.entries
            .entry(fingerprint.to_string())
            .and_modify(|entry| {
                entry.source_uids = source_uids.to_vec();
                entry.local_file_list = local_file_list.to_vec();
                entry.updated_at = now;
            })
            .or_insert_with(|| CacheEntry {
                fingerprint: fingerprint.to_string(),
                source_uids: source_uids.to_vec(),
                local_file_list: local_file_list.to_vec(),
                produced_outputs: Vec::new(),
                inference_engine: None,
                has_inference_result: false,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn record_outputs(
        &self,
        fingerprint: &str,
        engine: &str,
        output_uids: &[DicomUidTriplet],
    ) -> Result<bool, CacheError> {
        match self.entries.get_mut(fingerprint) {
            Some(mut entry) => {
                entry.produced_outputs = output_uids.to_vec();
                entry.inference_engine = Some(engine.to_string());
                entry.has_inference_result = true;
                entry.updated_at = Utc::now().timestamp();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn stats(&self) -> CacheStats {
        CacheStats {
            total_entries: self.entries.len(),
            hit_count: self.hit_count.load(Ordering::Relaxed),
            miss_count: self.miss_count.load(Ordering::Relaxed),
        }
    }
}
