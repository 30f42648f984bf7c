//! Sled 嵌入式存储

mod retrieval_cache;

pub use retrieval_cache::{SledCacheConfig, SledRetrievalCache, CACHE_DB_NAME};
