//! Memory Layer - In-Memory State Management
//!
//! 检索缓存的内存实现，用于测试和不需要持久化的部署

mod retrieval_cache;

pub use retrieval_cache::InMemoryRetrievalCache;
