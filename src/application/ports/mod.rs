//! Application Ports - 出站端口定义
//!
//! 定义应用层与基础设施层的抽象接口

mod archive;
mod inference_engine;
mod object_store;
mod retrieval_cache;

pub use archive::{require_uid, ArchiveError, ArchivePort};
pub use inference_engine::{
    EngineError, InferenceEnginePort, Invocation, InvocationPlan, PostCallHook, RawOutput,
    RemoteBody, RemoteResponse,
};
pub use object_store::{ObjectStoreError, ObjectStorePort};
pub use retrieval_cache::{
    generate_fingerprint, CacheEntry, CacheError, CacheStats, RetrievalCachePort,
};
