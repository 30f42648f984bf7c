//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（Archive、ObjectStore、RetrievalCache、InferenceEngine）
//! - services: 检索等被多个用例复用的流程
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod services;

// Re-exports
pub use commands::{
    handlers::{build_plan, RunInferenceHandler},
    InferenceOutcome, RunInference, RunInferenceResponse,
};

pub use error::ApplicationError;

pub use ports::{
    // Archive
    ArchiveError,
    ArchivePort,
    // Object store
    ObjectStoreError,
    ObjectStorePort,
    // Retrieval cache
    generate_fingerprint,
    CacheEntry,
    CacheError,
    CacheStats,
    RetrievalCachePort,
    // Inference engine
    EngineError,
    InferenceEnginePort,
    Invocation,
    InvocationPlan,
    PostCallHook,
    RawOutput,
    RemoteBody,
    RemoteResponse,
};

pub use queries::{
    handlers::{EngineSummary, ListEnginesHandler},
    ListEngines,
};

pub use services::{RetrievalError, Retriever, SaveBodyHook};
