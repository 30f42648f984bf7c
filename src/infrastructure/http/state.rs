//! Application State
//!
//! 包含所有 Command/Query Handlers 的应用状态

use std::sync::Arc;

use crate::application::{
    // Command handlers
    RunInferenceHandler,
    // Query handlers
    ListEnginesHandler,
    // Ports
    ArchivePort, InferenceEnginePort, ObjectStorePort, RetrievalCachePort,
    // Services
    Retriever,
};
use crate::domain::engine::EngineCatalog;

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub archive: Arc<dyn ArchivePort>,
    pub cache: Arc<dyn RetrievalCachePort>,
    pub engine: Arc<dyn InferenceEnginePort>,
    pub catalog: Arc<EngineCatalog>,

    // ========== Command Handlers ==========
    pub run_inference_handler: RunInferenceHandler,

    // ========== Query Handlers ==========
    pub list_engines_handler: ListEnginesHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        catalog: Arc<EngineCatalog>,
        archive: Arc<dyn ArchivePort>,
        store: Arc<dyn ObjectStorePort>,
        cache: Arc<dyn RetrievalCachePort>,
        engine: Arc<dyn InferenceEnginePort>,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(archive.clone(), store, cache.clone()));

        Self {
            // Ports
            archive: archive.clone(),
            cache: cache.clone(),
            engine: engine.clone(),
            catalog: catalog.clone(),

            // Command handlers
            run_inference_handler: RunInferenceHandler::new(
                catalog.clone(),
                retriever,
                engine,
                archive,
                cache,
            ),

            // Query handlers
            list_engines_handler: ListEnginesHandler::new(catalog),
        }
    }
}
