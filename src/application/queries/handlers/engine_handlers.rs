//! Engine Query Handlers

use std::sync::Arc;

use crate::application::error::ApplicationError;
use crate::application::queries::ListEngines;
use crate::domain::engine::{EngineCatalog, EngineDefinition};

// ============================================================================
// Response DTOs
// ============================================================================

/// 引擎摘要
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSummary {
    pub name: String,
    pub mode: &'static str,
    pub output: &'static str,
    pub use_cache: bool,
    pub store_outputs: bool,
}

impl From<&EngineDefinition> for EngineSummary {
    fn from(def: &EngineDefinition) -> Self {
        Self {
            name: def.name.clone(),
            mode: def.mode.as_str(),
            output: def.output.as_str(),
            use_cache: def.use_cache,
            store_outputs: def.store_outputs,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// ListEngines Handler
pub struct ListEnginesHandler {
    catalog: Arc<EngineCatalog>,
}

impl ListEnginesHandler {
    pub fn new(catalog: Arc<EngineCatalog>) -> Self {
        Self { catalog }
    }

    pub async fn handle(&self, _query: ListEngines) -> Result<Vec<EngineSummary>, ApplicationError> {
        Ok(self.catalog.iter().map(EngineSummary::from).collect())
    }
}
