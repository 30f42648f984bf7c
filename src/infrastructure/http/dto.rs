//! Data Transfer Objects

use serde::Serialize;

use crate::application::EngineSummary;

// ============================================================================
// Engine DTOs
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    pub name: String,
    pub mode: &'static str,
    pub output: &'static str,
    pub use_cache: bool,
    pub store_outputs: bool,
}

impl From<EngineSummary> for EngineResponse {
    fn from(summary: EngineSummary) -> Self {
        Self {
            name: summary.name,
            mode: summary.mode,
            output: summary.output,
            use_cache: summary.use_cache,
            store_outputs: summary.store_outputs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EngineListResponse {
    pub engines: Vec<EngineResponse>,
}
