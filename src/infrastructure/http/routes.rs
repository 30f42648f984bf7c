//! HTTP Routes
//!
//! API Endpoints:
//! - /api/ping                    GET   健康检查
//! - /ai-service                  GET   列出已配置的推理引擎
//! - /ai-service/{engine_name}    POST  对指定 DICOM 对象运行推理

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .merge(ai_service_routes())
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new().route("/ping", get(handlers::ping))
}

/// 推理服务路由
fn ai_service_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/ai-service", get(handlers::list_engines))
        .route("/ai-service/:engine_name", post(handlers::run_inference))
}
