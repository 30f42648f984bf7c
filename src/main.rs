//! MedInfer - 影像归档 AI 推理服务
//!
//! - Domain: dicom/, engine/ (Bounded Contexts), template
//! - Application: commands, queries, services, ports
//! - Infrastructure: http, adapters, persistence, memory

use std::sync::Arc;

use medinfer::config::{load_config, print_config};
use medinfer::domain::engine::EngineCatalog;
use medinfer::infrastructure::adapters::{DicomWebClient, EngineDispatcher, FileObjectStore};
use medinfer::infrastructure::http::{AppState, HttpServer, ServerConfig};
use medinfer::infrastructure::persistence::sled::{SledCacheConfig, SledRetrievalCache};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载配置（优先级：环境变量 > 配置文件 > 默认值）
    let config = load_config().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    // 初始化日志
    let log_filter = format!(
        "{},medinfer={},tower_http=debug",
        config.log.level, config.log.level
    );
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_filter));
    if config.log.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    tracing::info!("MedInfer - 影像归档 AI 推理服务");
    print_config(&config);

    let catalog = Arc::new(EngineCatalog::new(config.engines.clone())?);
    if catalog.is_empty() {
        tracing::warn!("No inference engines configured");
    }

    // 归档客户端
    let archive = Arc::new(DicomWebClient::new(config.archive.client_config())?);

    // 本地文件存储
    let store = Arc::new(FileObjectStore::new(&config.storage.temp_dir).await?);

    // Sled 检索缓存
    let cache_config = SledCacheConfig::in_dir(&config.cache.dir);
    let cache = Arc::new(SledRetrievalCache::new(&cache_config)?);

    // 引擎调度
    let engine = Arc::new(EngineDispatcher::new(
        config.engine_runtime.runtime_config(),
    )?);

    let state = AppState::new(catalog, archive, store, cache.clone(), engine);
    let server_config = ServerConfig::new(&config.server.host, config.server.port);
    let server = HttpServer::new(server_config, state);

    // 启动服务器（带优雅关闭）
    server
        .run_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await?;

    if let Err(e) = cache.flush() {
        tracing::warn!(error = %e, "Failed to flush cache");
    }
    tracing::info!("Server shutdown complete");

    Ok(())
}
