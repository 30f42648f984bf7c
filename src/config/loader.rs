//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（config.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;
use crate::domain::engine::EngineCatalog;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["config", "config.local"];

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `MEDINFER_`，层级分隔符 `__`）
/// 2. 配置文件（config.toml 或 config.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `MEDINFER_SERVER__PORT=8080`
/// - `MEDINFER_ARCHIVE__BASE_URL=http://pacs:8042/dicom-web`
/// - `MEDINFER_ARCHIVE__WADO_MODE=wado-uri`
/// - `MEDINFER_STORAGE__TEMP_DIR=/data/dicom`
///
/// 引擎列表只能在配置文件中以 `[[engines]]` 声明
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("server.host", "0.0.0.0")?
        .set_default("server.port", 8088)?
        .set_default("archive.base_url", "http://localhost:8080/dicom-web")?
        .set_default("archive.timeout_secs", 300)?
        .set_default("storage.temp_dir", "data/dicom")?
        .set_default("cache.dir", "data/cache")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: MEDINFER_ARCHIVE__BASE_URL=http://pacs:8042/dicom-web
    builder = builder.add_source(
        Environment::with_prefix("MEDINFER")
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "Server port cannot be 0".to_string(),
        ));
    }

    if config.archive.base_url.is_empty() {
        return Err(ConfigError::ValidationError(
            "Archive base URL cannot be empty".to_string(),
        ));
    }

    if config.archive.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "Archive timeout cannot be 0".to_string(),
        ));
    }

    // 引擎名称、各模式必填字段、重名
    EngineCatalog::new(config.engines.clone())
        .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Application Configuration ===");
    tracing::info!("Server: {}", config.server.addr());
    tracing::info!("Archive: {}", config.archive.base_url);
    tracing::info!("Archive WADO Mode: {:?}", config.archive.wado_mode);
    tracing::info!("Archive Timeout: {}s", config.archive.timeout_secs);
    tracing::info!("DICOM Directory: {:?}", config.storage.temp_dir);
    tracing::info!("Cache Directory: {:?}", config.cache.dir);
    tracing::info!("Interpreter: {}", config.engine_runtime.interpreter);
    for engine in &config.engines {
        tracing::info!(
            "Engine: {} ({}, output={}, use_cache={})",
            engine.name,
            engine.mode.as_str(),
            engine.output.as_str(),
            engine.use_cache
        );
    }
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=================================");
}
