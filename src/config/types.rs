//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::engine::EngineDefinition;
use crate::infrastructure::adapters::{
    DicomWebClientConfig, EngineRuntimeConfig, WadoMode, WadoUriOptions,
};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 服务器配置
    #[serde(default)]
    pub server: ServerConfig,

    /// 影像归档配置
    #[serde(default)]
    pub archive: ArchiveConfig,

    /// 本地文件存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 检索缓存配置
    #[serde(default)]
    pub cache: CacheConfig,

    /// 引擎运行时配置
    #[serde(default)]
    pub engine_runtime: EngineRuntimeSection,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,

    /// 推理引擎列表
    #[serde(default)]
    pub engines: Vec<EngineDefinition>,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8088
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// 获取服务器地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 影像归档配置
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// DICOMweb 基础 URL
    #[serde(default = "default_archive_url")]
    pub base_url: String,

    /// WADO 路径前缀（相对 base_url）
    #[serde(default)]
    pub wado_prefix: String,

    /// STOW 路径前缀（相对 base_url）
    #[serde(default)]
    pub stow_prefix: String,

    /// 实例检索协议：wado-rs 或 wado-uri
    #[serde(default)]
    pub wado_mode: WadoMode,

    /// WADO-URI 渲染参数
    #[serde(default)]
    pub wado_uri_options: WadoUriOptions,

    /// 附加请求头
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// 请求超时时间（秒）
    #[serde(default = "default_archive_timeout")]
    pub timeout_secs: u64,
}

fn default_archive_url() -> String {
    "http://localhost:8080/dicom-web".to_string()
}

fn default_archive_timeout() -> u64 {
    300
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            base_url: default_archive_url(),
            wado_prefix: String::new(),
            stow_prefix: String::new(),
            wado_mode: WadoMode::default(),
            wado_uri_options: WadoUriOptions::default(),
            headers: HashMap::new(),
            timeout_secs: default_archive_timeout(),
        }
    }
}

impl ArchiveConfig {
    /// 转换为客户端配置
    pub fn client_config(&self) -> DicomWebClientConfig {
        DicomWebClientConfig {
            base_url: self.base_url.clone(),
            wado_prefix: self.wado_prefix.clone(),
            stow_prefix: self.stow_prefix.clone(),
            wado_mode: self.wado_mode,
            wado_uri_options: self.wado_uri_options.clone(),
            headers: self.headers.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 检索到的 DICOM 文件存放目录
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("data/dicom")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
        }
    }
}

/// 缓存配置
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// sled 数据库所在目录
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/cache")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// 引擎运行时配置
#[derive(Debug, Clone, Deserialize)]
pub struct EngineRuntimeSection {
    /// 脚本解释器
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// 解释器参数
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,

    /// 列出虚拟环境的命令，输出 `{"envs": [...]}`
    #[serde(default = "default_env_list_command")]
    pub env_list_command: String,

    /// 默认超时（秒），0 表示不限
    #[serde(default)]
    pub default_timeout_secs: u64,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".to_string()]
}

fn default_env_list_command() -> String {
    "conda env list --json".to_string()
}

impl Default for EngineRuntimeSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            env_list_command: default_env_list_command(),
            default_timeout_secs: 0,
        }
    }
}

impl EngineRuntimeSection {
    pub fn runtime_config(&self) -> EngineRuntimeConfig {
        EngineRuntimeConfig {
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            env_list_command: self.env_list_command.clone(),
            default_timeout: (self.default_timeout_secs > 0)
                .then(|| Duration::from_secs(self.default_timeout_secs)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.archive.timeout_secs, 300);
        assert_eq!(config.archive.wado_mode, WadoMode::Rs);
        assert!(config.engines.is_empty());
    }

    #[test]
    fn test_server_addr() {
        let config = ServerConfig::default();
        assert_eq!(config.addr(), "0.0.0.0:8088");
    }

    #[test]
    fn test_runtime_timeout_zero_means_unbounded() {
        let mut section = EngineRuntimeSection::default();
        assert_eq!(section.runtime_config().default_timeout, None);

        section.default_timeout_secs = 600;
        assert_eq!(
            section.runtime_config().default_timeout,
            Some(Duration::from_secs(600))
        );
    }
}
