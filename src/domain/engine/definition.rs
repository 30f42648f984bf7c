//! Engine Context - 推理引擎静态配置

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::EngineConfigError;

/// 调用方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// 本机解释器直接运行入口脚本
    Native,
    /// 指定虚拟环境中的解释器
    #[serde(alias = "conda")]
    Virtualenv,
    /// 任意命令行
    #[serde(alias = "custom_cmd")]
    CustomCommand,
    /// 远程 HTTP 接口
    #[serde(alias = "api")]
    RemoteApi,
}

impl EngineMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Virtualenv => "virtualenv",
            Self::CustomCommand => "custom_command",
            Self::RemoteApi => "remote_api",
        }
    }
}

/// 远程接口 HTTP 方法
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ApiMethod {
    #[default]
    Get,
    Post,
}

/// 输出形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// 输出文件流（单文件或 multipart）
    #[default]
    File,
    /// 引擎原始输出作为 JSON 返回
    Json,
}

impl OutputKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Json => "json",
        }
    }
}

/// 单个推理引擎定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDefinition {
    /// 路由名称，小写字母数字，以单个 `-` 连接，最多 5 个 `-`
    pub name: String,

    pub mode: EngineMode,

    /// 入口脚本（native / virtualenv 必填，custom_command 可选）
    #[serde(default)]
    pub entry_file: Option<PathBuf>,

    /// 参数模板
    #[serde(default)]
    pub args: Vec<String>,

    /// 命令模板（custom_command），可包含 `${entryFile}`
    #[serde(default)]
    pub command: Option<String>,

    /// 虚拟环境名称（virtualenv）
    #[serde(default)]
    pub env_name: Option<String>,

    /// 远程接口 URL 模板（remote_api）
    #[serde(default)]
    pub api_url: Option<String>,

    #[serde(default)]
    pub api_method: ApiMethod,

    /// POST 请求体：JSON 值；字符串表示待上传文件的路径模板
    #[serde(default)]
    pub api_body: Option<serde_json::Value>,

    /// 响应体保存路径模板（远程接口调用后执行）
    #[serde(default)]
    pub api_save_body_to: Option<String>,

    /// 输出路径模板，可包含通配符
    #[serde(default)]
    pub output_paths: Vec<String>,

    #[serde(default)]
    pub output: OutputKind,

    /// 复用本地缓存的 DICOM 文件与推理结果
    #[serde(default)]
    pub use_cache: bool,

    /// 将 DICOM 输出回传归档
    #[serde(default)]
    pub store_outputs: bool,

    /// 响应完成后删除的文件（模板 + 通配符）
    #[serde(default)]
    pub cleanup_patterns: Vec<String>,

    /// 单次调用超时（秒），未设置时使用全局默认值
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// 最多允许的 `-` 数量
const MAX_NAME_DASHES: usize = 5;

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.starts_with('-')
        && !name.ends_with('-')
        && !name.contains("--")
        && name.matches('-').count() <= MAX_NAME_DASHES
}

impl EngineDefinition {
    /// 最小定义，其余字段取默认值
    pub fn new(name: impl Into<String>, mode: EngineMode) -> Self {
        Self {
            name: name.into(),
            mode,
            entry_file: None,
            args: Vec::new(),
            command: None,
            env_name: None,
            api_url: None,
            api_method: ApiMethod::Get,
            api_body: None,
            api_save_body_to: None,
            output_paths: Vec::new(),
            output: OutputKind::File,
            use_cache: false,
            store_outputs: false,
            cleanup_patterns: Vec::new(),
            timeout_secs: None,
        }
    }

    /// 校验名称与各调用方式的必填字段
    pub fn validate(&self) -> Result<(), EngineConfigError> {
        if !is_valid_name(&self.name) {
            return Err(EngineConfigError::InvalidName(self.name.clone()));
        }

        let missing = |field: &'static str| EngineConfigError::MissingField {
            engine: self.name.clone(),
            field,
        };

        match self.mode {
            EngineMode::Native => {
                self.entry_file.as_ref().ok_or_else(|| missing("entry_file"))?;
            }
            EngineMode::Virtualenv => {
                self.entry_file.as_ref().ok_or_else(|| missing("entry_file"))?;
                self.env_name
                    .as_deref()
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| missing("env_name"))?;
            }
            EngineMode::CustomCommand => {
                self.command
                    .as_deref()
                    .filter(|c| !c.trim().is_empty())
                    .ok_or_else(|| missing("command"))?;
            }
            EngineMode::RemoteApi => {
                self.api_url
                    .as_deref()
                    .filter(|u| !u.is_empty())
                    .ok_or_else(|| missing("api_url"))?;
                if self.api_method == ApiMethod::Post && self.api_body.is_none() {
                    return Err(missing("api_body"));
                }
            }
        }

        if self.output == OutputKind::File && self.output_paths.is_empty() {
            return Err(missing("output_paths"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn native(name: &str) -> EngineDefinition {
        let mut def = EngineDefinition::new(name, EngineMode::Native);
        def.entry_file = Some(PathBuf::from("/models/run.py"));
        def.output_paths = vec!["${seriesDirList[0]}/out.dcm".into()];
        def
    }

    #[test]
    fn test_name_rules() {
        assert!(is_valid_name("vestibular-schwannoma"));
        assert!(is_valid_name("a1-b2-c3-d4-e5-f6"));
        assert!(!is_valid_name("a-b-c-d-e-f-g"));
        assert!(!is_valid_name("Upper"));
        assert!(!is_valid_name("double--dash"));
        assert!(!is_valid_name("-lead"));
        assert!(!is_valid_name(""));
    }

    #[test]
    fn test_native_requires_entry_file() {
        assert!(native("seg").validate().is_ok());
        let mut def = native("seg");
        def.entry_file = None;
        assert!(matches!(
            def.validate(),
            Err(EngineConfigError::MissingField { field: "entry_file", .. })
        ));
    }

    #[test]
    fn test_virtualenv_requires_env_name() {
        let mut def = native("seg");
        def.mode = EngineMode::Virtualenv;
        assert!(def.validate().is_err());
        def.env_name = Some("smart5".into());
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_remote_post_requires_body() {
        let mut def = EngineDefinition::new("remote", EngineMode::RemoteApi);
        def.api_url = Some("http://ai.local/run".into());
        def.output = OutputKind::Json;
        assert!(def.validate().is_ok());

        def.api_method = ApiMethod::Post;
        assert!(matches!(
            def.validate(),
            Err(EngineConfigError::MissingField { field: "api_body", .. })
        ));
    }

    #[test]
    fn test_file_output_requires_paths() {
        let mut def = native("seg");
        def.output_paths.clear();
        assert!(def.validate().is_err());
        def.output = OutputKind::Json;
        assert!(def.validate().is_ok());
    }

    #[test]
    fn test_deserialize_mode_aliases() {
        let def: EngineDefinition = serde_json::from_value(serde_json::json!({
            "name": "vs",
            "mode": "conda",
            "env_name": "smart5",
            "entry_file": "/m/commander.py",
            "output_paths": ["x"]
        }))
        .unwrap();
        assert_eq!(def.mode, EngineMode::Virtualenv);
        assert_eq!(def.api_method, ApiMethod::Get);
        assert!(!def.use_cache);
    }
}
