//! Inference Engine Port - 推理引擎调用抽象
//!
//! 四种调用方式统一通过 `execute` 入口，调用方不区分方式。
//! 具体实现在 infrastructure/adapters/engine

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::domain::engine::ApiMethod;

/// 引擎执行错误
#[derive(Debug, Error)]
pub enum EngineError {
    /// 进程非零退出、解释器异常或远程接口返回错误
    #[error("Engine execution failed: {message}")]
    ExecutionFailed {
        message: String,
        /// 捕获的进程输出或响应体
        diagnostic: String,
    },

    #[error("Environment not found: {0}")]
    EnvironmentNotFound(String),

    #[error("Failed to spawn process {program}: {message}")]
    SpawnFailed { program: String, message: String },

    #[error("Engine request error: {0}")]
    RequestFailed(String),

    #[error("Engine execution timed out after {0}s")]
    Timeout(u64),

    #[error("Engine execution cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    IoError(String),
}

impl EngineError {
    pub fn failed(message: impl Into<String>, diagnostic: impl Into<String>) -> Self {
        Self::ExecutionFailed {
            message: message.into(),
            diagnostic: diagnostic.into(),
        }
    }
}

/// 远程接口请求体
#[derive(Debug, Clone)]
pub enum RemoteBody {
    Json(serde_json::Value),
    /// 以 multipart 表单字段 `file` 上传
    File(PathBuf),
}

/// 远程接口响应
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// 远程接口调用后的同步钩子
#[async_trait]
pub trait PostCallHook: Send + Sync + std::fmt::Debug {
    async fn on_response(&self, response: &RemoteResponse) -> Result<(), EngineError>;
}

/// 调用方式及其参数（封闭枚举，每种方式一个处理函数）
#[derive(Debug, Clone)]
pub enum Invocation {
    Native {
        entry_file: PathBuf,
        args: Vec<String>,
    },
    Virtualenv {
        env_name: String,
        entry_file: PathBuf,
        args: Vec<String>,
    },
    CustomCommand {
        command: String,
        entry_file: Option<PathBuf>,
        args: Vec<String>,
    },
    RemoteApi {
        url: String,
        method: ApiMethod,
        body: Option<RemoteBody>,
        hook: Option<Arc<dyn PostCallHook>>,
    },
}

impl Invocation {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Native { .. } => "native",
            Self::Virtualenv { .. } => "virtualenv",
            Self::CustomCommand { .. } => "custom_command",
            Self::RemoteApi { .. } => "remote_api",
        }
    }
}

/// 调用计划
#[derive(Debug, Clone)]
pub struct InvocationPlan {
    pub invocation: Invocation,
    /// 已解析的超时，None 时使用实现的默认值
    pub timeout: Option<Duration>,
}

/// 引擎原始输出
#[derive(Debug, Clone)]
pub enum RawOutput {
    /// 进程输出行
    Lines(Vec<String>),
    Remote(RemoteResponse),
}

impl RawOutput {
    /// 转换为 JSON：能解析为 JSON 时原样返回，否则作为文本
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            RawOutput::Lines(lines) => {
                let text = lines.join("\n");
                serde_json::from_str(&text).unwrap_or_else(|_| {
                    serde_json::Value::Array(
                        lines.iter().cloned().map(serde_json::Value::String).collect(),
                    )
                })
            }
            RawOutput::Remote(response) => serde_json::from_slice(&response.body)
                .unwrap_or_else(|_| {
                    serde_json::Value::String(String::from_utf8_lossy(&response.body).to_string())
                }),
        }
    }
}

/// Inference Engine Port
#[async_trait]
pub trait InferenceEnginePort: Send + Sync {
    /// 执行一次调用
    ///
    /// 取消或超时时终止子进程并丢弃部分输出
    async fn execute(
        &self,
        plan: InvocationPlan,
        cancel: CancellationToken,
    ) -> Result<RawOutput, EngineError>;
}
