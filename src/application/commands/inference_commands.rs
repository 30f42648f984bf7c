//! Inference Commands - 推理相关命令

use serde_json::Value;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::domain::dicom::InferenceRequest;

/// 运行一次推理
#[derive(Debug, Clone)]
pub struct RunInference {
    pub engine_name: String,
    pub request: InferenceRequest,
    /// 请求方断开或服务关闭时触发
    pub cancel: CancellationToken,
}

impl RunInference {
    pub fn new(engine_name: impl Into<String>, request: InferenceRequest) -> Self {
        Self {
            engine_name: engine_name.into(),
            request,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// 推理产物
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceOutcome {
    /// 输出文件，至少一个且均存在
    Files(Vec<PathBuf>),
    Json(Value),
}

/// 推理响应
#[derive(Debug, Clone)]
pub struct RunInferenceResponse {
    pub outcome: InferenceOutcome,
    /// 响应写出后需要删除的中间文件
    pub cleanup: Vec<PathBuf>,
    /// 是否复用了已有推理结果
    pub reused: bool,
}
