//! AI Service HTTP Handlers
//!
//! 推理结果按产物形式返回：
//! - 单个文件：application/octet-stream
//! - 多个文件：multipart/related 流式写出
//! - JSON：引擎原始输出

use axum::{
    body::Body,
    extract::{rejection::JsonRejection, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;

use crate::application::{InferenceOutcome, ListEngines, RunInference};
use crate::domain::dicom::InferenceRequest;
use crate::infrastructure::http::dto::{EngineListResponse, EngineResponse};
use crate::infrastructure::http::error::ApiError;
use crate::infrastructure::http::multipart_writer::{content_type_for, MultipartWriter};
use crate::infrastructure::http::state::AppState;

/// multipart 管道缓冲区大小
const PIPE_BUFFER_SIZE: usize = 64 * 1024;

/// 列出已配置的引擎
pub async fn list_engines(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EngineListResponse>, ApiError> {
    let engines = state.list_engines_handler.handle(ListEngines).await?;

    Ok(Json(EngineListResponse {
        engines: engines.into_iter().map(EngineResponse::from).collect(),
    }))
}

/// 运行推理
pub async fn run_inference(
    State(state): State<Arc<AppState>>,
    Path(engine_name): Path<String>,
    payload: Result<Json<InferenceRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    // 客户端断开时处理函数被丢弃，令牌随之取消
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let result = state
        .run_inference_handler
        .handle(RunInference::new(engine_name, request).with_cancel(cancel))
        .await;
    guard.disarm();
    let response = result?;

    match response.outcome {
        InferenceOutcome::Json(value) => {
            remove_files(&response.cleanup).await;
            Ok(Json(value).into_response())
        }
        InferenceOutcome::Files(mut files) if files.len() == 1 => {
            let path = files.remove(0);
            stream_file(path, response.cleanup).await
        }
        InferenceOutcome::Files(files) => Ok(stream_multipart(files, response.cleanup)),
    }
}

/// 流式返回单个文件，发送完毕后清理中间文件
async fn stream_file(path: PathBuf, cleanup: Vec<PathBuf>) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&path).await.map_err(|e| {
        ApiError::Internal(format!("Failed to open output {}: {}", path.display(), e))
    })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let (mut writer, reader) = tokio::io::duplex(PIPE_BUFFER_SIZE);
    tokio::spawn(async move {
        let mut file = file;
        if let Err(e) = tokio::io::copy(&mut file, &mut writer).await {
            tracing::warn!(path = %path.display(), error = %e, "File response aborted");
        }
        // 清理完成后才关闭管道，响应结束即代表清理结束
        remove_files(&cleanup).await;
        drop(writer);
    });

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

/// 通过内存管道边写边发 multipart 响应，写完后清理中间文件
fn stream_multipart(files: Vec<PathBuf>, cleanup: Vec<PathBuf>) -> Response {
    let (writer, reader) = tokio::io::duplex(PIPE_BUFFER_SIZE);
    let mut multipart = MultipartWriter::new(writer);
    let content_type = multipart.content_type();

    tokio::spawn(async move {
        if let Err(e) = write_parts(&mut multipart, &files).await {
            tracing::warn!(error = %e, files = files.len(), "Multipart response aborted");
        }
        remove_files(&cleanup).await;
        drop(multipart);
    });

    (
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response()
}

async fn write_parts(
    multipart: &mut MultipartWriter<DuplexStream>,
    files: &[PathBuf],
) -> std::io::Result<()> {
    multipart.begin().await?;
    for path in files {
        let data = tokio::fs::read(path).await?;
        multipart.write_part(content_type_for(path), &data).await?;
    }
    multipart.end().await
}

/// 删除文件或目录，不存在时忽略
pub async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        let result = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
            Ok(_) => tokio::fs::remove_file(path).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed intermediate file"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove file"),
        }
    }
}
