//! 远程推理接口调用
//!
//! GET 无请求体；POST 发送 JSON，或以 multipart 字段 `file` 上传本地文件

use reqwest::multipart::{Form, Part};
use reqwest::Client;

use crate::application::ports::{EngineError, PostCallHook, RawOutput, RemoteBody, RemoteResponse};
use crate::domain::engine::ApiMethod;

/// 调用远程接口并执行后置钩子
pub async fn call_remote(
    client: &Client,
    url: &str,
    method: ApiMethod,
    body: Option<&RemoteBody>,
    hook: Option<&dyn PostCallHook>,
) -> Result<RawOutput, EngineError> {
    let request = match method {
        ApiMethod::Get => client.get(url),
        ApiMethod::Post => match body {
            Some(RemoteBody::Json(value)) => client.post(url).json(value),
            Some(RemoteBody::File(path)) => {
                let data = tokio::fs::read(path)
                    .await
                    .map_err(|e| EngineError::IoError(format!("{}: {}", path.display(), e)))?;
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| "file".to_string());
                let form = Form::new().part("file", Part::bytes(data).file_name(file_name));
                client.post(url).multipart(form)
            }
            None => {
                return Err(EngineError::failed(
                    "POST request requires a body",
                    url.to_string(),
                ))
            }
        },
    };

    tracing::debug!(url = %url, method = ?method, "Calling remote engine");

    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            EngineError::RequestFailed(format!("Remote engine timed out: {}", e))
        } else if e.is_connect() {
            EngineError::RequestFailed(format!("Cannot connect to remote engine: {}", e))
        } else {
            EngineError::RequestFailed(e.to_string())
        }
    })?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .bytes()
        .await
        .map_err(|e| EngineError::RequestFailed(format!("Failed to read response: {}", e)))?
        .to_vec();

    if !status.is_success() {
        return Err(EngineError::failed(
            format!("Remote engine returned HTTP {}", status),
            String::from_utf8_lossy(&body).to_string(),
        ));
    }

    let response = RemoteResponse {
        status: status.as_u16(),
        content_type,
        body,
    };

    if let Some(hook) = hook {
        hook.on_response(&response).await?;
    }

    Ok(RawOutput::Remote(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Bytes;
    use axum::http::{header, HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    #[derive(Debug, Default)]
    struct CountingHook {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl PostCallHook for CountingHook {
        async fn on_response(&self, _response: &RemoteResponse) -> Result<(), EngineError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }
    }

    async fn upload(headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
        let is_form = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |ct| ct.starts_with("multipart/form-data"));
        let has_file = String::from_utf8_lossy(&body).contains("name=\"file\"");
        if is_form && has_file {
            (StatusCode::OK, "uploaded".into())
        } else {
            (StatusCode::BAD_REQUEST, "expected file".into())
        }
    }

    async fn spawn_engine() -> String {
        let router = Router::new()
            .route("/predict", get(|| async { Json(serde_json::json!({"label": "nodule"})) }))
            .route(
                "/echo",
                post(|Json(v): Json<serde_json::Value>| async move { Json(v) }),
            )
            .route("/upload", post(upload))
            .route(
                "/broken",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
            );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_get_runs_hook() {
        let base = spawn_engine().await;
        let hook = CountingHook::default();

        let output = call_remote(
            &Client::new(),
            &format!("{}/predict", base),
            ApiMethod::Get,
            None,
            Some(&hook),
        )
        .await
        .unwrap();

        assert_eq!(output.to_json()["label"], "nodule");
        assert_eq!(hook.calls.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_post_json() {
        let base = spawn_engine().await;
        let body = RemoteBody::Json(serde_json::json!({"threshold": 0.5}));
        let output = call_remote(
            &Client::new(),
            &format!("{}/echo", base),
            ApiMethod::Post,
            Some(&body),
            None,
        )
        .await
        .unwrap();
        assert_eq!(output.to_json()["threshold"], 0.5);
    }

    #[tokio::test]
    async fn test_post_file_as_multipart() {
        let base = spawn_engine().await;
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("input.dcm");
        std::fs::write(&file, b"dicom").unwrap();

        let body = RemoteBody::File(file);
        let output = call_remote(
            &Client::new(),
            &format!("{}/upload", base),
            ApiMethod::Post,
            Some(&body),
            None,
        )
        .await
        .unwrap();
        assert_eq!(output.to_json(), serde_json::json!("uploaded"));
    }

    #[tokio::test]
    async fn test_non_success_fails_with_body() {
        let base = spawn_engine().await;
        let hook = CountingHook::default();
        let err = call_remote(
            &Client::new(),
            &format!("{}/broken", base),
            ApiMethod::Get,
            None,
            Some(&hook),
        )
        .await
        .unwrap_err();

        match err {
            EngineError::ExecutionFailed { diagnostic, .. } => {
                assert_eq!(diagnostic, "model crashed")
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(hook.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_post_without_body_fails() {
        let err = call_remote(
            &Client::new(),
            "http://127.0.0.1:1/x",
            ApiMethod::Post,
            None,
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::ExecutionFailed { .. }));
    }
}
