//! HTTP Error Handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::application::ApplicationError;

/// 统一错误响应格式
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub is_error: bool,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            is_error: true,
            message: message.into(),
        }
    }
}

/// API 错误
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// 上游归档返回错误
    BadGateway(String),
    ServiceUnavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadGateway(msg)
            | ApiError::ServiceUnavailable(msg)
            | ApiError::Internal(msg) => msg,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.message(), "Request failed");
        } else {
            tracing::warn!(status = status.as_u16(), error = %self.message(), "Request rejected");
        }

        (status, Json(ErrorResponse::new(self.message()))).into_response()
    }
}

impl From<ApplicationError> for ApiError {
    fn from(e: ApplicationError) -> Self {
        let message = e.to_string();
        match e {
            ApplicationError::InvalidRequest(_) => ApiError::BadRequest(message),
            ApplicationError::EngineNotFound(_) => ApiError::NotFound(message),
            ApplicationError::ArchiveRejected { status: 404, .. } => ApiError::NotFound(message),
            ApplicationError::ArchiveRejected { .. } | ApplicationError::RetrievalFailed(_) => {
                ApiError::BadGateway(message)
            }
            ApplicationError::ArchiveUnavailable(_) | ApplicationError::Cancelled => {
                ApiError::ServiceUnavailable(message)
            }
            ApplicationError::EnvironmentNotFound(_)
            | ApplicationError::EngineExecutionFailed
            | ApplicationError::OutputMissing(_)
            | ApplicationError::InternalError(_) => ApiError::Internal(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_error_shape() {
        let response = ApiError::from(ApplicationError::EngineNotFound("lung".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["isError"], true);
        assert_eq!(body["message"], "Engine not found: lung");
    }

    #[tokio::test]
    async fn test_engine_failure_hides_details() {
        let response = ApiError::from(ApplicationError::EngineExecutionFailed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(response).await["message"], "Engine execution failed");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (ApplicationError::invalid("empty"), StatusCode::BAD_REQUEST),
            (
                ApplicationError::ArchiveRejected {
                    status: 404,
                    message: "gone".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ApplicationError::ArchiveRejected {
                    status: 500,
                    message: "oops".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (
                ApplicationError::ArchiveUnavailable("refused".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApplicationError::OutputMissing("seg".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }
}
