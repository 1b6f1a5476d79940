// API 错误类型
//
// 处理器返回 ApiResult，错误统一转换为 ApiResponse 格式 + 对应的 HTTP 状态码

use crate::error::{IndexError, UploadError};
use crate::server::handlers::ApiResponse;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    /// 请求参数错误
    #[error("{0}")]
    BadRequest(String),
    /// 资源不存在
    #[error("{0}")]
    NotFound(String),
    /// 状态冲突（例如已有上传在进行）
    #[error("{0}")]
    Conflict(String),
    /// 上游服务错误（图床 / GitHub）
    #[error("{0}")]
    Upstream(String),
    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::Io(_) => ApiError::BadRequest(e.to_string()),
            e if e.is_precondition() => ApiError::BadRequest(e.to_string()),
            UploadError::Cancelled => ApiError::Conflict(e.to_string()),
            e => ApiError::Upstream(e.to_string()),
        }
    }
}

impl From<IndexError> for ApiError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotConfigured(_) => ApiError::BadRequest(e.to_string()),
            IndexError::VersionConflict { .. } => ApiError::Conflict(e.to_string()),
            IndexError::RepositoryNotFound => ApiError::NotFound(e.to_string()),
            _ => ApiError::Upstream(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("API 内部错误: {:#}", self);
        }
        let body = ApiResponse::<()>::error(status.as_u16() as i32, self.to_string());
        (status, Json(body)).into_response()
    }
}
