//! 统一错误处理
//!
//! 提供 `ApiError` 枚举实现 `IntoResponse`，部署错误到 HTTP 状态码的映射只在这里进行

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::deploy::DeployError;
use crate::services::docker::DAEMON_UNAVAILABLE_MESSAGE;

/// API 错误响应结构
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// 面向用户的错误信息
    pub error: String,
    /// 机器可读的错误类型
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: kind.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// 统一 API 错误类型
#[derive(Debug)]
pub enum ApiError {
    /// 404 - 资源未找到
    NotFound(String),
    /// 400 - 请求无效
    BadRequest(String),
    /// 部署流水线错误，状态码由错误类型决定
    Deploy(DeployError),
}

impl ApiError {
    /// 创建未找到错误
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound(resource.into())
    }

    /// 创建请求无效错误
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Deploy(DeployError::InvalidRepository(_))
            | ApiError::Deploy(DeployError::MissingIdentifier) => StatusCode::BAD_REQUEST,
            ApiError::Deploy(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// 请求体缺失 Content-Type、不是 JSON 或字段类型不对
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<DeployError> for ApiError {
    fn from(err: DeployError) -> Self {
        Self::Deploy(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::NotFound(resource) => {
                ErrorResponse::new("not_found", format!("{} not found", resource))
            }
            ApiError::BadRequest(msg) => ErrorResponse::new("bad_request", msg),
            ApiError::Deploy(err) => match &err {
                DeployError::MissingIdentifier => ErrorResponse::new(
                    err.kind(),
                    "Either container_id or repo_url is required",
                ),
                DeployError::EngineUnavailable(detail) => {
                    ErrorResponse::new(err.kind(), DAEMON_UNAVAILABLE_MESSAGE).with_details(detail.clone())
                }
                _ => ErrorResponse::new(err.kind(), err.to_string()),
            },
        };

        (status, Json(body)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::NotFound(r) => write!(f, "Not found: {}", r),
            ApiError::BadRequest(m) => write!(f, "Bad request: {}", m),
            ApiError::Deploy(e) => write!(f, "Deploy error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

/// 便捷类型别名
pub type ApiResult<T> = Result<T, ApiError>;
