//! 统一的请求错误类型与转换。

use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use std::fmt;
use std::io::ErrorKind;

use crate::config::AUTH_REALM;
use crate::storage::StorageError;

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unauthorized,
    Forbidden,
    NotFound,
    RangeNotSatisfiable(u64),
    Internal(String),
}

/// 附加在错误响应上的失败原因，由错误适配中间件取出并记录。
#[derive(Clone, Debug)]
pub struct FailureReport(pub String);

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => f.write_str(msg),
            AppError::Unauthorized => f.write_str("unauthorized"),
            AppError::Forbidden => f.write_str("forbidden"),
            AppError::NotFound => f.write_str("not found"),
            AppError::RangeNotSatisfiable(_) => f.write_str("range not satisfiable"),
            AppError::Internal(msg) => f.write_str(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let report = FailureReport(self.to_string());
        let mut response = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg).into_response(),
            AppError::Unauthorized => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!(r#"Basic realm="{AUTH_REALM}""#))
                {
                    headers.insert(header::WWW_AUTHENTICATE, value);
                }
                (StatusCode::UNAUTHORIZED, headers, "unauthorized").into_response()
            }
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden").into_response(),
            AppError::NotFound => (StatusCode::NOT_FOUND, "not found").into_response(),
            AppError::RangeNotSatisfiable(size) => {
                let mut headers = HeaderMap::new();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    headers.insert(header::CONTENT_RANGE, value);
                }
                (
                    StatusCode::RANGE_NOT_SATISFIABLE,
                    headers,
                    "range not satisfiable",
                )
                    .into_response()
            }
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg).into_response(),
        };
        response.extensions_mut().insert(report);
        response
    }
}

impl From<StorageError> for AppError {
    fn from(error: StorageError) -> Self {
        match error {
            StorageError::InvalidPath => AppError::BadRequest("invalid path".into()),
            StorageError::Io(err) => match err.kind() {
                ErrorKind::NotFound => AppError::NotFound,
                ErrorKind::PermissionDenied => AppError::Forbidden,
                _ => AppError::Internal(err.to_string()),
            },
        }
    }
}
