//! 共享密钥认证：一次性随机用户名令牌与 Basic 认证中间件。
//!
//! 令牌只在启动时生成一次。Basic 凭据中的密码不做校验，令牌本身即为
//! 带外分发的共享密钥；比较为普通字符串相等，不保证常量时间。

use axum::body::Body as AxumBody;
use axum::extract::Extension;
use axum::http::Request;
use axum::{middleware, response::Response};
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{Authorization, authorization::Basic};
use axum_extra::typed_header::TypedHeaderRejection;
use rand::Rng;
use rand::distr::Alphanumeric;
use std::fmt;
use std::sync::Arc;

use crate::config::ServerConfig;
use crate::error::AppError;

pub const TOKEN_LENGTH: usize = 8;

/// 进程生命周期内不变的访问令牌，作为 Basic 认证的用户名。
#[derive(Clone, PartialEq, Eq)]
pub struct SecretToken(String);

impl SecretToken {
    /// 生成 8 位字母数字随机令牌。
    pub fn generate() -> Self {
        let value = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect();
        Self(value)
    }

    pub fn matches(&self, username: &str) -> bool {
        self.0 == username
    }

    #[cfg(test)]
    pub fn fixed(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Debug for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretToken(..)")
    }
}

impl fmt::Display for SecretToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 判断请求是否放行：认证关闭时总是放行，否则只比较用户名。
pub fn admits(config: &ServerConfig, credentials: Option<&Basic>) -> bool {
    let Some(token) = &config.token else {
        return true;
    };
    credentials.is_some_and(|basic| token.matches(basic.username()))
}

/// 认证中间件：缺失或不匹配的凭据返回 401 质询，不调用后续处理器。
pub async fn require_token(
    Extension(config): Extension<Arc<ServerConfig>>,
    credentials: Result<TypedHeader<Authorization<Basic>>, TypedHeaderRejection>,
    req: Request<AxumBody>,
    next: middleware::Next,
) -> Result<Response, AppError> {
    let credentials = credentials.ok().map(|TypedHeader(Authorization(basic))| basic);
    if admits(&config, credentials.as_ref()) {
        return Ok(next.run(req).await);
    }
    Err(AppError::Unauthorized)
}
