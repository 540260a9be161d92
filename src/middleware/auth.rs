//! Bearer token 认证中间件
//!
//! 提供 `RequireBearerToken` extractor，在 handler 读取请求体之前完成认证

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{HeaderMap, AUTHORIZATION},
        request::Parts,
    },
};
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::config::SecretToken;
use crate::error::ApiError;
use crate::state::AppState;

const BEARER_PREFIX: &str = "Bearer ";

/// 认证结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    Authorized,
    Rejected(RejectReason),
}

/// 拒绝原因，仅用于日志，不会返回给调用方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingHeader,
    MalformedScheme,
    TokenMismatch,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingHeader => "missing authorization header",
            RejectReason::MalformedScheme => "authorization scheme is not Bearer",
            RejectReason::TokenMismatch => "bearer token mismatch",
        }
    }
}

/// Bearer token 认证 Extractor
///
/// # Example
///
/// ```ignore
/// async fn protected_handler(
///     _auth: RequireBearerToken,
///     State(state): State<Arc<AppState>>,
/// ) -> impl IntoResponse {
///     // handler 逻辑...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct RequireBearerToken;

#[async_trait]
impl FromRequestParts<Arc<AppState>> for RequireBearerToken {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        verify_bearer_token(&parts.headers, &state.secret)
    }
}

/// 验证请求头中的 Bearer token
pub fn verify_bearer_token(
    headers: &HeaderMap,
    secret: &SecretToken,
) -> Result<RequireBearerToken, ApiError> {
    // 非 ASCII header 视同格式错误
    let header_value = match headers.get(AUTHORIZATION) {
        None => None,
        Some(v) => Some(v.to_str().unwrap_or_default()),
    };

    match authenticate(header_value, secret.expose()) {
        AuthDecision::Authorized => Ok(RequireBearerToken),
        AuthDecision::Rejected(reason) => {
            tracing::warn!(reason = reason.as_str(), "Rejected webhook request");
            Err(ApiError::unauthorized())
        }
    }
}

/// 校验 `Authorization` header 的值，要求严格为 `Bearer <token>`
pub fn authenticate(header_value: Option<&str>, secret: &str) -> AuthDecision {
    let Some(value) = header_value else {
        return AuthDecision::Rejected(RejectReason::MissingHeader);
    };
    let Some(token) = value.strip_prefix(BEARER_PREFIX) else {
        return AuthDecision::Rejected(RejectReason::MalformedScheme);
    };

    if tokens_match(token, secret) {
        AuthDecision::Authorized
    } else {
        AuthDecision::Rejected(RejectReason::TokenMismatch)
    }
}

/// 先做 SHA-256 摘要再逐字节异或比较，耗时与 token 长度和匹配前缀无关
fn tokens_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());

    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
